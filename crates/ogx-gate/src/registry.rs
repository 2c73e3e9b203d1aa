//! Schema files stored next to an archive.

use std::path::{Path, PathBuf};

use ogx_store::UnitStore;
use ogx_types::TypeTag;
use tracing::debug;

use crate::error::{GateError, GateResult};
use crate::schema::TypeSchema;

/// Folder, relative to an archive's root folder, holding schema files.
pub const SCHEMA_FOLDER: &str = "schema";

/// Reads and writes `<root>/schema/<Type>.schema.json`.
pub struct SchemaRegistry<'s> {
    store: &'s dyn UnitStore,
    folder: PathBuf,
}

impl<'s> SchemaRegistry<'s> {
    pub fn new(store: &'s dyn UnitStore, archive_root: &Path) -> Self {
        Self {
            store,
            folder: archive_root.join(SCHEMA_FOLDER),
        }
    }

    pub fn path_for(&self, type_tag: &TypeTag) -> PathBuf {
        self.folder.join(format!("{type_tag}.schema.json"))
    }

    /// Write one file per schema and return their paths.
    pub fn write_all<'a>(
        &self,
        schemas: impl IntoIterator<Item = &'a TypeSchema>,
    ) -> GateResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        for schema in schemas {
            let path = self.path_for(&schema.type_tag);
            let bytes = serde_json::to_vec_pretty(schema).map_err(|source| GateError::Json {
                path: path.clone(),
                source,
            })?;
            self.store.write(&path, &bytes)?;
            debug!(path = %path.display(), "wrote schema");
            written.push(path);
        }
        Ok(written)
    }

    /// Read the schema for `type_tag`, if the archive carries one.
    pub fn read(&self, type_tag: &TypeTag) -> GateResult<Option<TypeSchema>> {
        let path = self.path_for(type_tag);
        let Some(bytes) = self.store.read(&path)? else {
            return Ok(None);
        };
        let schema: TypeSchema = serde_json::from_slice(&bytes).map_err(|source| GateError::Json {
            path: path.clone(),
            source,
        })?;
        if &schema.type_tag != type_tag {
            return Err(GateError::SchemaMismatch {
                path,
                expected: type_tag.to_string(),
                found: schema.type_tag.to_string(),
            });
        }
        Ok(Some(schema))
    }
}
