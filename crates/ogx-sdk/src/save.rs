//! The save pass: traversal visitor, staging and the save report.

use std::path::{Path, PathBuf};

use ogx_codec::CodecRegistry;
use ogx_dag::{HierarchyIndex, VisitAction, Visitor};
use ogx_pack::{AssembledUnit, Partitioner};
use ogx_patch::wrap;
use ogx_store::{document_digest, write_document, InMemoryUnitStore, UnitStore};
use ogx_types::{FormatVersion, ObjectRef, SerializedNode, UnitId};
use tracing::trace;

use crate::error::{EngineError, EngineResult, ResultExt};
use crate::identity::IdentityTracker;

/// Per-object work of a save traversal: id, unit, node.
pub(crate) struct SaveVisitor<'a, 'p> {
    pub identity: &'a mut IdentityTracker,
    pub index: &'a mut HierarchyIndex,
    pub codecs: &'a CodecRegistry,
    pub partitioner: &'a mut Partitioner<'p>,
}

impl Visitor for SaveVisitor<'_, '_> {
    type Error = EngineError;

    fn visit(
        &mut self,
        father: Option<&ObjectRef>,
        object: &ObjectRef,
    ) -> EngineResult<VisitAction> {
        // Shared objects belong to the father that reached them first.
        if self.index.unit_of(object).is_some() {
            trace!(object = %object.label(), "already placed");
            return Ok(VisitAction::Prune);
        }

        let id = self.identity.id_for(object)?;
        let placement = self
            .partitioner
            .manage(father, object, &id, self.index)
            .context_with(|| format!("placing {}", object.label()))?;
        let mut node = self
            .codecs
            .encode(object, Some(&id))
            .context_with(|| format!("encoding {}", object.label()))?;
        if let Some(buffer) = placement.buffer {
            node.push_element(buffer);
        }
        self.index.record_node(object, node)?;

        // Opaque nodes hold no child placeholders; their children are not
        // part of the archive.
        if self.codecs.contains(object.type_tag()) {
            Ok(VisitAction::Descend)
        } else {
            Ok(VisitAction::Prune)
        }
    }
}

/// One unit written by a save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedUnit {
    pub file: PathBuf,
    /// Label of the unit's root object, `Type#id`.
    pub root: String,
    pub objects: usize,
    /// BLAKE3 digest of the written document.
    pub digest: String,
}

/// Everything a save wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// The root unit, in traversal order first.
    pub units: Vec<SavedUnit>,
    pub buffers: Vec<PathBuf>,
    pub schemas: Vec<PathBuf>,
}

impl SaveReport {
    /// File of the unit holding the saved root.
    pub fn root_file(&self) -> Option<&Path> {
        self.units.first().map(|u| u.file.as_path())
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Every file the save wrote.
    pub fn files(&self) -> Vec<&Path> {
        self.units
            .iter()
            .map(|u| u.file.as_path())
            .chain(self.buffers.iter().map(PathBuf::as_path))
            .chain(self.schemas.iter().map(PathBuf::as_path))
            .collect()
    }
}

/// Serialize every assembled unit into `staging`; the root unit goes in an
/// envelope stamped with `version`.
pub(crate) fn stage_units(
    units: Vec<AssembledUnit>,
    version: FormatVersion,
    staging: &InMemoryUnitStore,
    report: &mut SaveReport,
) -> EngineResult<()> {
    for unit in units {
        let objects = inline_objects(&unit.document);
        let document = if unit.id == UnitId(0) {
            wrap(unit.document, version)
        } else {
            unit.document
        };
        let bytes = write_document(&document)
            .context_with(|| format!("writing {}", unit.file.display()))?;
        staging.write(&unit.file, &bytes)?;
        report.units.push(SavedUnit {
            root: unit.root.label(),
            objects,
            digest: document_digest(&bytes),
            file: unit.file,
        });
    }
    Ok(())
}

/// Copy every staged file into `store`.
pub(crate) fn commit(staging: &InMemoryUnitStore, store: &dyn UnitStore) -> EngineResult<()> {
    let mut files = Vec::with_capacity(staging.len());
    for path in staging.paths() {
        let bytes = staging.read_required(&path)?;
        files.push((path, bytes));
    }
    store.write_batch(&files)?;
    Ok(())
}

/// Object nodes written inline in a document.
fn inline_objects(document: &SerializedNode) -> usize {
    let mut count = 0;
    document.walk_objects(&mut |_| count += 1);
    count
}
