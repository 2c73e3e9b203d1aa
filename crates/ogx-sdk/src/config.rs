use std::path::{Path, PathBuf};

use ogx_dag::Strategy;
use ogx_pack::{AlwaysSplit, Index, ListManaged, NeverSplit, PathPolicy, SplitPolicy, TypeAndId, UniquePath};
use ogx_types::{FormatVersion, TypeTag};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::identity::{ConflictPolicy, IdMinting};

/// Which built-in split policy a serializer starts with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitConfig {
    Always,
    #[default]
    Never,
    List { types: Vec<String> },
}

/// Which built-in path policy a serializer starts with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathConfig {
    #[default]
    TypeAndId,
    Index,
    Unique { path: PathBuf },
}

/// Serializer settings, loadable from TOML.
///
/// ```toml
/// format_version = 2
/// traversal = "depth_first"
/// buffer_protocol = "zstd"
/// record_types = ["Patient", "Study"]
///
/// [split]
/// kind = "list"
/// types = ["Study"]
///
/// [id_minting]
/// kind = "sequential"
/// prefix = "obj"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Version written into new archives and targeted by patching.
    pub format_version: u32,
    pub traversal: Strategy,
    pub conflict_policy: ConflictPolicy,
    /// Buffer handler used on save; loads pick the handler each file names.
    pub buffer_protocol: String,
    /// Types encoded with the generic record codec.
    pub record_types: Vec<String>,
    /// Write schema files next to saved archives.
    pub write_schema: bool,
    /// Validate nodes on load.
    pub validate: bool,
    pub split: SplitConfig,
    pub path: PathConfig,
    pub id_minting: IdMinting,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            format_version: FormatVersion::INITIAL.0,
            traversal: Strategy::default(),
            conflict_policy: ConflictPolicy::default(),
            buffer_protocol: "raw".to_string(),
            record_types: Vec::new(),
            write_schema: false,
            validate: false,
            split: SplitConfig::default(),
            path: PathConfig::default(),
            id_minting: IdMinting::default(),
        }
    }
}

impl SerializerConfig {
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML configuration file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            EngineError::InvalidArgument(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self)
            .map_err(|err| EngineError::InvalidArgument(format!("cannot encode configuration: {err}")))
    }

    pub fn version(&self) -> FormatVersion {
        FormatVersion(self.format_version)
    }

    pub fn record_type_tags(&self) -> EngineResult<Vec<TypeTag>> {
        self.record_types
            .iter()
            .map(|t| TypeTag::new(t.as_str()).map_err(EngineError::from))
            .collect()
    }

    pub fn split_policy(&self) -> EngineResult<Box<dyn SplitPolicy>> {
        let policy: Box<dyn SplitPolicy> = match &self.split {
            SplitConfig::Always => Box::new(AlwaysSplit),
            SplitConfig::Never => Box::new(NeverSplit),
            SplitConfig::List { types } => {
                let tags = types
                    .iter()
                    .map(|t| TypeTag::new(t.as_str()))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(ListManaged::new(tags))
            }
        };
        Ok(policy)
    }

    pub fn path_policy(&self) -> Box<dyn PathPolicy> {
        match &self.path {
            PathConfig::TypeAndId => Box::new(TypeAndId),
            PathConfig::Index => Box::new(Index::default()),
            PathConfig::Unique { path } => Box::new(UniquePath::new(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SerializerConfig::default();
        assert_eq!(config.version(), FormatVersion::INITIAL);
        assert_eq!(config.traversal, Strategy::BreadthFirst);
        assert_eq!(config.split, SplitConfig::Never);
        assert_eq!(config.conflict_policy, ConflictPolicy::Reuse);
        assert_eq!(config.buffer_protocol, "raw");
    }

    #[test]
    fn parse_toml() {
        let config = SerializerConfig::from_toml_str(
            r#"
            format_version = 2
            traversal = "depth_first"
            conflict_policy = "renew"
            record_types = ["Patient"]

            [split]
            kind = "list"
            types = ["Study"]

            [path]
            kind = "unique"
            path = "out/archive.xml"

            [id_minting]
            kind = "sequential"
            prefix = "obj"
            "#,
        )
        .unwrap();
        assert_eq!(config.version(), FormatVersion(2));
        assert_eq!(config.traversal, Strategy::DepthFirst);
        assert_eq!(config.conflict_policy, ConflictPolicy::Renew);
        assert_eq!(
            config.split,
            SplitConfig::List {
                types: vec!["Study".into()]
            }
        );
        assert_eq!(
            config.path,
            PathConfig::Unique {
                path: PathBuf::from("out/archive.xml")
            }
        );
        assert_eq!(
            config.id_minting,
            IdMinting::Sequential {
                prefix: "obj".into()
            }
        );
        assert_eq!(config.record_type_tags().unwrap().len(), 1);
        // Unset keys keep their defaults.
        assert!(!config.validate);
    }

    #[test]
    fn toml_roundtrip() {
        let config = SerializerConfig {
            split: SplitConfig::Always,
            record_types: vec!["Patient".into()],
            ..SerializerConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(SerializerConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn bad_type_tags_are_rejected() {
        let config = SerializerConfig {
            split: SplitConfig::List {
                types: vec!["not a tag".into()],
            },
            ..SerializerConfig::default()
        };
        assert!(config.split_policy().is_err());
    }

    #[test]
    fn unknown_field_values_fail() {
        assert!(SerializerConfig::from_toml_str("traversal = \"sideways\"").is_err());
    }
}
