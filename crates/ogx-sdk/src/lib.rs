//! High-level API for object-graph archives.
//!
//! A [`Serializer`] saves a graph of shared [`DataObject`]s as one or more XML
//! units and loads it back with object identity intact: an object reached
//! through several parents is written once and comes back as one instance.
//!
//! ```no_run
//! use ogx_sdk::{DataObject, ObjectId, Serializer, SerializerConfig, SplitConfig, TypeTag};
//! use std::sync::Arc;
//!
//! # fn main() -> ogx_sdk::EngineResult<()> {
//! let config = SerializerConfig {
//!     split: SplitConfig::Always,
//!     record_types: vec!["Patient".into(), "Study".into()],
//!     ..SerializerConfig::default()
//! };
//! let store = Arc::new(ogx_sdk::FsUnitStore::new("."));
//! let mut serializer = Serializer::with_config(store, config)?;
//!
//! let patient = DataObject::with_id(TypeTag::new("Patient")?, ObjectId::new("p1")?);
//! patient.push_child(DataObject::new(TypeTag::new("Study")?));
//! let report = serializer.save(&patient, "archive", false)?;
//!
//! let loaded = serializer.load("archive/Patient_p1.xml", false)?;
//! assert_eq!(loaded.children().len(), 1);
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
mod load;
mod save;
pub mod serializer;

pub use config::{PathConfig, SerializerConfig, SplitConfig};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use identity::{ConflictPolicy, IdMinting, IdentityTracker, Resolved};
pub use load::UnitInfo;
pub use save::{SaveReport, SavedUnit};
pub use serializer::Serializer;

// Re-export the types callers need to build graphs and extend the engine.
pub use ogx_codec::{Codec, CodecRegistry, DecodeContext, RecordCodec};
pub use ogx_dag::Strategy;
pub use ogx_gate::{ErrorLog, NodeValidator, TypeSchema};
pub use ogx_pack::{AlwaysSplit, Index, ListManaged, NeverSplit, PathPolicy, SplitPolicy, TypeAndId, UniquePath};
pub use ogx_patch::{FnStep, PatchStep};
pub use ogx_store::{BufferHandler, FsUnitStore, InMemoryUnitStore, UnitStore};
pub use ogx_types::{DataObject, FormatVersion, ObjectId, ObjectKey, ObjectRef, Scalar, ScalarKind, TypeTag};
