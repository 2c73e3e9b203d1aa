use std::path::PathBuf;

use ogx_dag::DagError;
use ogx_store::StoreError;
use ogx_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    /// A unit does not have exactly one locally rooted object, or one of its
    /// members cannot be reached from that root.
    #[error("partition integrity violated in {unit}: {reason}")]
    PartitionIntegrity { unit: String, reason: String },

    /// Two units (or a unit and a buffer) resolved to the same file.
    #[error("path collision on {}: {first} and {second}", path.display())]
    PathCollision {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl PackError {
    pub(crate) fn integrity(unit: impl ToString, reason: impl Into<String>) -> Self {
        Self::PartitionIntegrity {
            unit: unit.to_string(),
            reason: reason.into(),
        }
    }
}

pub type PackResult<T> = Result<T, PackError>;
