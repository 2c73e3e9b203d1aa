use std::path::PathBuf;

use ogx_store::StoreError;

/// Errors from reading or writing schema descriptions.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The schema file is not valid JSON for a [`TypeSchema`](crate::TypeSchema).
    #[error("invalid schema {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The schema file describes another type than its name says.
    #[error("schema {} describes {found}, expected {expected}", path.display())]
    SchemaMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type GateResult<T> = Result<T, GateError>;
