use std::path::PathBuf;

/// Errors from unit storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested unit or buffer file does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// I/O error from the underlying storage backend.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a well-formed document.
    #[error("malformed XML document: {0}")]
    Xml(String),

    /// The document is well-formed but does not have the expected shape.
    #[error("malformed unit: {0}")]
    Malformed(String),

    /// A `Pending` placeholder reached the document writer.
    #[error("unresolved child placeholder in element <{0}>")]
    PendingNode(String),

    /// The object has no buffer to save.
    #[error("object {0} has no buffer payload")]
    MissingBuffer(String),

    /// A buffer file failed its integrity check.
    #[error("corrupt buffer {}: {reason}", path.display())]
    CorruptBuffer { path: PathBuf, reason: String },

    /// No handler is registered for a buffer protocol tag.
    #[error("unknown buffer protocol: {0}")]
    UnknownProtocol(String),
}

impl StoreError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
