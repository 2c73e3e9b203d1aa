use ogx_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no codec registered for type {0}")]
    CodecNotFound(String),

    #[error("type mismatch: node is {found}, target is {expected}")]
    TypeMismatch { expected: String, found: String },

    #[error("malformed {type_tag} node: {reason}")]
    Malformed { type_tag: String, reason: String },

    #[error(transparent)]
    Type(#[from] TypeError),

    /// Failure raised by the decode context while resolving a child.
    #[error("{0}")]
    Context(Box<dyn std::error::Error + Send + Sync>),
}

impl CodecError {
    pub fn malformed(type_tag: impl ToString, reason: impl Into<String>) -> Self {
        Self::Malformed {
            type_tag: type_tag.to_string(),
            reason: reason.into(),
        }
    }

    /// Box an error raised by a [`DecodeContext`](crate::DecodeContext).
    pub fn context(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Context(Box::new(err))
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
