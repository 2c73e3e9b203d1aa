use std::fmt;

use ogx_codec::CodecError;
use ogx_dag::DagError;
use ogx_gate::{ErrorLog, GateError};
use ogx_pack::PackError;
use ogx_patch::PatchError;
use ogx_store::StoreError;
use ogx_types::{FormatVersion, TypeError};
use thiserror::Error;

/// Category of an [`EngineError`], independent of the context wrapped
/// around it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    TypeMismatch,
    Conflict,
    PartitionIntegrity,
    UnsupportedFutureVersion,
    UnsupportedPastVersion,
    ValidationFailed,
    CodecNotFound,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("partition integrity: {0}")]
    PartitionIntegrity(String),

    #[error("archive version {found} is newer than the supported version {current}")]
    UnsupportedFutureVersion {
        found: FormatVersion,
        current: FormatVersion,
    },

    #[error("archive version {found} cannot be upgraded to {current}: no patch from version {missing}")]
    UnsupportedPastVersion {
        found: FormatVersion,
        current: FormatVersion,
        missing: FormatVersion,
    },

    #[error("validation failed: {0}")]
    ValidationFailed(ErrorLog),

    #[error("no codec registered for type {0}")]
    CodecNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[source] StoreError),

    /// Another error with the object or unit it happened at.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// The taxonomy entry of this error, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::PartitionIntegrity(_) => ErrorKind::PartitionIntegrity,
            Self::UnsupportedFutureVersion { .. } => ErrorKind::UnsupportedFutureVersion,
            Self::UnsupportedPastVersion { .. } => ErrorKind::UnsupportedPastVersion,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::CodecNotFound(_) => ErrorKind::CodecNotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Wrap this error with a description of where it happened.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The error without its context wrappers.
    pub fn root(&self) -> &EngineError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// The validation log, if this is a validation failure.
    pub fn validation_log(&self) -> Option<&ErrorLog> {
        match self.root() {
            Self::ValidationFailed(log) => Some(log),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Attach context to the error of a result.
pub(crate) trait ResultExt<T> {
    fn context_with(self, context: impl FnOnce() -> String) -> EngineResult<T>;
}

impl<T, E: Into<EngineError>> ResultExt<T> for Result<T, E> {
    fn context_with(self, context: impl FnOnce() -> String) -> EngineResult<T> {
        self.map_err(|err| err.into().context(context()))
    }
}

impl From<TypeError> for EngineError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Xml(_) | StoreError::Malformed(_) | StoreError::UnknownProtocol(_) => {
                Self::InvalidArgument(err.to_string())
            }
            StoreError::PendingNode(_) => Self::PartitionIntegrity(err.to_string()),
            other => Self::Io(other),
        }
    }
}

impl From<DagError> for EngineError {
    fn from(err: DagError) -> Self {
        match err {
            DagError::Conflict { .. } => Self::Conflict(err.to_string()),
            DagError::CycleDetected { .. } => Self::InvalidArgument(err.to_string()),
        }
    }
}

impl From<CodecError> for EngineError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::CodecNotFound(tag) => Self::CodecNotFound(tag),
            CodecError::TypeMismatch { expected, found } => Self::TypeMismatch { expected, found },
            CodecError::Malformed { .. } => Self::InvalidArgument(err.to_string()),
            CodecError::Type(err) => err.into(),
            // Errors raised while resolving children come back through the
            // codec untouched.
            CodecError::Context(inner) => match inner.downcast::<EngineError>() {
                Ok(engine) => *engine,
                Err(other) => Self::InvalidArgument(other.to_string()),
            },
        }
    }
}

impl From<PackError> for EngineError {
    fn from(err: PackError) -> Self {
        match err {
            PackError::PartitionIntegrity { .. } | PackError::PathCollision { .. } => {
                Self::PartitionIntegrity(err.to_string())
            }
            PackError::Dag(err) => err.into(),
            PackError::Store(err) => err.into(),
            PackError::Type(err) => err.into(),
        }
    }
}

impl From<PatchError> for EngineError {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::UnsupportedFutureVersion { found, current } => {
                Self::UnsupportedFutureVersion { found, current }
            }
            PatchError::UnsupportedPastVersion {
                found,
                current,
                missing,
            } => Self::UnsupportedPastVersion {
                found,
                current,
                missing,
            },
            PatchError::Type(err) => err.into(),
            PatchError::Envelope(_) | PatchError::Step { .. } => {
                Self::InvalidArgument(err.to_string())
            }
        }
    }
}

impl From<GateError> for EngineError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Store(err) => err.into(),
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}

impl From<ErrorLog> for EngineError {
    fn from(log: ErrorLog) -> Self {
        Self::ValidationFailed(log)
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        Self::InvalidArgument(format!("invalid configuration: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_looks_through_context() {
        let err = EngineError::Conflict("id p1".into())
            .context("unit Patient_p1.xml")
            .context("loading archive");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            err.to_string(),
            "loading archive: unit Patient_p1.xml: conflict: id p1"
        );
    }

    #[test]
    fn codec_context_unwraps_engine_errors() {
        let inner = EngineError::UnsupportedFutureVersion {
            found: FormatVersion(3),
            current: FormatVersion(2),
        };
        let err: EngineError = CodecError::context(inner).into();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFutureVersion);
    }

    #[test]
    fn lower_errors_map_onto_taxonomy() {
        let err: EngineError = CodecError::CodecNotFound("Mesh".into()).into();
        assert_eq!(err.kind(), ErrorKind::CodecNotFound);

        let err: EngineError = DagError::CycleDetected { path: "A -> A".into() }.into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err: EngineError = StoreError::NotFound("x.xml".into()).into();
        assert_eq!(err.kind(), ErrorKind::Io);

        let err: EngineError = PatchError::UnsupportedPastVersion {
            found: FormatVersion(1),
            current: FormatVersion(3),
            missing: FormatVersion(2),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::UnsupportedPastVersion);

        let mut log = ErrorLog::new();
        log.push("Patient", "missing field name");
        let err: EngineError = log.into();
        assert_eq!(err.validation_log().map(ErrorLog::len), Some(1));
    }
}
