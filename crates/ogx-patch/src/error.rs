use ogx_types::{FormatVersion, TypeError};

/// Errors produced while reading envelopes or upgrading documents.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
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

    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error("patch {step} failed: {reason}")]
    Step { step: String, reason: String },

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl PatchError {
    pub fn step(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            reason: reason.into(),
        }
    }
}

pub type PatchResult<T> = Result<T, PatchError>;
