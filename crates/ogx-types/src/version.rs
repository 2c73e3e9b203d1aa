use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Archive format version carried by the root unit's envelope.
///
/// Versions are plain integers; a patch step upgrades a document from
/// version `n` to `n + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormatVersion(pub u32);

impl FormatVersion {
    /// The first archive format.
    pub const INITIAL: Self = Self(1);

    /// The version that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Parse the envelope's textual form (`"3"`).
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        text.trim()
            .parse()
            .map(Self)
            .map_err(|_| TypeError::InvalidVersion(text.to_string()))
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
