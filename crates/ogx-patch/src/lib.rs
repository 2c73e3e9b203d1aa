//! Format versioning for object-graph archives.
//!
//! The root unit of every archive is wrapped in an [`envelope`] stamped with
//! the [`FormatVersion`](ogx_types::FormatVersion) it was written at. On load,
//! a [`PatchChain`] brings older documents up to the current version, one
//! [`PatchStep`] per version increment, before any codec sees them. Documents
//! from a newer writer are refused.

pub mod chain;
pub mod envelope;
pub mod error;
pub mod primitives;
pub mod step;

pub use chain::PatchChain;
pub use envelope::{unwrap, wrap, Envelope, ATTR_VERSION, CONTENT_ELEMENT, ENVELOPE_ELEMENT};
pub use error::{PatchError, PatchResult};
pub use primitives::{AttributeToField, ExtractToUnit, RenameAttribute, RenameType};
pub use step::{FnStep, PatchContext, PatchStep};
