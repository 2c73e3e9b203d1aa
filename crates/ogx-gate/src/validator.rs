use ogx_types::{SerializedNode, TypeTag};

use crate::log::ErrorLog;

/// Checks serialized nodes of one type before they are decoded.
///
/// Validators see a single object node; object children appear as include
/// markers, references or nested object elements and are validated on their
/// own. The trait is object-safe and `Send + Sync` so validators can be
/// stored as `Arc<dyn NodeValidator>`.
pub trait NodeValidator: Send + Sync {
    /// Type tag whose nodes this validator checks.
    fn type_tag(&self) -> &TypeTag;

    fn validate(&self, node: &SerializedNode) -> Result<(), ErrorLog>;
}
