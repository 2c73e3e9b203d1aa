//! Placeholder nodes for types without a codec.

use ogx_types::{NodeChild, ObjectRef, SerializedNode};

/// Save-only fallback for types without a registered codec.
///
/// Records only the type tag and id (set by the registry) plus a comment.
/// Content and children are lost. There is no decode side: loading an
/// opaque node fails with `CodecNotFound`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpaqueCodec;

impl OpaqueCodec {
    pub fn encode(&self, object: &ObjectRef) -> SerializedNode {
        SerializedNode::new(object.type_tag().as_str()).with_child(NodeChild::Comment(format!(
            "no codec registered for {}",
            object.type_tag()
        )))
    }
}
