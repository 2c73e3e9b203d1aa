use ogx_types::{NodeChild, ObjectKey, ObjectRef, SerializedNode};

use crate::error::CodecResult;

/// Bidirectional translator between one object and one serialized node.
///
/// `encode` produces the node's content only: the registry names the node
/// after the type tag and sets the `class` and `id` attributes. Child objects
/// are emitted as [`NodeChild::Pending`] placeholders (see [`pending`]); the
/// partitioner later replaces each with an inline node, a reference or an
/// include.
///
/// `decode` fills an already identity-resolved target in place instead of
/// allocating, so objects shared by several parents stay shared.
pub trait Codec: Send + Sync {
    fn encode(&self, object: &ObjectRef) -> CodecResult<SerializedNode>;

    fn decode(
        &self,
        node: &SerializedNode,
        target: &ObjectRef,
        ctx: &mut dyn DecodeContext,
    ) -> CodecResult<()>;
}

/// Supplies child objects while a codec decodes.
pub trait DecodeContext {
    /// Turn a child of the node being decoded (inline object node, include
    /// marker or reference) into an object.
    fn resolve(&mut self, child: &NodeChild) -> CodecResult<ObjectRef>;
}

/// Placeholder for a child object, to be placed by the partitioner.
pub fn pending(child: &ObjectRef) -> NodeChild {
    NodeChild::Pending(ObjectKey::of(child))
}

/// The single object child of a wrapper element such as `<entry>` or
/// `<child>`.
pub(crate) fn sole_object(wrapper: &SerializedNode) -> Option<&NodeChild> {
    let mut objects = wrapper.object_children();
    let first = objects.next()?;
    objects.next().is_none().then_some(first)
}
