//! Built-in codecs for scalars and the two structural containers.
//!
//! ```text
//! <Integer class="Integer" id=".." value="42"/>
//! <String class="String" id="..">text</String>
//! <String class="String" id=".." value=""/>     (empty text)
//! <List class="List" id="..">item item ...</List>
//! <Map class="Map" id=".."><entry key="k">item</entry> ...</Map>
//! ```

use ogx_types::{ChildSlot, ObjectRef, ObjectState, Scalar, ScalarKind, SerializedNode};

use crate::codec::{pending, sole_object, Codec, DecodeContext};
use crate::error::{CodecError, CodecResult};

pub const ATTR_VALUE: &str = "value";
pub const ENTRY_ELEMENT: &str = "entry";
pub const ATTR_KEY: &str = "key";

/// Codec for the built-in scalar types.
///
/// Text is stored as element content so it keeps line breaks; every other
/// kind goes in the `value` attribute. Empty text also uses the attribute,
/// so a node without either decodes to an object without a value.
#[derive(Debug, Clone, Copy)]
pub struct ScalarCodec {
    kind: ScalarKind,
}

impl ScalarCodec {
    pub fn new(kind: ScalarKind) -> Self {
        Self { kind }
    }
}

impl Codec for ScalarCodec {
    fn encode(&self, object: &ObjectRef) -> CodecResult<SerializedNode> {
        let mut node = SerializedNode::new(object.type_tag().as_str());
        match object.value() {
            Some(value) if value.kind() == self.kind => match value {
                Scalar::Text(text) if !text.is_empty() => node.text = Some(text),
                Scalar::Text(_) => node.set_attribute(ATTR_VALUE, ""),
                other => node.set_attribute(ATTR_VALUE, other.to_string()),
            },
            Some(value) => {
                return Err(CodecError::malformed(
                    object.type_tag(),
                    format!("holds a {} value, expected {}", value.kind(), self.kind),
                ))
            }
            None => {}
        }
        Ok(node)
    }

    fn decode(
        &self,
        node: &SerializedNode,
        target: &ObjectRef,
        _ctx: &mut dyn DecodeContext,
    ) -> CodecResult<()> {
        let value = match self.kind {
            ScalarKind::Text => node
                .text
                .as_deref()
                .or_else(|| node.attribute(ATTR_VALUE))
                .map(|text| Scalar::Text(text.to_string())),
            kind => node
                .attribute(ATTR_VALUE)
                .map(|text| Scalar::parse(kind, text))
                .transpose()?,
        };
        target.replace_state(ObjectState {
            value,
            ..Default::default()
        });
        Ok(())
    }
}

/// Ordered list of objects: each item is a direct child of the node.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListCodec;

impl Codec for ListCodec {
    fn encode(&self, object: &ObjectRef) -> CodecResult<SerializedNode> {
        let mut node = SerializedNode::new(object.type_tag().as_str());
        for child in object.children() {
            node.push(pending(&child));
        }
        Ok(node)
    }

    fn decode(
        &self,
        node: &SerializedNode,
        target: &ObjectRef,
        ctx: &mut dyn DecodeContext,
    ) -> CodecResult<()> {
        let mut state = ObjectState::default();
        for child in node.object_children() {
            let object = ctx.resolve(child)?;
            state.children.push(ChildSlot { name: None, object });
        }
        target.replace_state(state);
        Ok(())
    }
}

/// Keyed map of objects: `<entry key="..">` wrappers around each value.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapCodec;

impl Codec for MapCodec {
    fn encode(&self, object: &ObjectRef) -> CodecResult<SerializedNode> {
        let mut node = SerializedNode::new(object.type_tag().as_str());
        for slot in object.slots() {
            let key = slot.name.ok_or_else(|| {
                CodecError::malformed(object.type_tag(), "map entry without a key")
            })?;
            let mut entry = SerializedNode::new(ENTRY_ELEMENT).with_attribute(ATTR_KEY, key);
            entry.push(pending(&slot.object));
            node.push_element(entry);
        }
        Ok(node)
    }

    fn decode(
        &self,
        node: &SerializedNode,
        target: &ObjectRef,
        ctx: &mut dyn DecodeContext,
    ) -> CodecResult<()> {
        let tag = target.type_tag();
        let mut state = ObjectState::default();
        for entry in node.elements_named(ENTRY_ELEMENT) {
            let key = entry
                .attribute(ATTR_KEY)
                .ok_or_else(|| CodecError::malformed(tag, "entry without key"))?;
            let child = sole_object(entry).ok_or_else(|| {
                CodecError::malformed(tag, format!("entry {key:?} must hold exactly one object"))
            })?;
            let object = ctx.resolve(child)?;
            state.children.push(ChildSlot {
                name: Some(key.to_string()),
                object,
            });
        }
        target.replace_state(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InlineContext;
    use ogx_types::{DataObject, NodeChild, ObjectKey, TypeTag};

    #[test]
    fn integer_goes_in_value_attribute() {
        let node = ScalarCodec::new(ScalarKind::Int)
            .encode(&DataObject::integer(-42))
            .unwrap();
        assert_eq!(node.attribute(ATTR_VALUE), Some("-42"));
        assert!(node.text.is_none());
    }

    #[test]
    fn string_goes_in_text() {
        let node = ScalarCodec::new(ScalarKind::Text)
            .encode(&DataObject::string("line one\nline two"))
            .unwrap();
        assert_eq!(node.text.as_deref(), Some("line one\nline two"));
    }

    #[test]
    fn scalar_decode_fills_target() {
        let codec = ScalarCodec::new(ScalarKind::Float);
        let node = codec.encode(&DataObject::float(0.1)).unwrap();
        let target = DataObject::new(TypeTag::float());
        codec.decode(&node, &target, &mut InlineContext::new()).unwrap();
        assert_eq!(target.value(), Some(Scalar::Float(0.1)));
    }

    #[test]
    fn empty_string_survives() {
        let codec = ScalarCodec::new(ScalarKind::Text);
        let node = codec.encode(&DataObject::string("")).unwrap();
        let target = DataObject::new(TypeTag::string());
        codec.decode(&node, &target, &mut InlineContext::new()).unwrap();
        assert_eq!(target.value(), Some(Scalar::Text(String::new())));
    }

    #[test]
    fn missing_value_stays_missing() {
        for (kind, tag) in [(ScalarKind::Text, TypeTag::string()), (ScalarKind::Int, TypeTag::integer())] {
            let codec = ScalarCodec::new(kind);
            let node = codec.encode(&DataObject::new(tag.clone())).unwrap();
            assert!(node.text.is_none());
            assert!(node.attribute(ATTR_VALUE).is_none());
            let target = DataObject::new(tag);
            codec.decode(&node, &target, &mut InlineContext::new()).unwrap();
            assert_eq!(target.value(), None);
        }
    }

    #[test]
    fn scalar_kind_mismatch_fails() {
        let odd = DataObject::new(TypeTag::integer());
        odd.set_value("not a number");
        assert!(matches!(
            ScalarCodec::new(ScalarKind::Int).encode(&odd),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn bad_scalar_text_fails_decode() {
        let node = SerializedNode::new("Boolean").with_attribute(ATTR_VALUE, "maybe");
        let target = DataObject::new(TypeTag::boolean());
        let err = ScalarCodec::new(ScalarKind::Bool)
            .decode(&node, &target, &mut InlineContext::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::Type(_)));
    }

    #[test]
    fn list_emits_placeholders_in_order() {
        let a = DataObject::integer(1);
        let b = DataObject::integer(2);
        let list = DataObject::list([a.clone(), b.clone()]);
        let node = ListCodec.encode(&list).unwrap();
        assert_eq!(
            node.children,
            vec![
                NodeChild::Pending(ObjectKey::of(&a)),
                NodeChild::Pending(ObjectKey::of(&b))
            ]
        );
    }

    #[test]
    fn map_wraps_entries() {
        let v = DataObject::string("x");
        let map = DataObject::map([("name", v.clone())]);
        let node = MapCodec.encode(&map).unwrap();
        let entry = node.element(ENTRY_ELEMENT).unwrap();
        assert_eq!(entry.attribute(ATTR_KEY), Some("name"));
        assert_eq!(entry.children, vec![NodeChild::Pending(ObjectKey::of(&v))]);
    }

    #[test]
    fn map_rejects_unnamed_child() {
        let map = DataObject::new(TypeTag::map());
        map.push_child(DataObject::integer(1));
        assert!(MapCodec.encode(&map).is_err());
    }

    #[test]
    fn containers_decode_inline_children() {
        let mut ctx = InlineContext::new();

        let mut list_node = SerializedNode::new("List");
        list_node.push_element(ctx.object_node(&DataObject::integer(7)));
        list_node.push_element(ctx.object_node(&DataObject::string("s")));
        let list = DataObject::new(TypeTag::list());
        ListCodec.decode(&list_node, &list, &mut ctx).unwrap();
        let items = list.children();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].value(), Some(Scalar::Int(7)));

        let mut map_node = SerializedNode::new("Map");
        let mut entry = SerializedNode::new(ENTRY_ELEMENT).with_attribute(ATTR_KEY, "k");
        entry.push_element(ctx.object_node(&DataObject::boolean(true)));
        map_node.push_element(entry);
        let map = DataObject::new(TypeTag::map());
        MapCodec.decode(&map_node, &map, &mut ctx).unwrap();
        assert_eq!(map.child("k").unwrap().value(), Some(Scalar::Bool(true)));
    }

    #[test]
    fn map_entry_with_two_objects_is_malformed() {
        let mut ctx = InlineContext::new();
        let mut entry = SerializedNode::new(ENTRY_ELEMENT).with_attribute(ATTR_KEY, "k");
        entry.push_element(ctx.object_node(&DataObject::integer(1)));
        entry.push_element(ctx.object_node(&DataObject::integer(2)));
        let node = SerializedNode::new("Map").with_child(NodeChild::Element(entry));
        let target = DataObject::new(TypeTag::map());
        assert!(matches!(
            MapCodec.decode(&node, &target, &mut ctx),
            Err(CodecError::Malformed { .. })
        ));
    }
}
