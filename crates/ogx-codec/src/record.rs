//! Generic codec for composite domain types.
//!
//! ```text
//! <Patient class="Patient" id="p1">
//!   <value type="int" value="3"/>
//!   <field name="name" type="text" value="Bob"/>
//!   <child name="study"> ... </child>
//!   <child> ... </child>
//! </Patient>
//! ```
//!
//! Named children keep their name; unnamed `<child>` wrappers are ordered
//! children. Slot order is preserved across both kinds.

use ogx_types::{ChildSlot, ObjectRef, ObjectState, Scalar, ScalarKind, SerializedNode};

use crate::builtin::ATTR_VALUE;
use crate::codec::{pending, sole_object, Codec, DecodeContext};
use crate::error::{CodecError, CodecResult};

pub const FIELD_ELEMENT: &str = "field";
pub const CHILD_ELEMENT: &str = "child";
pub const VALUE_ELEMENT: &str = "value";
pub const ATTR_NAME: &str = "name";
pub const ATTR_TYPE: &str = "type";

#[derive(Debug, Default, Clone, Copy)]
pub struct RecordCodec;

fn scalar_element(name: &str, value: &Scalar) -> SerializedNode {
    SerializedNode::new(name)
        .with_attribute(ATTR_TYPE, value.kind().as_str())
        .with_attribute(ATTR_VALUE, value.to_string())
}

fn parse_scalar(tag: &str, element: &SerializedNode) -> CodecResult<Scalar> {
    let kind_name = element
        .attribute(ATTR_TYPE)
        .ok_or_else(|| CodecError::malformed(tag, format!("<{}> without type", element.name)))?;
    let kind = ScalarKind::parse(kind_name)
        .ok_or_else(|| CodecError::malformed(tag, format!("unknown scalar type {kind_name:?}")))?;
    let text = element.attribute(ATTR_VALUE).unwrap_or_default();
    Ok(Scalar::parse(kind, text)?)
}

impl Codec for RecordCodec {
    fn encode(&self, object: &ObjectRef) -> CodecResult<SerializedNode> {
        let mut node = SerializedNode::new(object.type_tag().as_str());
        let state = object.snapshot();

        if let Some(value) = &state.value {
            node.push_element(scalar_element(VALUE_ELEMENT, value));
        }
        for (name, value) in &state.fields {
            node.push_element(scalar_element(FIELD_ELEMENT, value).with_attribute(ATTR_NAME, name));
        }
        for slot in &state.children {
            let mut wrapper = SerializedNode::new(CHILD_ELEMENT);
            if let Some(name) = &slot.name {
                wrapper.set_attribute(ATTR_NAME, name);
            }
            wrapper.push(pending(&slot.object));
            node.push_element(wrapper);
        }
        Ok(node)
    }

    fn decode(
        &self,
        node: &SerializedNode,
        target: &ObjectRef,
        ctx: &mut dyn DecodeContext,
    ) -> CodecResult<()> {
        let tag = target.type_tag().as_str();
        let mut state = ObjectState::default();

        for element in node.elements() {
            match element.name.as_str() {
                VALUE_ELEMENT => state.value = Some(parse_scalar(tag, element)?),
                FIELD_ELEMENT => {
                    let name = element
                        .attribute(ATTR_NAME)
                        .ok_or_else(|| CodecError::malformed(tag, "field without name"))?;
                    state.fields.insert(name.to_string(), parse_scalar(tag, element)?);
                }
                CHILD_ELEMENT => {
                    let child = sole_object(element).ok_or_else(|| {
                        CodecError::malformed(tag, "child must hold exactly one object")
                    })?;
                    state.children.push(ChildSlot {
                        name: element.attribute(ATTR_NAME).map(str::to_string),
                        object: ctx.resolve(child)?,
                    });
                }
                // Elements added by the engine (buffer records) or by newer
                // writers are not part of the record.
                _ => {}
            }
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

    fn patient() -> ObjectRef {
        let p = DataObject::new(TypeTag::new("Patient").unwrap());
        p.set_field("name", "Bob \"B\" <Smith>");
        p.set_field("age", 42i64);
        p.set_field("weight", 71.5);
        p.set_field("consent", true);
        p
    }

    #[test]
    fn fields_are_sorted_and_typed() {
        let node = RecordCodec.encode(&patient()).unwrap();
        let fields: Vec<(&str, &str)> = node
            .elements_named(FIELD_ELEMENT)
            .map(|f| (f.attribute(ATTR_NAME).unwrap(), f.attribute(ATTR_TYPE).unwrap()))
            .collect();
        assert_eq!(
            fields,
            vec![("age", "int"), ("consent", "bool"), ("name", "text"), ("weight", "float")]
        );
    }

    #[test]
    fn children_become_wrapped_placeholders() {
        let p = patient();
        let study = DataObject::new(TypeTag::new("Study").unwrap());
        let note = DataObject::string("n");
        p.set_child("study", study.clone());
        p.push_child(note.clone());
        let node = RecordCodec.encode(&p).unwrap();
        let wrappers: Vec<&SerializedNode> = node.elements_named(CHILD_ELEMENT).collect();
        assert_eq!(wrappers.len(), 2);
        assert_eq!(wrappers[0].attribute(ATTR_NAME), Some("study"));
        assert_eq!(wrappers[0].children, vec![NodeChild::Pending(ObjectKey::of(&study))]);
        assert_eq!(wrappers[1].attribute(ATTR_NAME), None);
        assert_eq!(wrappers[1].children, vec![NodeChild::Pending(ObjectKey::of(&note))]);
    }

    #[test]
    fn record_roundtrip_through_inline_nodes() {
        let mut ctx = InlineContext::with_record("Patient");
        let original = patient();
        original.set_value(7i64);
        original.set_child("alias", DataObject::string("Bobby"));
        original.push_child(DataObject::integer(1));

        let node = ctx.object_node(&original);
        let target = DataObject::new(TypeTag::new("Patient").unwrap());
        RecordCodec.decode(&node, &target, &mut ctx).unwrap();

        assert!(DataObject::same_shape(&original, &target));
        let slots = target.slots();
        assert_eq!(slots[0].name.as_deref(), Some("alias"));
        assert_eq!(slots[1].name, None);
    }

    #[test]
    fn unknown_elements_are_ignored() {
        let node = SerializedNode::new("Patient")
            .with_child(NodeChild::Element(SerializedNode::new("buffer")));
        let target = DataObject::new(TypeTag::new("Patient").unwrap());
        RecordCodec
            .decode(&node, &target, &mut InlineContext::new())
            .unwrap();
        assert!(target.fields().is_empty());
    }

    #[test]
    fn bad_field_is_malformed() {
        let node = SerializedNode::new("Patient").with_child(NodeChild::Element(
            SerializedNode::new(FIELD_ELEMENT)
                .with_attribute(ATTR_NAME, "x")
                .with_attribute(ATTR_TYPE, "blob"),
        ));
        let target = DataObject::new(TypeTag::new("Patient").unwrap());
        assert!(matches!(
            RecordCodec.decode(&node, &target, &mut InlineContext::new()),
            Err(CodecError::Malformed { .. })
        ));
    }
}
