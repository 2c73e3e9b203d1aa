//! Declarative per-type schemas.
//!
//! A schema describes the node a codec writes for one type: XML attributes,
//! record fields, the scalar value and how many object children it holds.
//! Schemas are plain data and travel with an archive as
//! `schema/<Type>.schema.json`.
//!
//! ```json
//! {
//!   "type_tag": "Patient",
//!   "fields": [
//!     { "name": "name", "kind": "text" },
//!     { "name": "age", "kind": "int", "required": false }
//!   ],
//!   "max_children": 4
//! }
//! ```

use std::collections::BTreeSet;

use ogx_codec::builtin::ATTR_VALUE;
use ogx_codec::record::{ATTR_NAME, ATTR_TYPE, FIELD_ELEMENT, VALUE_ELEMENT};
use ogx_types::node::{ATTR_CLASS, ATTR_ID};
use ogx_types::{NodeChild, Scalar, ScalarKind, SerializedNode, TypeTag};
use serde::{Deserialize, Serialize};

use crate::log::ErrorLog;
use crate::validator::NodeValidator;

fn required_by_default() -> bool {
    true
}

/// An XML attribute of the object node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeRule {
    pub name: String,
    /// When set, the attribute text must parse as this kind.
    #[serde(default)]
    pub kind: Option<ScalarKind>,
    #[serde(default = "required_by_default")]
    pub required: bool,
}

/// A `<field>` element written by the record codec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub kind: ScalarKind,
    #[serde(default = "required_by_default")]
    pub required: bool,
}

/// Expected shape of the serialized node of one type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeSchema {
    pub type_tag: TypeTag,
    #[serde(default)]
    pub attributes: Vec<AttributeRule>,
    #[serde(default)]
    pub fields: Vec<FieldRule>,
    /// Kind of the `<value>` element, when the type carries one.
    #[serde(default)]
    pub value: Option<ScalarKind>,
    /// Reject fields and attributes not named above.
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub min_children: Option<usize>,
    #[serde(default)]
    pub max_children: Option<usize>,
}

impl TypeSchema {
    pub fn new(type_tag: TypeTag) -> Self {
        Self {
            type_tag,
            attributes: Vec::new(),
            fields: Vec::new(),
            value: None,
            closed: false,
            min_children: None,
            max_children: None,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: Option<ScalarKind>) -> Self {
        self.attributes.push(AttributeRule {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn field(mut self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional_field(mut self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn value(mut self, kind: ScalarKind) -> Self {
        self.value = Some(kind);
        self
    }

    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    pub fn children(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_children = min;
        self.max_children = max;
        self
    }

    fn check_attributes(&self, node: &SerializedNode, path: &str, log: &mut ErrorLog) {
        for rule in &self.attributes {
            match (node.attribute(&rule.name), rule.kind) {
                (None, _) if rule.required => {
                    log.push(path, format!("missing attribute {}", rule.name));
                }
                (Some(text), Some(kind)) => {
                    if Scalar::parse(kind, text).is_err() {
                        log.push(
                            format!("{path}@{}", rule.name),
                            format!("{text:?} is not a valid {kind}"),
                        );
                    }
                }
                _ => {}
            }
        }
        if self.closed {
            let known: BTreeSet<&str> = self.attributes.iter().map(|r| r.name.as_str()).collect();
            for (name, _) in &node.attributes {
                if name != ATTR_CLASS && name != ATTR_ID && !known.contains(name.as_str()) {
                    log.push(path, format!("unexpected attribute {name}"));
                }
            }
        }
    }

    fn check_fields(&self, node: &SerializedNode, path: &str, log: &mut ErrorLog) {
        let mut seen = BTreeSet::new();
        for element in node.elements_named(FIELD_ELEMENT) {
            let Some(name) = element.attribute(ATTR_NAME) else {
                log.push(format!("{path}/{FIELD_ELEMENT}"), "field without name");
                continue;
            };
            let here = format!("{path}/{FIELD_ELEMENT}[{name}]");
            if !seen.insert(name) {
                log.push(&here, "duplicate field");
            }
            match self.fields.iter().find(|rule| rule.name == name) {
                Some(rule) => check_scalar(element, rule.kind, &here, log),
                None if self.closed => log.push(&here, "unexpected field"),
                None => {}
            }
        }
        for rule in self.fields.iter().filter(|r| r.required) {
            if !seen.contains(rule.name.as_str()) {
                log.push(path, format!("missing field {}", rule.name));
            }
        }
    }

    fn check_value(&self, node: &SerializedNode, path: &str, log: &mut ErrorLog) {
        let Some(kind) = self.value else {
            return;
        };
        match node.element(VALUE_ELEMENT) {
            Some(element) => check_scalar(element, kind, &format!("{path}/{VALUE_ELEMENT}"), log),
            None => log.push(path, "missing value"),
        }
    }

    fn check_children(&self, node: &SerializedNode, path: &str, log: &mut ErrorLog) {
        let count = count_object_children(node);
        if let Some(min) = self.min_children {
            if count < min {
                log.push(path, format!("{count} children, at least {min} required"));
            }
        }
        if let Some(max) = self.max_children {
            if count > max {
                log.push(path, format!("{count} children, at most {max} allowed"));
            }
        }
    }
}

fn check_scalar(element: &SerializedNode, kind: ScalarKind, path: &str, log: &mut ErrorLog) {
    match element.attribute(ATTR_TYPE) {
        Some(written) if written == kind.as_str() => {}
        Some(written) => {
            log.push(path, format!("expected {kind}, found {written}"));
            return;
        }
        None => {
            log.push(path, "missing type");
            return;
        }
    }
    let text = element.attribute(ATTR_VALUE).unwrap_or_default();
    if Scalar::parse(kind, text).is_err() {
        log.push(path, format!("{text:?} is not a valid {kind}"));
    }
}

/// Object children of `node`, looking through codec wrapper elements.
fn count_object_children(node: &SerializedNode) -> usize {
    node.children
        .iter()
        .map(|child| match child {
            NodeChild::Element(inner) if !inner.is_object_node() => count_object_children(inner),
            other if other.denotes_object() => 1,
            _ => 0,
        })
        .sum()
}

impl NodeValidator for TypeSchema {
    fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    fn validate(&self, node: &SerializedNode) -> Result<(), ErrorLog> {
        let path = node.name.as_str();
        let mut log = ErrorLog::new();
        match node.attribute(ATTR_CLASS) {
            Some(class) if class == self.type_tag.as_str() => {}
            Some(class) => log.push(path, format!("class {class} does not match {}", self.type_tag)),
            None => log.push(path, "missing class"),
        }
        self.check_attributes(node, path, &mut log);
        self.check_fields(node, path, &mut log);
        self.check_value(node, path, &mut log);
        self.check_children(node, path, &mut log);
        log.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogx_codec::CodecRegistry;
    use ogx_types::{DataObject, IncludeMarker, ObjectId};

    fn tag(s: &str) -> TypeTag {
        TypeTag::new(s).unwrap()
    }

    fn patient_schema() -> TypeSchema {
        TypeSchema::new(tag("Patient"))
            .field("name", ScalarKind::Text)
            .optional_field("age", ScalarKind::Int)
            .children(None, Some(1))
    }

    fn patient_node(build: impl FnOnce(&ogx_types::ObjectRef)) -> SerializedNode {
        let p = DataObject::with_id(tag("Patient"), ObjectId::new("p1").unwrap());
        build(&p);
        let mut codecs = CodecRegistry::default();
        codecs.register_record(tag("Patient"));
        let mut node = codecs.encode(&p, p.id().as_ref()).unwrap();
        // Stand-in for assembly: placeholders become includes.
        node.walk_mut(&mut |n| {
            for child in &mut n.children {
                if let NodeChild::Pending(_) = child {
                    *child = NodeChild::Include(IncludeMarker::new("Other.xml"));
                }
            }
        });
        node
    }

    #[test]
    fn conforming_node_passes() {
        let node = patient_node(|p| {
            p.set_field("name", "Bob");
            p.set_field("age", 42i64);
            p.push_child(DataObject::integer(1));
        });
        assert_eq!(patient_schema().validate(&node), Ok(()));
    }

    #[test]
    fn all_problems_are_reported() {
        let node = patient_node(|p| {
            p.set_field("age", "old");
            p.push_child(DataObject::integer(1));
            p.push_child(DataObject::integer(2));
        });
        let log = patient_schema().validate(&node).unwrap_err();
        let messages: Vec<&str> = log.issues().iter().map(|i| i.message.as_str()).collect();
        assert_eq!(messages.len(), 3, "{log}");
        assert!(messages.contains(&"expected int, found text"));
        assert!(messages.contains(&"missing field name"));
        assert!(messages.contains(&"2 children, at most 1 allowed"));
    }

    #[test]
    fn closed_schema_rejects_extras() {
        let node = patient_node(|p| {
            p.set_field("name", "Bob");
            p.set_field("nickname", "B");
        })
        .with_attribute("legacy", "1");
        let log = patient_schema().closed().validate(&node).unwrap_err();
        assert_eq!(log.len(), 2);
        assert!(patient_schema().validate(&node).is_ok());
    }

    #[test]
    fn attributes_and_value() {
        let schema = TypeSchema::new(tag("Scan"))
            .attribute("slices", Some(ScalarKind::Int))
            .value(ScalarKind::Float);
        let node = SerializedNode::object(&tag("Scan"), None).with_attribute("slices", "many");
        let log = schema.validate(&node).unwrap_err();
        assert_eq!(log.len(), 2);
        assert_eq!(log.issues()[0].path, "Scan@slices");
        assert_eq!(log.issues()[1].message, "missing value");
    }

    #[test]
    fn class_must_match() {
        let node = SerializedNode::object(&tag("Study"), None);
        let log = patient_schema().validate(&node).unwrap_err();
        assert!(log.issues()[0].message.contains("does not match"));
    }

    #[test]
    fn schema_json_defaults() {
        let json = r#"{
            "type_tag": "Patient",
            "fields": [{ "name": "name", "kind": "text" }],
            "max_children": 4
        }"#;
        let schema: TypeSchema = serde_json::from_str(json).unwrap();
        assert!(schema.fields[0].required);
        assert!(!schema.closed);
        assert_eq!(schema.max_children, Some(4));
        assert_eq!(schema.min_children, None);
    }
}
