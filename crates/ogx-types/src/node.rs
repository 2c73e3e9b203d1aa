//! Structured-document form of objects.
//!
//! A [`SerializedNode`] is a named element with ordered attributes, optional
//! text and ordered children. An *object node* is an element carrying the
//! `class` attribute (the type tag) and usually an `id`. Besides plain
//! elements, a node's children may be cross-unit [`IncludeMarker`]s,
//! same-unit [`ObjectReference`]s to a shared object, comments, or the
//! `Pending` placeholder a codec emits for a child object before the
//! partitioner decides where that child lives.

use crate::error::TypeError;
use crate::object::{ObjectId, ObjectKey, TypeTag};

/// Attribute holding an object node's type tag.
pub const ATTR_CLASS: &str = "class";
/// Attribute holding an object node's id.
pub const ATTR_ID: &str = "id";
/// Attribute holding the target id of a reference node.
pub const ATTR_REF: &str = "ref";
/// Element name of include markers.
pub const INCLUDE_ELEMENT: &str = "include";
/// Attribute holding an include's relative path.
pub const ATTR_HREF: &str = "href";
/// Attribute holding an include's target object, when it is not the unit root.
pub const ATTR_OBJECT: &str = "object";

/// Placeholder for a child that lives in another unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IncludeMarker {
    /// Path of the target unit, relative to the including unit's folder,
    /// always `/`-separated.
    pub href: String,
    /// Target object inside that unit; `None` means the unit's root object.
    pub object: Option<ObjectId>,
}

impl IncludeMarker {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            object: None,
        }
    }

    pub fn to_object(href: impl Into<String>, object: ObjectId) -> Self {
        Self {
            href: href.into(),
            object: Some(object),
        }
    }
}

/// Same-unit back reference to an object whose full node appears elsewhere
/// in the unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    pub type_tag: TypeTag,
    pub id: ObjectId,
}

/// One child of a serialized node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeChild {
    Element(SerializedNode),
    Include(IncludeMarker),
    Reference(ObjectReference),
    Comment(String),
    /// A child object not yet placed by the partitioner. Never written out.
    Pending(ObjectKey),
}

impl NodeChild {
    /// Returns `true` if this child stands for an object (inline node,
    /// include, reference or pending placeholder).
    pub fn denotes_object(&self) -> bool {
        match self {
            Self::Element(node) => node.is_object_node(),
            Self::Include(_) | Self::Reference(_) | Self::Pending(_) => true,
            Self::Comment(_) => false,
        }
    }
}

/// A named element of a structured document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SerializedNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<NodeChild>,
}

impl SerializedNode {
    /// Create a plain element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an object node: element named after the type tag, with the
    /// `class` attribute and, when given, the `id` attribute.
    pub fn object(type_tag: &TypeTag, id: Option<&ObjectId>) -> Self {
        let mut node = Self::new(type_tag.as_str());
        node.set_attribute(ATTR_CLASS, type_tag.as_str());
        if let Some(id) = id {
            node.set_attribute(ATTR_ID, id.as_str());
        }
        node
    }

    /// Builder form of [`SerializedNode::set_attribute`].
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Builder form of [`SerializedNode::push`].
    pub fn with_child(mut self, child: NodeChild) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing the value in place if the key exists.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn push(&mut self, child: NodeChild) {
        self.children.push(child);
    }

    pub fn push_element(&mut self, element: SerializedNode) {
        self.children.push(NodeChild::Element(element));
    }

    /// Returns `true` if this element carries a type tag.
    pub fn is_object_node(&self) -> bool {
        self.attribute(ATTR_CLASS).is_some()
    }

    /// The parsed type tag of an object node.
    pub fn type_tag(&self) -> Result<Option<TypeTag>, TypeError> {
        self.attribute(ATTR_CLASS).map(TypeTag::new).transpose()
    }

    /// The parsed id of an object node. Missing or empty ids mean the object
    /// is anonymous.
    pub fn object_id(&self) -> Result<Option<ObjectId>, TypeError> {
        match self.attribute(ATTR_ID) {
            None | Some("") => Ok(None),
            Some(id) => ObjectId::new(id).map(Some),
        }
    }

    /// Child elements, skipping includes, references and comments.
    pub fn elements(&self) -> impl Iterator<Item = &SerializedNode> {
        self.children.iter().filter_map(|child| match child {
            NodeChild::Element(node) => Some(node),
            _ => None,
        })
    }

    /// First child element with the given name.
    pub fn element(&self, name: &str) -> Option<&SerializedNode> {
        self.elements().find(|node| node.name == name)
    }

    /// Child elements with the given name.
    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SerializedNode> {
        self.elements().filter(move |node| node.name == name)
    }

    /// Children that stand for objects, in document order.
    pub fn object_children(&self) -> impl Iterator<Item = &NodeChild> {
        self.children.iter().filter(|child| child.denotes_object())
    }

    /// Returns `true` if any `Pending` placeholder remains in this subtree.
    pub fn has_pending(&self) -> bool {
        self.children.iter().any(|child| match child {
            NodeChild::Pending(_) => true,
            NodeChild::Element(node) => node.has_pending(),
            _ => false,
        })
    }

    /// Visit every object node of this subtree in document order, including
    /// `self` when it is one.
    pub fn walk_objects<'a>(&'a self, f: &mut impl FnMut(&'a SerializedNode)) {
        if self.is_object_node() {
            f(self);
        }
        for node in self.elements() {
            node.walk_objects(f);
        }
    }

    /// Visit every element of this subtree mutably, parents before children.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut SerializedNode)) {
        f(self);
        for child in &mut self.children {
            if let NodeChild::Element(node) = child {
                node.walk_mut(f);
            }
        }
    }
}
