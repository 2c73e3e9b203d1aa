//! The in-memory object model.
//!
//! A [`DataObject`] is an opaque node of the application's object graph: a
//! type tag, a bag of typed scalar fields, named or ordered child objects and
//! an optional out-of-band buffer. Objects are shared through [`ObjectRef`]
//! (`Arc<DataObject>`), so the same sub-object may hang under several parents;
//! the last owner to drop it destroys it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::object::{ObjectId, ObjectKey, TypeTag};

/// Shared handle to an object.
pub type ObjectRef = Arc<DataObject>;

/// The kind of a scalar value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Text,
}

impl ScalarKind {
    /// Name used in serialized documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        }
    }

    /// Parse a kind name as written by [`ScalarKind::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(Self::Bool),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed scalar value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Bool,
            Self::Int(_) => ScalarKind::Int,
            Self::Float(_) => ScalarKind::Float,
            Self::Text(_) => ScalarKind::Text,
        }
    }

    /// Parse the textual form of a scalar of the given kind.
    ///
    /// Floats use Rust's shortest round-trip representation, so
    /// `parse(kind, &value.to_string())` returns the original value.
    pub fn parse(kind: ScalarKind, text: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidScalar {
            kind: kind.to_string(),
            value: text.to_string(),
        };
        match kind {
            ScalarKind::Bool => match text {
                "true" => Ok(Self::Bool(true)),
                "false" => Ok(Self::Bool(false)),
                _ => Err(invalid()),
            },
            ScalarKind::Int => text.parse().map(Self::Int).map_err(|_| invalid()),
            ScalarKind::Float => text.parse().map(Self::Float).map_err(|_| invalid()),
            ScalarKind::Text => Ok(Self::Text(text.to_string())),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A child link: `name = Some(..)` for a named attribute, `None` for an
/// ordered child.
#[derive(Clone, Debug)]
pub struct ChildSlot {
    pub name: Option<String>,
    pub object: ObjectRef,
}

/// Mutable content of an object.
#[derive(Clone, Debug, Default)]
pub struct ObjectState {
    /// Value of a scalar object (`Integer`, `String`, ...).
    pub value: Option<Scalar>,
    /// Typed fields, ordered by name.
    pub fields: BTreeMap<String, Scalar>,
    /// Child objects in slot order.
    pub children: Vec<ChildSlot>,
    /// Out-of-band payload managed by a buffer handler.
    pub buffer: Option<Vec<u8>>,
}

/// One node of the shared object graph.
pub struct DataObject {
    type_tag: TypeTag,
    id: RwLock<Option<ObjectId>>,
    state: RwLock<ObjectState>,
}

impl DataObject {
    /// Create an empty, anonymous object.
    pub fn new(type_tag: TypeTag) -> ObjectRef {
        Arc::new(Self {
            type_tag,
            id: RwLock::new(None),
            state: RwLock::new(ObjectState::default()),
        })
    }

    /// Create an empty object that already carries an id.
    pub fn with_id(type_tag: TypeTag, id: ObjectId) -> ObjectRef {
        let object = Self::new(type_tag);
        object.set_id(id);
        object
    }

    /// Create a scalar object of the given built-in type.
    fn scalar(type_tag: TypeTag, value: Scalar) -> ObjectRef {
        let object = Self::new(type_tag);
        object.set_value(value);
        object
    }

    pub fn integer(value: i64) -> ObjectRef {
        Self::scalar(TypeTag::integer(), Scalar::Int(value))
    }

    pub fn float(value: f64) -> ObjectRef {
        Self::scalar(TypeTag::float(), Scalar::Float(value))
    }

    pub fn boolean(value: bool) -> ObjectRef {
        Self::scalar(TypeTag::boolean(), Scalar::Bool(value))
    }

    pub fn string(value: impl Into<String>) -> ObjectRef {
        Self::scalar(TypeTag::string(), Scalar::Text(value.into()))
    }

    /// Create a `List` holding the given objects in order.
    pub fn list(items: impl IntoIterator<Item = ObjectRef>) -> ObjectRef {
        let list = Self::new(TypeTag::list());
        for item in items {
            list.push_child(item);
        }
        list
    }

    /// Create a `Map` holding the given keyed objects.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, ObjectRef)>) -> ObjectRef {
        let map = Self::new(TypeTag::map());
        for (key, value) in entries {
            map.set_child(key, value);
        }
        map
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    /// Short human-readable label, `Type#id` or `Type#<anonymous>`, for
    /// logs and error messages.
    pub fn label(&self) -> String {
        match self.id() {
            Some(id) => format!("{}#{}", self.type_tag, id),
            None => format!("{}#<anonymous>", self.type_tag),
        }
    }

    /// The id carried by this object, if one was ever assigned.
    pub fn id(&self) -> Option<ObjectId> {
        self.id.read().expect("lock poisoned").clone()
    }

    pub fn set_id(&self, id: ObjectId) {
        *self.id.write().expect("lock poisoned") = Some(id);
    }

    /// Drop the carried id, making the object anonymous again.
    pub fn clear_id(&self) {
        *self.id.write().expect("lock poisoned") = None;
    }

    pub fn value(&self) -> Option<Scalar> {
        self.state.read().expect("lock poisoned").value.clone()
    }

    pub fn set_value(&self, value: impl Into<Scalar>) {
        self.state.write().expect("lock poisoned").value = Some(value.into());
    }

    pub fn field(&self, name: &str) -> Option<Scalar> {
        self.state.read().expect("lock poisoned").fields.get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: impl Into<Scalar>) {
        self.state
            .write()
            .expect("lock poisoned")
            .fields
            .insert(name.into(), value.into());
    }

    /// All fields, ordered by name.
    pub fn fields(&self) -> Vec<(String, Scalar)> {
        self.state
            .read()
            .expect("lock poisoned")
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The graph edges of this object, in slot order.
    pub fn children(&self) -> Vec<ObjectRef> {
        self.state
            .read()
            .expect("lock poisoned")
            .children
            .iter()
            .map(|slot| Arc::clone(&slot.object))
            .collect()
    }

    /// All child slots, in order.
    pub fn slots(&self) -> Vec<ChildSlot> {
        self.state.read().expect("lock poisoned").children.clone()
    }

    /// Look up a named child.
    pub fn child(&self, name: &str) -> Option<ObjectRef> {
        self.state
            .read()
            .expect("lock poisoned")
            .children
            .iter()
            .find(|slot| slot.name.as_deref() == Some(name))
            .map(|slot| Arc::clone(&slot.object))
    }

    /// Set a named child, replacing any existing child with that name.
    pub fn set_child(&self, name: impl Into<String>, object: ObjectRef) {
        let name = name.into();
        let mut state = self.state.write().expect("lock poisoned");
        match state
            .children
            .iter_mut()
            .find(|slot| slot.name.as_deref() == Some(name.as_str()))
        {
            Some(slot) => slot.object = object,
            None => state.children.push(ChildSlot {
                name: Some(name),
                object,
            }),
        }
    }

    /// Append an ordered (unnamed) child.
    pub fn push_child(&self, object: ObjectRef) {
        self.state
            .write()
            .expect("lock poisoned")
            .children
            .push(ChildSlot { name: None, object });
    }

    pub fn buffer(&self) -> Option<Vec<u8>> {
        self.state.read().expect("lock poisoned").buffer.clone()
    }

    pub fn has_buffer(&self) -> bool {
        self.state.read().expect("lock poisoned").buffer.is_some()
    }

    pub fn set_buffer(&self, bytes: Vec<u8>) {
        self.state.write().expect("lock poisoned").buffer = Some(bytes);
    }

    /// A copy of the full state.
    pub fn snapshot(&self) -> ObjectState {
        self.state.read().expect("lock poisoned").clone()
    }

    /// Replace the full state in one step.
    pub fn replace_state(&self, state: ObjectState) {
        *self.state.write().expect("lock poisoned") = state;
    }

    /// Structural equality of two object graphs.
    ///
    /// Compares type tags, ids, values, fields, buffers and children
    /// recursively. Sharing is not compared: a graph that aliases one object
    /// and a graph holding two equal copies are structurally equal.
    pub fn same_shape(a: &ObjectRef, b: &ObjectRef) -> bool {
        let mut seen = HashSet::new();
        same_shape_inner(a, b, &mut seen)
    }
}

fn same_shape_inner(
    a: &ObjectRef,
    b: &ObjectRef,
    seen: &mut HashSet<(ObjectKey, ObjectKey)>,
) -> bool {
    if !seen.insert((ObjectKey::of(a), ObjectKey::of(b))) {
        return true;
    }
    if a.type_tag() != b.type_tag() || a.id() != b.id() {
        return false;
    }
    let (sa, sb) = (a.snapshot(), b.snapshot());
    if sa.value != sb.value || sa.fields != sb.fields || sa.buffer != sb.buffer {
        return false;
    }
    if sa.children.len() != sb.children.len() {
        return false;
    }
    sa.children
        .iter()
        .zip(sb.children.iter())
        .all(|(ca, cb)| ca.name == cb.name && same_shape_inner(&ca.object, &cb.object, seen))
}

impl fmt::Debug for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().expect("lock poisoned");
        f.debug_struct("DataObject")
            .field("type_tag", &self.type_tag)
            .field("id", &self.id())
            .field("value", &state.value)
            .field("fields", &state.fields.len())
            .field("children", &state.children.len())
            .field("buffer", &state.buffer.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> TypeTag {
        TypeTag::new(name).unwrap()
    }

    #[test]
    fn scalar_text_roundtrip() {
        for value in [
            Scalar::Bool(true),
            Scalar::Int(-17),
            Scalar::Float(0.1),
            Scalar::Float(1e300),
            Scalar::Text("  padded ".into()),
        ] {
            let parsed = Scalar::parse(value.kind(), &value.to_string()).unwrap();
            assert_eq!(parsed, value);
        }
    }

    #[test]
    fn scalar_parse_rejects_garbage() {
        assert!(Scalar::parse(ScalarKind::Int, "1.5").is_err());
        assert!(Scalar::parse(ScalarKind::Bool, "yes").is_err());
        assert!(Scalar::parse(ScalarKind::Float, "pi").is_err());
    }

    #[test]
    fn scalar_kind_names() {
        for kind in [ScalarKind::Bool, ScalarKind::Int, ScalarKind::Float, ScalarKind::Text] {
            assert_eq!(ScalarKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ScalarKind::parse("blob"), None);
    }

    #[test]
    fn named_children_replace() {
        let parent = DataObject::new(tag("Patient"));
        parent.set_child("study", DataObject::string("a"));
        parent.set_child("study", DataObject::string("b"));
        assert_eq!(parent.children().len(), 1);
        assert_eq!(
            parent.child("study").unwrap().value(),
            Some(Scalar::Text("b".into()))
        );
    }

    #[test]
    fn ordered_children_keep_order() {
        let list = DataObject::list([DataObject::integer(1), DataObject::integer(2)]);
        let values: Vec<_> = list.children().iter().map(|c| c.value()).collect();
        assert_eq!(values, vec![Some(Scalar::Int(1)), Some(Scalar::Int(2))]);
    }

    #[test]
    fn shared_child_is_same_allocation() {
        let shared = DataObject::new(tag("Acquisition"));
        let a = DataObject::new(tag("Study"));
        let b = DataObject::new(tag("Patient"));
        a.push_child(Arc::clone(&shared));
        b.push_child(Arc::clone(&shared));
        assert!(Arc::ptr_eq(&a.children()[0], &b.children()[0]));
        assert_eq!(Arc::strong_count(&shared), 3);
    }

    #[test]
    fn same_shape_ignores_sharing() {
        let shared = DataObject::string("x");
        let aliased = DataObject::list([Arc::clone(&shared), shared]);
        let copied = DataObject::list([DataObject::string("x"), DataObject::string("x")]);
        assert!(DataObject::same_shape(&aliased, &copied));
    }

    #[test]
    fn same_shape_detects_field_difference() {
        let a = DataObject::new(tag("Patient"));
        let b = DataObject::new(tag("Patient"));
        a.set_field("name", "Bob");
        b.set_field("name", "Alice");
        assert!(!DataObject::same_shape(&a, &b));
    }

    #[test]
    fn ids_can_be_set_and_cleared() {
        let obj = DataObject::with_id(tag("Patient"), ObjectId::new("p1").unwrap());
        assert_eq!(obj.id().unwrap().as_str(), "p1");
        obj.clear_id();
        assert!(obj.id().is_none());
    }

    #[test]
    fn label_names_type_and_id() {
        let obj = DataObject::new(tag("Study"));
        assert_eq!(obj.label(), "Study#<anonymous>");
        obj.set_id(ObjectId::new("s1").unwrap());
        assert_eq!(obj.label(), "Study#s1");
    }
}
