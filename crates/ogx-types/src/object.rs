use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::DataObject;
use crate::error::TypeError;

/// Characters that are forbidden anywhere in an object id.
///
/// Ids end up in XML attributes and, through the default path policy, in
/// file names.
const FORBIDDEN_ID_CHARS: &[char] = &[
    ' ', '\t', '\n', '\r', '/', '\\', '<', '>', '"', '\'', '&', '#', '?', '*', ':',
];

/// Stable identifier attached to a persisted object.
///
/// Ids are assigned on first save (a fresh UUID unless the object already
/// carries one) and read back on load. Within one session the mapping
/// `ObjectId -> object` is a bijection.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an id.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TypeError::InvalidObjectId {
                value,
                reason: "object id must not be empty".into(),
            });
        }
        if let Some(ch) = value.chars().find(|c| FORBIDDEN_ID_CHARS.contains(c)) {
            return Err(TypeError::InvalidObjectId {
                reason: format!("contains forbidden character: {ch:?}"),
                value,
            });
        }
        Ok(Self(value))
    }

    /// Mint a fresh random id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Build a sequential id such as `obj-000042`. The prefix goes through
    /// the same checks as [`ObjectId::new`].
    pub fn sequential(prefix: &str, n: u64) -> Result<Self, TypeError> {
        Self::new(format!("{prefix}-{n:06}"))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Explicit type tag of an object, used to select its codec.
///
/// Type tags double as XML element names, so they must be valid XML names:
/// a letter or `_` first, then letters, digits, `_`, `-` or `.`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeTag(String);

impl TypeTag {
    /// Built-in 64-bit signed integer scalar.
    pub const INTEGER: &'static str = "Integer";
    /// Built-in 64-bit float scalar.
    pub const FLOAT: &'static str = "Float";
    /// Built-in boolean scalar.
    pub const BOOLEAN: &'static str = "Boolean";
    /// Built-in string scalar.
    pub const STRING: &'static str = "String";
    /// Built-in ordered list of objects.
    pub const LIST: &'static str = "List";
    /// Built-in keyed map of objects.
    pub const MAP: &'static str = "Map";

    /// Parse and validate a type tag.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        let mut chars = value.chars();
        match chars.next() {
            None => {
                return Err(TypeError::InvalidTypeTag {
                    value,
                    reason: "type tag must not be empty".into(),
                })
            }
            Some(first) if !(first.is_ascii_alphabetic() || first == '_') => {
                return Err(TypeError::InvalidTypeTag {
                    reason: format!("must start with a letter or '_', got {first:?}"),
                    value,
                })
            }
            Some(_) => {}
        }
        if let Some(ch) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))) {
            return Err(TypeError::InvalidTypeTag {
                reason: format!("contains forbidden character: {ch:?}"),
                value,
            });
        }
        Ok(Self(value))
    }

    /// Tag for a built-in type. Only valid for the associated constants.
    pub(crate) fn builtin(name: &'static str) -> Self {
        Self(name.to_string())
    }

    pub fn integer() -> Self {
        Self::builtin(Self::INTEGER)
    }

    pub fn float() -> Self {
        Self::builtin(Self::FLOAT)
    }

    pub fn boolean() -> Self {
        Self::builtin(Self::BOOLEAN)
    }

    pub fn string() -> Self {
        Self::builtin(Self::STRING)
    }

    pub fn list() -> Self {
        Self::builtin(Self::LIST)
    }

    pub fn map() -> Self {
        Self::builtin(Self::MAP)
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TypeTag {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.0
    }
}

impl std::str::FromStr for TypeTag {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// In-memory identity of a shared object.
///
/// Two `ObjectRef`s have the same key exactly when they point at the same
/// allocation. Keys are only meaningful while some owner keeps the object
/// alive, which every pass-scoped table does by holding an `ObjectRef`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(usize);

impl ObjectKey {
    /// The key of a shared object.
    pub fn of(object: &Arc<DataObject>) -> Self {
        Self(Arc::as_ptr(object) as *const () as usize)
    }
}

/// Index of a partition unit within one save pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub usize);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_rejects_empty() {
        let err = ObjectId::new("").unwrap_err();
        assert!(matches!(err, TypeError::InvalidObjectId { .. }));
    }

    #[test]
    fn object_id_rejects_path_separators() {
        assert!(ObjectId::new("a/b").is_err());
        assert!(ObjectId::new("a\\b").is_err());
        assert!(ObjectId::new("a b").is_err());
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
        assert!(ObjectId::new(a.as_str()).is_ok());
    }

    #[test]
    fn sequential_ids_are_zero_padded() {
        assert_eq!(ObjectId::sequential("obj", 42).unwrap().as_str(), "obj-000042");
    }

    #[test]
    fn sequential_ids_reject_bad_prefixes() {
        assert!(ObjectId::sequential("my obj", 1).is_err());
        assert!(ObjectId::sequential("a/b", 1).is_err());
        assert!(ObjectId::sequential("x#", 1).is_err());
    }

    #[test]
    fn type_tag_validation() {
        assert!(TypeTag::new("Patient").is_ok());
        assert!(TypeTag::new("_internal.Type-2").is_ok());
        assert!(TypeTag::new("").is_err());
        assert!(TypeTag::new("2Fast").is_err());
        assert!(TypeTag::new("has space").is_err());
        assert!(TypeTag::new("a<b").is_err());
    }

    #[test]
    fn builtin_tags_are_valid() {
        for tag in [
            TypeTag::integer(),
            TypeTag::float(),
            TypeTag::boolean(),
            TypeTag::string(),
            TypeTag::list(),
            TypeTag::map(),
        ] {
            assert_eq!(TypeTag::new(tag.as_str()).unwrap(), tag);
        }
    }

    #[test]
    fn serde_rejects_invalid_tag() {
        let parsed: Result<TypeTag, _> = serde_json::from_str("\"not valid\"");
        assert!(parsed.is_err());
        let id: ObjectId = serde_json::from_str("\"p1\"").unwrap();
        assert_eq!(id.as_str(), "p1");
    }

    #[test]
    fn object_key_is_pointer_identity() {
        let a = DataObject::new(TypeTag::string());
        let b = DataObject::new(TypeTag::string());
        let a2 = Arc::clone(&a);
        assert_eq!(ObjectKey::of(&a), ObjectKey::of(&a2));
        assert_ne!(ObjectKey::of(&a), ObjectKey::of(&b));
    }

    proptest::proptest! {
        #[test]
        fn accepted_ids_never_contain_forbidden_chars(value in "\\PC{0,24}") {
            match ObjectId::new(value.clone()) {
                Ok(id) => proptest::prop_assert!(!id.as_str().contains(FORBIDDEN_ID_CHARS)),
                Err(_) => proptest::prop_assert!(value.is_empty() || value.contains(FORBIDDEN_ID_CHARS)),
            }
        }
    }
}
