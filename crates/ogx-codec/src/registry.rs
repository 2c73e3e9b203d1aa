//! Type-tag lookup of codecs, with the opaque fallback on save.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{trace, warn};

use ogx_types::node::{ATTR_CLASS, ATTR_ID};
use ogx_types::{ObjectId, ObjectRef, ScalarKind, SerializedNode, TypeTag};

use crate::builtin::{ListCodec, MapCodec, ScalarCodec};
use crate::codec::{Codec, DecodeContext};
use crate::error::{CodecError, CodecResult};
use crate::opaque::OpaqueCodec;
use crate::record::RecordCodec;

/// Type-tag-indexed table of codecs.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<TypeTag, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// A registry without any codec. Every type falls back to the opaque
    /// codec on save.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// A registry with codecs for the built-in scalars, `List` and `Map`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(TypeTag::integer(), Arc::new(ScalarCodec::new(ScalarKind::Int)));
        registry.register(TypeTag::float(), Arc::new(ScalarCodec::new(ScalarKind::Float)));
        registry.register(TypeTag::boolean(), Arc::new(ScalarCodec::new(ScalarKind::Bool)));
        registry.register(TypeTag::string(), Arc::new(ScalarCodec::new(ScalarKind::Text)));
        registry.register(TypeTag::list(), Arc::new(ListCodec));
        registry.register(TypeTag::map(), Arc::new(MapCodec));
        registry
    }

    /// Register `codec` for `type_tag`, replacing any previous one.
    pub fn register(&mut self, type_tag: TypeTag, codec: Arc<dyn Codec>) {
        trace!(%type_tag, "registered codec");
        self.codecs.insert(type_tag, codec);
    }

    /// Register the generic record codec for `type_tag`.
    pub fn register_record(&mut self, type_tag: TypeTag) {
        self.register(type_tag, Arc::new(RecordCodec));
    }

    pub fn lookup(&self, type_tag: &TypeTag) -> Option<Arc<dyn Codec>> {
        self.codecs.get(type_tag).cloned()
    }

    pub fn contains(&self, type_tag: &TypeTag) -> bool {
        self.codecs.contains_key(type_tag)
    }

    /// Registered type tags, sorted.
    pub fn type_tags(&self) -> Vec<&TypeTag> {
        let mut tags: Vec<&TypeTag> = self.codecs.keys().collect();
        tags.sort();
        tags
    }

    /// Encode `object` into its full node: element named after the type
    /// tag, `class` and `id` attributes first, then the codec's content.
    ///
    /// Types without a codec degrade to the opaque codec with a warning.
    pub fn encode(&self, object: &ObjectRef, id: Option<&ObjectId>) -> CodecResult<SerializedNode> {
        let tag = object.type_tag();
        let content = match self.codecs.get(tag) {
            Some(codec) => codec.encode(object)?,
            None => {
                warn!(type_tag = %tag, id = ?id.map(ObjectId::as_str), "no codec registered, saving opaque node");
                OpaqueCodec.encode(object)
            }
        };

        let mut node = SerializedNode::object(tag, id);
        node.attributes.extend(
            content
                .attributes
                .into_iter()
                .filter(|(key, _)| key != ATTR_CLASS && key != ATTR_ID),
        );
        node.text = content.text;
        node.children = content.children;
        Ok(node)
    }

    /// Decode `node` into `target`.
    ///
    /// Fails with `TypeMismatch` when the node's recorded type is not the
    /// target's, and with `CodecNotFound` when no codec is registered for it.
    pub fn decode(
        &self,
        node: &SerializedNode,
        target: &ObjectRef,
        ctx: &mut dyn DecodeContext,
    ) -> CodecResult<()> {
        let expected = target.type_tag();
        match node.type_tag()? {
            Some(found) if &found == expected => {}
            Some(found) => {
                return Err(CodecError::TypeMismatch {
                    expected: expected.to_string(),
                    found: found.to_string(),
                })
            }
            None => {
                return Err(CodecError::malformed(
                    &node.name,
                    "node carries no class attribute",
                ))
            }
        }
        let codec = self
            .codecs
            .get(expected)
            .ok_or_else(|| CodecError::CodecNotFound(expected.to_string()))?;
        codec.decode(node, target, ctx)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("types", &self.type_tags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InlineContext;
    use ogx_types::{DataObject, NodeChild, Scalar};

    fn tag(name: &str) -> TypeTag {
        TypeTag::new(name).unwrap()
    }

    #[test]
    fn builtin_types_are_registered() {
        let registry = CodecRegistry::with_builtin();
        let names: Vec<&str> = registry.type_tags().iter().map(|t| t.as_str()).collect();
        assert_eq!(names, vec!["Boolean", "Float", "Integer", "List", "Map", "String"]);
        assert!(registry.lookup(&tag("Patient")).is_none());
    }

    #[test]
    fn encode_sets_class_and_id_first() {
        let registry = CodecRegistry::with_builtin();
        let id = ObjectId::new("n1").unwrap();
        let node = registry.encode(&DataObject::integer(5), Some(&id)).unwrap();
        assert_eq!(node.name, "Integer");
        assert_eq!(node.attributes[0], ("class".into(), "Integer".into()));
        assert_eq!(node.attributes[1], ("id".into(), "n1".into()));
        assert_eq!(node.attribute("value"), Some("5"));
    }

    #[test]
    fn unknown_type_degrades_to_opaque() {
        let registry = CodecRegistry::with_builtin();
        let obj = DataObject::new(tag("Mesh"));
        obj.set_field("vertices", 3i64);
        let node = registry.encode(&obj, None).unwrap();
        assert_eq!(node.attribute("class"), Some("Mesh"));
        assert!(matches!(&node.children[..], [NodeChild::Comment(c)] if c.contains("no codec")));
    }

    #[test]
    fn decode_checks_type() {
        let registry = CodecRegistry::with_builtin();
        let node = registry.encode(&DataObject::integer(1), None).unwrap();
        let target = DataObject::new(TypeTag::string());
        let err = registry
            .decode(&node, &target, &mut InlineContext::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { expected, found }
            if expected == "String" && found == "Integer"));
    }

    #[test]
    fn decode_without_codec_fails() {
        let registry = CodecRegistry::with_builtin();
        let node = SerializedNode::object(&tag("Mesh"), None);
        let target = DataObject::new(tag("Mesh"));
        assert!(matches!(
            registry.decode(&node, &target, &mut InlineContext::new()),
            Err(CodecError::CodecNotFound(t)) if t == "Mesh"
        ));
    }

    #[test]
    fn registered_codec_replaces_fallback() {
        let mut registry = CodecRegistry::with_builtin();
        registry.register_record(tag("Patient"));
        let obj = DataObject::new(tag("Patient"));
        obj.set_field("name", "Bob");
        let node = registry.encode(&obj, None).unwrap();
        let target = DataObject::new(tag("Patient"));
        registry
            .decode(&node, &target, &mut InlineContext::new())
            .unwrap();
        assert_eq!(target.field("name"), Some(Scalar::Text("Bob".into())));
    }
}
