use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use ogx_types::node::ATTR_CLASS;
use ogx_types::{SerializedNode, TypeTag};
use tracing::{debug, warn};

use crate::log::ErrorLog;
use crate::schema::TypeSchema;
use crate::validator::NodeValidator;

/// The set of validators consulted on a validated load.
///
/// Every validator registered for a node's type runs and their findings are
/// merged; a node whose type has no validator passes with a warning, logged
/// once per type.
#[derive(Default)]
pub struct ValidationGate {
    validators: HashMap<TypeTag, Vec<Arc<dyn NodeValidator>>>,
    schemas: HashMap<TypeTag, TypeSchema>,
    unchecked: Mutex<BTreeSet<String>>,
}

impl ValidationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a custom validator for its type.
    pub fn add_validator(&mut self, validator: Arc<dyn NodeValidator>) {
        self.validators
            .entry(validator.type_tag().clone())
            .or_default()
            .push(validator);
    }

    /// Add a declarative schema. A later schema for the same type replaces
    /// the earlier one.
    pub fn add_schema(&mut self, schema: TypeSchema) {
        self.schemas.insert(schema.type_tag.clone(), schema);
    }

    pub fn schema(&self, type_tag: &TypeTag) -> Option<&TypeSchema> {
        self.schemas.get(type_tag)
    }

    /// Registered schemas, sorted by type tag.
    pub fn schemas(&self) -> Vec<&TypeSchema> {
        let mut schemas: Vec<&TypeSchema> = self.schemas.values().collect();
        schemas.sort_by(|a, b| a.type_tag.cmp(&b.type_tag));
        schemas
    }

    /// Whether any schema or validator covers `type_tag`.
    pub fn covers(&self, type_tag: &TypeTag) -> bool {
        self.schemas.contains_key(type_tag) || self.validators.contains_key(type_tag)
    }

    /// Number of schemas plus custom validators.
    pub fn len(&self) -> usize {
        self.schemas.len() + self.validators.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate one object node.
    pub fn validate(&self, node: &SerializedNode) -> Result<(), ErrorLog> {
        let Some(class) = node.attribute(ATTR_CLASS) else {
            let mut log = ErrorLog::new();
            log.push(node.name.as_str(), "missing class");
            return Err(log);
        };
        let Ok(type_tag) = TypeTag::new(class) else {
            let mut log = ErrorLog::new();
            log.push(node.name.as_str(), format!("invalid class {class:?}"));
            return Err(log);
        };

        if !self.covers(&type_tag) {
            let mut unchecked = self.unchecked.lock().expect("lock poisoned");
            if unchecked.insert(type_tag.as_str().to_string()) {
                warn!(type_tag = %type_tag, "no schema for type; nodes pass unchecked");
            }
            return Ok(());
        }

        let mut log = ErrorLog::new();
        if let Some(schema) = self.schemas.get(&type_tag) {
            if let Err(found) = schema.validate(node) {
                log.merge(found);
            }
        }
        for validator in self.validators.get(&type_tag).into_iter().flatten() {
            if let Err(found) = validator.validate(node) {
                log.merge(found);
            }
        }
        debug!(type_tag = %type_tag, issues = log.len(), "validated node");
        log.into_result()
    }

    /// Validate `node` and every object node nested in it, collecting the
    /// findings of all of them.
    pub fn validate_tree(&self, node: &SerializedNode) -> Result<(), ErrorLog> {
        let mut log = ErrorLog::new();
        node.walk_objects(&mut |object| {
            if let Err(found) = self.validate(object) {
                log.merge(found);
            }
        });
        log.into_result()
    }
}

impl fmt::Debug for ValidationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemas: Vec<&str> = self.schemas.keys().map(TypeTag::as_str).collect();
        schemas.sort_unstable();
        let mut validators: Vec<&str> = self.validators.keys().map(TypeTag::as_str).collect();
        validators.sort_unstable();
        f.debug_struct("ValidationGate")
            .field("schemas", &schemas)
            .field("validators", &validators)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogx_types::{NodeChild, ObjectId, ScalarKind};

    fn tag(s: &str) -> TypeTag {
        TypeTag::new(s).unwrap()
    }

    struct NeedsId(TypeTag);

    impl NodeValidator for NeedsId {
        fn type_tag(&self) -> &TypeTag {
            &self.0
        }

        fn validate(&self, node: &SerializedNode) -> Result<(), ErrorLog> {
            let mut log = ErrorLog::new();
            if node.attribute("id").is_none() {
                log.push(node.name.as_str(), "anonymous");
            }
            log.into_result()
        }
    }

    fn gate() -> ValidationGate {
        let mut gate = ValidationGate::new();
        gate.add_schema(TypeSchema::new(tag("Scan")).attribute("slices", Some(ScalarKind::Int)));
        gate.add_validator(Arc::new(NeedsId(tag("Scan"))));
        gate
    }

    #[test]
    fn schema_and_validator_findings_merge() {
        let node = SerializedNode::object(&tag("Scan"), None);
        let log = gate().validate(&node).unwrap_err();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn uncovered_types_pass() {
        let gate = gate();
        let node = SerializedNode::object(&tag("Note"), None);
        assert!(gate.validate(&node).is_ok());
        assert!(gate.validate(&node).is_ok());
        assert!(!gate.covers(&tag("Note")));
    }

    #[test]
    fn node_without_class_fails() {
        assert!(gate().validate(&SerializedNode::new("loose")).is_err());
    }

    #[test]
    fn tree_validation_visits_nested_objects() {
        let scan = SerializedNode::object(&tag("Scan"), Some(&ObjectId::new("s1").unwrap()))
            .with_attribute("slices", "x");
        let root = SerializedNode::object(&tag("Study"), None).with_child(NodeChild::Element(scan));
        let log = gate().validate_tree(&root).unwrap_err();
        assert_eq!(log.len(), 1);
        assert_eq!(log.issues()[0].path, "Scan@slices");
    }

    #[test]
    fn schemas_listed_in_tag_order() {
        let mut gate = gate();
        gate.add_schema(TypeSchema::new(tag("Patient")));
        let tags: Vec<&str> = gate.schemas().iter().map(|s| s.type_tag.as_str()).collect();
        assert_eq!(tags, vec!["Patient", "Scan"]);
        assert_eq!(gate.len(), 3);
    }
}
