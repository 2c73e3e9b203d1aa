//! Pass-scoped bookkeeping of where every object sits.
//!
//! [`HierarchyIndex`] records, for one save or load pass, each object's
//! father, its children, the serialized node that represents it and the unit
//! that owns that node. It holds no business logic: every `record_*` call is
//! idempotent for an identical mapping and fails with
//! [`DagError::Conflict`] for a different one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use ogx_types::{ObjectKey, ObjectRef, SerializedNode, UnitId};

use crate::error::{DagError, DagResult};

/// The four pass-scoped maps, kept mutually consistent.
#[derive(Default)]
pub struct HierarchyIndex {
    /// Keeps every recorded object alive so its key stays meaningful.
    objects: HashMap<ObjectKey, ObjectRef>,
    parents: HashMap<ObjectKey, ObjectKey>,
    children: HashMap<ObjectKey, Vec<ObjectKey>>,
    nodes: HashMap<ObjectKey, SerializedNode>,
    units: HashMap<ObjectKey, UnitId>,
}

impl HierarchyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn keep(&mut self, object: &ObjectRef) -> ObjectKey {
        let key = ObjectKey::of(object);
        self.objects.entry(key).or_insert_with(|| Arc::clone(object));
        key
    }

    fn label(&self, key: &ObjectKey) -> String {
        self.objects
            .get(key)
            .map(|o| o.label())
            .unwrap_or_else(|| format!("{key:?}"))
    }

    /// Record `parent` as the father of `child`, and `child` among the
    /// children of `parent`.
    pub fn record_parent(&mut self, child: &ObjectRef, parent: &ObjectRef) -> DagResult<()> {
        let child_key = self.keep(child);
        let parent_key = self.keep(parent);
        match self.parents.get(&child_key) {
            Some(existing) if *existing == parent_key => return Ok(()),
            Some(existing) => {
                return Err(DagError::Conflict {
                    map: "parent",
                    object: child.label(),
                    existing: self.label(existing),
                    new: parent.label(),
                })
            }
            None => {}
        }
        self.parents.insert(child_key, parent_key);
        let siblings = self.children.entry(parent_key).or_default();
        if !siblings.contains(&child_key) {
            siblings.push(child_key);
        }
        trace!(child = %child.label(), parent = %parent.label(), "recorded parent");
        Ok(())
    }

    /// Record the serialized node that represents `object`.
    pub fn record_node(&mut self, object: &ObjectRef, node: SerializedNode) -> DagResult<()> {
        let key = self.keep(object);
        match self.nodes.get(&key) {
            Some(existing) if *existing == node => Ok(()),
            Some(existing) => Err(DagError::Conflict {
                map: "node",
                object: object.label(),
                existing: format!("<{}>", existing.name),
                new: format!("<{}>", node.name),
            }),
            None => {
                self.nodes.insert(key, node);
                Ok(())
            }
        }
    }

    /// Record the unit that owns `object`'s node.
    pub fn record_unit(&mut self, object: &ObjectRef, unit: UnitId) -> DagResult<()> {
        let key = self.keep(object);
        match self.units.get(&key) {
            Some(existing) if *existing == unit => Ok(()),
            Some(existing) => Err(DagError::Conflict {
                map: "unit",
                object: object.label(),
                existing: existing.to_string(),
                new: unit.to_string(),
            }),
            None => {
                self.units.insert(key, unit);
                Ok(())
            }
        }
    }

    /// The recorded father of `object`.
    pub fn parent_of(&self, object: &ObjectRef) -> Option<ObjectRef> {
        self.parents
            .get(&ObjectKey::of(object))
            .and_then(|key| self.objects.get(key))
            .cloned()
    }

    /// Children recorded under `object`, in recording order.
    pub fn children_of(&self, object: &ObjectRef) -> Vec<ObjectRef> {
        self.children
            .get(&ObjectKey::of(object))
            .map(|keys| keys.iter().filter_map(|k| self.objects.get(k)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn node_of(&self, object: &ObjectRef) -> Option<&SerializedNode> {
        self.nodes.get(&ObjectKey::of(object))
    }

    pub fn unit_of(&self, object: &ObjectRef) -> Option<UnitId> {
        self.unit_of_key(&ObjectKey::of(object))
    }

    pub fn unit_of_key(&self, key: &ObjectKey) -> Option<UnitId> {
        self.units.get(key).copied()
    }

    /// Look up a recorded object by key.
    pub fn object(&self, key: &ObjectKey) -> Option<&ObjectRef> {
        self.objects.get(key)
    }

    /// Father key of the object with `key`.
    pub fn parent_key(&self, key: &ObjectKey) -> Option<ObjectKey> {
        self.parents.get(key).copied()
    }

    pub fn node_of_key(&self, key: &ObjectKey) -> Option<&SerializedNode> {
        self.nodes.get(key)
    }

    /// Number of objects with a recorded node.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Reset every map. Called at the start of each save and load.
    pub fn clear_all(&mut self) {
        self.objects.clear();
        self.parents.clear();
        self.children.clear();
        self.nodes.clear();
        self.units.clear();
    }
}

impl std::fmt::Debug for HierarchyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyIndex")
            .field("objects", &self.objects.len())
            .field("parents", &self.parents.len())
            .field("nodes", &self.nodes.len())
            .field("units", &self.units.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogx_types::{DataObject, TypeTag};

    fn obj(tag: &str) -> ObjectRef {
        DataObject::new(TypeTag::new(tag).unwrap())
    }

    #[test]
    fn parent_recording_is_idempotent() {
        let mut index = HierarchyIndex::new();
        let (p, c) = (obj("Patient"), obj("Study"));
        index.record_parent(&c, &p).unwrap();
        index.record_parent(&c, &p).unwrap();
        assert!(Arc::ptr_eq(&index.parent_of(&c).unwrap(), &p));
        assert_eq!(index.children_of(&p).len(), 1);
    }

    #[test]
    fn second_father_is_a_conflict() {
        let mut index = HierarchyIndex::new();
        let (p1, p2, c) = (obj("Patient"), obj("Patient"), obj("Acquisition"));
        index.record_parent(&c, &p1).unwrap();
        let err = index.record_parent(&c, &p2).unwrap_err();
        assert!(matches!(err, DagError::Conflict { map: "parent", .. }));
    }

    #[test]
    fn unit_and_node_conflicts() {
        let mut index = HierarchyIndex::new();
        let o = obj("Study");
        index.record_unit(&o, UnitId(0)).unwrap();
        index.record_unit(&o, UnitId(0)).unwrap();
        assert!(matches!(
            index.record_unit(&o, UnitId(1)),
            Err(DagError::Conflict { map: "unit", .. })
        ));

        let node = SerializedNode::new("Study");
        index.record_node(&o, node.clone()).unwrap();
        index.record_node(&o, node).unwrap();
        assert!(matches!(
            index.record_node(&o, SerializedNode::new("Other")),
            Err(DagError::Conflict { map: "node", .. })
        ));
        assert_eq!(index.unit_of(&o), Some(UnitId(0)));
        assert_eq!(index.node_of(&o).unwrap().name, "Study");
    }

    #[test]
    fn clear_all_resets_everything() {
        let mut index = HierarchyIndex::new();
        let (p, c) = (obj("Patient"), obj("Study"));
        index.record_parent(&c, &p).unwrap();
        index.record_unit(&c, UnitId(3)).unwrap();
        index.record_node(&c, SerializedNode::new("Study")).unwrap();
        index.clear_all();
        assert!(index.is_empty());
        assert!(index.parent_of(&c).is_none());
        assert!(index.unit_of(&c).is_none());
        assert_eq!(index.node_count(), 0);
        // After clearing, a new father is accepted.
        index.record_parent(&c, &obj("Patient")).unwrap();
    }

    #[test]
    fn keeps_objects_alive() {
        let mut index = HierarchyIndex::new();
        let o = obj("Temp");
        let key = ObjectKey::of(&o);
        index.record_unit(&o, UnitId(0)).unwrap();
        drop(o);
        assert!(index.object(&key).is_some());
        assert_eq!(index.unit_of_key(&key), Some(UnitId(0)));
    }
}
