//! Id-to-instance bookkeeping for save and load passes.

use std::collections::HashMap;
use std::sync::Arc;

use ogx_types::{DataObject, ObjectId, ObjectKey, ObjectRef, TypeTag};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// How fresh ids are produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdMinting {
    /// Random v4 UUIDs.
    #[default]
    Uuid,
    /// `prefix-000001`, `prefix-000002`, ... for reproducible output.
    Sequential { prefix: String },
}

impl IdMinting {
    /// Fails with `InvalidArgument` when this strategy would mint ids that
    /// a load refuses.
    pub fn validate(&self) -> EngineResult<()> {
        if let Self::Sequential { prefix } = self {
            ObjectId::sequential(prefix, 1).map_err(|err| {
                EngineError::InvalidArgument(format!("id prefix {prefix:?}: {err}"))
            })?;
        }
        Ok(())
    }
}

/// What a load does when a node's id names an adopted live instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail with `Conflict`.
    Strict,
    /// Decode into the adopted instance.
    #[default]
    Reuse,
    /// Build a fresh instance under a newly minted id.
    Renew,
}

/// Result of [`IdentityTracker::resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    pub object: ObjectRef,
    /// `false` when the instance was already filled earlier in this pass
    /// and must not be decoded again.
    pub is_new: bool,
}

/// Maps persisted ids to in-memory instances.
///
/// Within one pass the mapping is a bijection: an instance has at most one
/// id and an id names at most one instance. Pass state is dropped by
/// [`begin_pass`](Self::begin_pass); adopted instances survive until
/// [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct IdentityTracker {
    minting: IdMinting,
    conflicts: ConflictPolicy,
    sequence: u64,
    by_id: HashMap<ObjectId, ObjectRef>,
    by_key: HashMap<ObjectKey, ObjectId>,
    adopted: HashMap<ObjectId, ObjectRef>,
}

impl IdentityTracker {
    pub fn new(minting: IdMinting, conflicts: ConflictPolicy) -> Self {
        Self {
            minting,
            conflicts,
            ..Self::default()
        }
    }

    pub fn set_minting(&mut self, minting: IdMinting) -> EngineResult<()> {
        minting.validate()?;
        self.minting = minting;
        Ok(())
    }

    pub fn set_conflict_policy(&mut self, conflicts: ConflictPolicy) {
        self.conflicts = conflicts;
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflicts
    }

    /// Drop the bindings of the previous pass.
    pub fn begin_pass(&mut self) {
        self.by_id.clear();
        self.by_key.clear();
    }

    /// Forget everything, adopted instances included.
    pub fn clear(&mut self) {
        self.begin_pass();
        self.adopted.clear();
        self.sequence = 0;
    }

    /// Number of ids bound in the current pass.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Instance bound to `id` in the current pass.
    pub fn get(&self, id: &ObjectId) -> Option<&ObjectRef> {
        self.by_id.get(id)
    }

    /// Register a live instance that later loads may meet by id.
    pub fn adopt(&mut self, object: &ObjectRef) -> EngineResult<()> {
        let id = object.id().ok_or_else(|| {
            EngineError::InvalidArgument(format!("cannot adopt anonymous {}", object.label()))
        })?;
        self.adopted.insert(id, Arc::clone(object));
        Ok(())
    }

    /// Save direction: the id of `object`, minted and stored on the object
    /// the first time it is seen.
    ///
    /// An id already carried by another instance of this pass is replaced.
    pub fn id_for(&mut self, object: &ObjectRef) -> EngineResult<ObjectId> {
        let key = ObjectKey::of(object);
        if let Some(id) = self.by_key.get(&key) {
            return Ok(id.clone());
        }
        let id = match object.id() {
            Some(id) if !self.by_id.contains_key(&id) => id,
            Some(taken) => {
                let fresh = self.mint()?;
                warn!(object = %object.label(), %taken, %fresh, "id already in use; minted a new one");
                object.set_id(fresh.clone());
                fresh
            }
            None => {
                let fresh = self.mint()?;
                object.set_id(fresh.clone());
                fresh
            }
        };
        self.bind(id.clone(), object);
        Ok(id)
    }

    /// Load direction: the instance for a node of `type_tag` carrying `id`.
    ///
    /// Anonymous nodes always get a fresh, unbound instance.
    pub fn resolve(&mut self, type_tag: &TypeTag, id: Option<&ObjectId>) -> EngineResult<Resolved> {
        let Some(id) = id else {
            return Ok(Resolved {
                object: DataObject::new(type_tag.clone()),
                is_new: true,
            });
        };

        if let Some(existing) = self.by_id.get(id) {
            check_type(existing, type_tag, id)?;
            return Ok(Resolved {
                object: Arc::clone(existing),
                is_new: false,
            });
        }

        let object = match self.adopted.get(id).cloned() {
            None => DataObject::with_id(type_tag.clone(), id.clone()),
            Some(live) => match self.conflicts {
                ConflictPolicy::Strict => {
                    return Err(EngineError::Conflict(format!(
                        "id {id} is already held by live instance {}",
                        live.label()
                    )))
                }
                ConflictPolicy::Reuse => {
                    check_type(&live, type_tag, id)?;
                    debug!(object = %live.label(), "reusing adopted instance");
                    live
                }
                ConflictPolicy::Renew => {
                    let fresh = self.mint()?;
                    warn!(%id, %fresh, "id held by a live instance; loading under a new id");
                    let object = DataObject::with_id(type_tag.clone(), fresh.clone());
                    self.by_key.insert(ObjectKey::of(&object), fresh);
                    // Other nodes naming `id` in this pass share the renewed instance.
                    self.by_id.insert(id.clone(), Arc::clone(&object));
                    return Ok(Resolved {
                        object,
                        is_new: true,
                    });
                }
            },
        };
        self.bind(id.clone(), &object);
        Ok(Resolved {
            object,
            is_new: true,
        })
    }

    fn bind(&mut self, id: ObjectId, object: &ObjectRef) {
        self.by_key.insert(ObjectKey::of(object), id.clone());
        self.by_id.insert(id, Arc::clone(object));
    }

    fn mint(&mut self) -> EngineResult<ObjectId> {
        match &self.minting {
            IdMinting::Uuid => Ok(ObjectId::generate()),
            IdMinting::Sequential { prefix } => loop {
                self.sequence += 1;
                let id = ObjectId::sequential(prefix, self.sequence)?;
                if !self.by_id.contains_key(&id) && !self.adopted.contains_key(&id) {
                    break Ok(id);
                }
            },
        }
    }
}

fn check_type(object: &ObjectRef, type_tag: &TypeTag, id: &ObjectId) -> EngineResult<()> {
    if object.type_tag() == type_tag {
        Ok(())
    } else {
        Err(EngineError::TypeMismatch {
            expected: type_tag.to_string(),
            found: format!("{} (id {id})", object.type_tag()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn tag(s: &str) -> TypeTag {
        TypeTag::new(s).unwrap()
    }

    fn id(s: &str) -> ObjectId {
        ObjectId::new(s).unwrap()
    }

    fn sequential() -> IdentityTracker {
        IdentityTracker::new(
            IdMinting::Sequential {
                prefix: "obj".into(),
            },
            ConflictPolicy::Reuse,
        )
    }

    #[test]
    fn id_for_is_stable_and_stored_on_object() {
        let mut tracker = sequential();
        let a = DataObject::new(tag("Patient"));
        let first = tracker.id_for(&a).unwrap();
        assert_eq!(first, id("obj-000001"));
        assert_eq!(tracker.id_for(&a).unwrap(), first);
        assert_eq!(a.id(), Some(first));
    }

    #[test]
    fn existing_ids_are_kept() {
        let mut tracker = sequential();
        let a = DataObject::with_id(tag("Patient"), id("p1"));
        assert_eq!(tracker.id_for(&a).unwrap(), id("p1"));
    }

    #[test]
    fn duplicate_id_on_distinct_objects_is_reminted() {
        let mut tracker = sequential();
        let a = DataObject::with_id(tag("Patient"), id("p1"));
        let b = DataObject::with_id(tag("Patient"), id("p1"));
        tracker.id_for(&a).unwrap();
        let second = tracker.id_for(&b).unwrap();
        assert_ne!(second, id("p1"));
        assert_eq!(b.id(), Some(second));
    }

    #[test]
    fn resolve_returns_one_instance_per_id() {
        let mut tracker = sequential();
        let first = tracker.resolve(&tag("Study"), Some(&id("s1"))).unwrap();
        let second = tracker.resolve(&tag("Study"), Some(&id("s1"))).unwrap();
        assert!(first.is_new);
        assert!(!second.is_new);
        assert!(Arc::ptr_eq(&first.object, &second.object));
        assert_eq!(first.object.id(), Some(id("s1")));
    }

    #[test]
    fn anonymous_nodes_are_never_shared() {
        let mut tracker = sequential();
        let a = tracker.resolve(&tag("Note"), None).unwrap();
        let b = tracker.resolve(&tag("Note"), None).unwrap();
        assert!(a.is_new && b.is_new);
        assert!(!Arc::ptr_eq(&a.object, &b.object));
        assert!(tracker.is_empty());
    }

    #[test]
    fn resolve_rejects_type_change() {
        let mut tracker = sequential();
        tracker.resolve(&tag("Study"), Some(&id("x"))).unwrap();
        let err = tracker.resolve(&tag("Patient"), Some(&id("x"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn begin_pass_forgets_bindings_but_not_adoptions() {
        let mut tracker = sequential();
        let live = DataObject::with_id(tag("Study"), id("s1"));
        tracker.adopt(&live).unwrap();
        tracker.resolve(&tag("Study"), Some(&id("s2"))).unwrap();
        tracker.begin_pass();
        assert!(tracker.get(&id("s2")).is_none());

        let resolved = tracker.resolve(&tag("Study"), Some(&id("s1"))).unwrap();
        assert!(Arc::ptr_eq(&resolved.object, &live));
        assert!(resolved.is_new);

        tracker.clear();
        tracker.begin_pass();
        let resolved = tracker.resolve(&tag("Study"), Some(&id("s1"))).unwrap();
        assert!(!Arc::ptr_eq(&resolved.object, &live));
    }

    #[test]
    fn conflict_policies() {
        let live = DataObject::with_id(tag("Study"), id("s1"));

        let mut strict = sequential();
        strict.set_conflict_policy(ConflictPolicy::Strict);
        strict.adopt(&live).unwrap();
        let err = strict.resolve(&tag("Study"), Some(&id("s1"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let mut renew = sequential();
        renew.set_conflict_policy(ConflictPolicy::Renew);
        renew.adopt(&live).unwrap();
        let first = renew.resolve(&tag("Study"), Some(&id("s1"))).unwrap();
        assert!(!Arc::ptr_eq(&first.object, &live));
        assert_eq!(first.object.id(), Some(id("obj-000001")));
        let again = renew.resolve(&tag("Study"), Some(&id("s1"))).unwrap();
        assert!(Arc::ptr_eq(&first.object, &again.object));
        assert!(!again.is_new);
    }

    #[test]
    fn bad_sequential_prefix_is_refused() {
        let mut tracker = sequential();
        let err = tracker
            .set_minting(IdMinting::Sequential {
                prefix: "my obj".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        // The previous strategy stays in place.
        let a = DataObject::new(tag("Patient"));
        assert_eq!(tracker.id_for(&a).unwrap(), id("obj-000001"));

        let mut unchecked = IdentityTracker::new(
            IdMinting::Sequential {
                prefix: "a/b".into(),
            },
            ConflictPolicy::Reuse,
        );
        let err = unchecked.id_for(&DataObject::new(tag("Patient"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn adopt_requires_id() {
        let mut tracker = sequential();
        let err = tracker.adopt(&DataObject::new(tag("Study"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    proptest! {
        #[test]
        fn prop_ids_form_a_bijection(n in 1usize..40, repeats in 1usize..4) {
            let mut tracker = sequential();
            let objects: Vec<ObjectRef> =
                (0..n).map(|_| DataObject::new(tag("Node"))).collect();
            let mut seen = std::collections::HashSet::new();
            for _ in 0..repeats {
                for object in &objects {
                    let id = tracker.id_for(object).unwrap();
                    seen.insert(id);
                }
            }
            prop_assert_eq!(seen.len(), n);
            prop_assert_eq!(tracker.len(), n);
        }
    }
}
