//! Partition units and their document assembly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ogx_dag::HierarchyIndex;
use ogx_store::relative_href;
use ogx_types::{
    IncludeMarker, NodeChild, ObjectKey, ObjectRef, ObjectReference, SerializedNode, UnitId,
};

use crate::error::{PackError, PackResult};
use crate::policy::UnitPath;

/// Physical location of a unit: the save's root folder plus the path
/// policy's relative part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitLocation {
    pub root: PathBuf,
    pub path: UnitPath,
}

impl UnitLocation {
    pub fn new(root: impl Into<PathBuf>, path: UnitPath) -> Self {
        Self {
            root: root.into(),
            path,
        }
    }

    /// Full path of the unit file.
    pub fn file(&self) -> PathBuf {
        self.root.join(self.path.relative())
    }

    /// Folder holding the unit file.
    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.path.folder)
    }
}

/// One output document of a save pass.
#[derive(Debug)]
pub struct PartitionUnit {
    id: UnitId,
    location: UnitLocation,
    members: Vec<ObjectRef>,
}

impl PartitionUnit {
    pub(crate) fn new(id: UnitId, location: UnitLocation) -> Self {
        Self {
            id,
            location,
            members: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, object: &ObjectRef) {
        self.members.push(Arc::clone(object));
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn location(&self) -> &UnitLocation {
        &self.location
    }

    /// Objects owned by this unit, in placement order.
    pub fn members(&self) -> &[ObjectRef] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.id, self.location.file().display())
    }

    /// The one member whose father is absent or lives in another unit.
    pub fn local_root(&self, index: &HierarchyIndex) -> PackResult<ObjectRef> {
        let mut roots = self.members.iter().filter(|member| {
            match index.parent_of(member) {
                None => true,
                Some(father) => index.unit_of(&father) != Some(self.id),
            }
        });
        let root = roots
            .next()
            .ok_or_else(|| PackError::integrity(self.describe(), "no locally rooted object"))?;
        if let Some(second) = roots.next() {
            return Err(PackError::integrity(
                self.describe(),
                format!(
                    "more than one locally rooted object: {} and {}",
                    root.label(),
                    second.label()
                ),
            ));
        }
        Ok(Arc::clone(root))
    }

    /// Build this unit's document tree.
    ///
    /// Starting at the unit's root, every `Pending` child placeholder becomes
    /// the child's inline node (same unit, recorded father, first
    /// occurrence), a reference node (same unit otherwise) or an include
    /// marker (other unit). Fails if a member is left unplaced.
    pub fn build_document(
        &self,
        layout: &UnitLayout,
        index: &HierarchyIndex,
    ) -> PackResult<SerializedNode> {
        let root = layout.root(self.id).ok_or_else(|| {
            PackError::integrity(self.describe(), "unit missing from layout")
        })?;
        let mut placed = HashSet::new();
        placed.insert(root);
        let document = self.assemble(root, layout, index, &mut placed)?;

        if let Some(stray) = self
            .members
            .iter()
            .find(|m| !placed.contains(&ObjectKey::of(m)))
        {
            return Err(PackError::integrity(
                self.describe(),
                format!("{} is not reachable from the unit root", stray.label()),
            ));
        }
        Ok(document)
    }

    fn assemble(
        &self,
        key: ObjectKey,
        layout: &UnitLayout,
        index: &HierarchyIndex,
        placed: &mut HashSet<ObjectKey>,
    ) -> PackResult<SerializedNode> {
        let mut node = index
            .node_of_key(&key)
            .cloned()
            .ok_or_else(|| self.missing(index, &key, "has no recorded node"))?;
        self.resolve_children(&mut node, key, layout, index, placed)?;
        Ok(node)
    }

    fn resolve_children(
        &self,
        node: &mut SerializedNode,
        owner: ObjectKey,
        layout: &UnitLayout,
        index: &HierarchyIndex,
        placed: &mut HashSet<ObjectKey>,
    ) -> PackResult<()> {
        for child in node.children.iter_mut() {
            match child {
                NodeChild::Pending(key) => {
                    let key = *key;
                    *child = self.resolve_pending(key, owner, layout, index, placed)?;
                }
                // Codec wrapper elements (`<entry>`, `<child>`) hold
                // placeholders of the same owner.
                NodeChild::Element(inner) if !inner.is_object_node() => {
                    self.resolve_children(inner, owner, layout, index, placed)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn resolve_pending(
        &self,
        key: ObjectKey,
        owner: ObjectKey,
        layout: &UnitLayout,
        index: &HierarchyIndex,
        placed: &mut HashSet<ObjectKey>,
    ) -> PackResult<NodeChild> {
        let unit = index
            .unit_of_key(&key)
            .ok_or_else(|| self.missing(index, &key, "was never placed in a unit"))?;
        let child_node = index
            .node_of_key(&key)
            .ok_or_else(|| self.missing(index, &key, "has no recorded node"))?;
        let id = child_node
            .object_id()?
            .ok_or_else(|| self.missing(index, &key, "has no id"))?;

        if unit == self.id {
            if index.parent_key(&key) == Some(owner) && placed.insert(key) {
                return Ok(NodeChild::Element(self.assemble(key, layout, index, placed)?));
            }
            let type_tag = child_node
                .type_tag()?
                .ok_or_else(|| self.missing(index, &key, "has no type tag"))?;
            return Ok(NodeChild::Reference(ObjectReference { type_tag, id }));
        }

        let target = layout
            .location(unit)
            .ok_or_else(|| self.missing(index, &key, "lives in an unknown unit"))?;
        let href = relative_href(&self.location.dir(), &target.file());
        let marker = if layout.root(unit) == Some(key) {
            IncludeMarker::new(href)
        } else {
            IncludeMarker::to_object(href, id)
        };
        Ok(NodeChild::Include(marker))
    }

    fn missing(&self, index: &HierarchyIndex, key: &ObjectKey, what: &str) -> PackError {
        let label = index
            .object(key)
            .map(|o| o.label())
            .unwrap_or_else(|| format!("{key:?}"));
        PackError::integrity(self.describe(), format!("child {label} {what}"))
    }
}

/// Locations and roots of every unit in a pass, indexed by [`UnitId`].
#[derive(Debug, Default)]
pub struct UnitLayout {
    locations: Vec<UnitLocation>,
    roots: Vec<ObjectKey>,
}

impl UnitLayout {
    pub(crate) fn push(&mut self, location: UnitLocation, root: ObjectKey) {
        self.locations.push(location);
        self.roots.push(root);
    }

    pub fn location(&self, unit: UnitId) -> Option<&UnitLocation> {
        self.locations.get(unit.0)
    }

    pub fn root(&self, unit: UnitId) -> Option<ObjectKey> {
        self.roots.get(unit.0).copied()
    }

    pub fn file(&self, unit: UnitId) -> Option<PathBuf> {
        self.location(unit).map(UnitLocation::file)
    }
}

/// A unit with its finished document.
#[derive(Debug)]
pub struct AssembledUnit {
    pub id: UnitId,
    pub file: PathBuf,
    pub root: ObjectRef,
    pub document: SerializedNode,
}

impl AssembledUnit {
    pub fn file(&self) -> &Path {
        &self.file
    }
}
