//! Unit assignment during a save traversal.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace};

use ogx_dag::HierarchyIndex;
use ogx_store::{relative_href, BufferHandler, ATTR_PROTOCOL, BUFFER_ELEMENT};
use ogx_types::node::ATTR_HREF;
use ogx_types::{ObjectId, ObjectKey, ObjectRef, SerializedNode, UnitId};

use crate::error::{PackError, PackResult};
use crate::policy::{PathPolicy, SplitPolicy};
use crate::unit::{AssembledUnit, PartitionUnit, UnitLayout, UnitLocation};

/// An object's buffer and the file it goes to.
#[derive(Debug, Clone)]
pub struct BufferPlacement {
    pub object: ObjectRef,
    pub file: PathBuf,
    pub protocol: String,
}

/// Outcome of [`Partitioner::manage`].
#[derive(Debug)]
pub struct Placement {
    pub unit: UnitId,
    /// `<buffer protocol=".." href=".."/>` element to append to the object's
    /// node, when the object carries a buffer.
    pub buffer: Option<SerializedNode>,
}

/// Assigns every visited object to a unit.
///
/// One partitioner serves one save pass; its policies are reset when it is
/// created.
pub struct Partitioner<'p> {
    root_folder: PathBuf,
    split: &'p mut dyn SplitPolicy,
    paths: &'p mut dyn PathPolicy,
    buffers: Arc<dyn BufferHandler>,
    units: Vec<PartitionUnit>,
    placements: Vec<BufferPlacement>,
}

impl<'p> Partitioner<'p> {
    pub fn new(
        root_folder: impl Into<PathBuf>,
        split: &'p mut dyn SplitPolicy,
        paths: &'p mut dyn PathPolicy,
        buffers: Arc<dyn BufferHandler>,
    ) -> Self {
        split.reset();
        paths.reset();
        Self {
            root_folder: root_folder.into(),
            split,
            paths,
            buffers,
            units: Vec::new(),
            placements: Vec::new(),
        }
    }

    /// Place `son`, discovered under `father` (`None` for the traversal
    /// root).
    ///
    /// The root always starts a unit; any other object joins its father's
    /// unit unless the split policy says otherwise. Records son's father and
    /// unit in the index.
    pub fn manage(
        &mut self,
        father: Option<&ObjectRef>,
        son: &ObjectRef,
        id: &ObjectId,
        index: &mut HierarchyIndex,
    ) -> PackResult<Placement> {
        let unit = match father {
            None => self.open_unit(son, id),
            Some(father) => {
                index.record_parent(son, father)?;
                let father_unit = index.unit_of(father).ok_or_else(|| {
                    PackError::integrity(
                        "<none>",
                        format!("father {} of {} was never placed", father.label(), son.label()),
                    )
                })?;
                if self.split.split(son) {
                    self.open_unit(son, id)
                } else {
                    father_unit
                }
            }
        };
        index.record_unit(son, unit)?;
        self.units[unit.0].push(son);
        trace!(object = %son.label(), %unit, "placed object");

        let buffer = if son.has_buffer() {
            let dir = self.units[unit.0].location().dir();
            let file = self.buffers.locate(&dir, son, id);
            let element = SerializedNode::new(BUFFER_ELEMENT)
                .with_attribute(ATTR_PROTOCOL, self.buffers.protocol())
                .with_attribute(ATTR_HREF, relative_href(&dir, &file));
            self.placements.push(BufferPlacement {
                object: Arc::clone(son),
                file,
                protocol: self.buffers.protocol().to_string(),
            });
            Some(element)
        } else {
            None
        };

        Ok(Placement { unit, buffer })
    }

    fn open_unit(&mut self, son: &ObjectRef, id: &ObjectId) -> UnitId {
        let unit = UnitId(self.units.len());
        let location = UnitLocation::new(&self.root_folder, self.paths.get_path(son, id));
        debug!(%unit, path = %location.file().display(), "opened unit");
        self.units.push(PartitionUnit::new(unit, location));
        unit
    }

    pub fn units(&self) -> &[PartitionUnit] {
        &self.units
    }

    pub fn buffers(&self) -> &[BufferPlacement] {
        &self.placements
    }

    pub fn buffer_handler(&self) -> &Arc<dyn BufferHandler> {
        &self.buffers
    }

    /// Resolve every unit's root, check that no two files collide, and
    /// build every unit's document.
    pub fn assemble(&self, index: &HierarchyIndex) -> PackResult<Vec<AssembledUnit>> {
        let mut layout = UnitLayout::default();
        let mut roots = Vec::with_capacity(self.units.len());
        for unit in &self.units {
            let root = unit.local_root(index)?;
            layout.push(unit.location().clone(), ObjectKey::of(&root));
            roots.push(root);
        }
        self.check_collisions()?;

        let mut assembled = Vec::with_capacity(self.units.len());
        for (unit, root) in self.units.iter().zip(roots) {
            let document = unit.build_document(&layout, index)?;
            debug!(
                unit = %unit.id(),
                root = %root.label(),
                objects = unit.len(),
                "assembled unit"
            );
            assembled.push(AssembledUnit {
                id: unit.id(),
                file: unit.location().file(),
                root,
                document,
            });
        }
        Ok(assembled)
    }

    fn check_collisions(&self) -> PackResult<()> {
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();
        let unit_files = self
            .units
            .iter()
            .map(|u| (u.location().file(), format!("{}", u.id())));
        let buffer_files = self
            .placements
            .iter()
            .map(|b| (b.file.clone(), format!("buffer of {}", b.object.label())));
        for (file, owner) in unit_files.chain(buffer_files) {
            let key = path_key(&file);
            if let Some(first) = claimed.get(&key) {
                return Err(PackError::PathCollision {
                    path: file,
                    first: first.clone(),
                    second: owner,
                });
            }
            claimed.insert(key, owner);
        }
        Ok(())
    }
}

fn path_key(path: &std::path::Path) -> PathBuf {
    path.components().collect()
}

impl std::fmt::Debug for Partitioner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partitioner")
            .field("root_folder", &self.root_folder)
            .field("units", &self.units.len())
            .field("buffers", &self.placements.len())
            .finish()
    }
}
