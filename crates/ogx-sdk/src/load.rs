//! The load pass: unit reading, patching, validation and decoding.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ogx_codec::{CodecError, CodecRegistry, CodecResult, DecodeContext};
use ogx_gate::{ErrorLog, NodeValidator, SchemaRegistry, TypeSchema, ValidationGate};
use ogx_patch::{envelope, PatchChain, PatchContext};
use ogx_store::{read_document, resolve_href, BufferRegistry, UnitStore, ATTR_PROTOCOL, BUFFER_ELEMENT};
use ogx_types::node::ATTR_HREF;
use ogx_types::{FormatVersion, NodeChild, ObjectId, ObjectRef, SerializedNode, TypeTag};
use tracing::{debug, trace};

use crate::error::{EngineError, EngineResult, ResultExt};
use crate::identity::IdentityTracker;

/// A unit document, upgraded to the current version, with its object nodes
/// indexed by id.
#[derive(Debug)]
struct LoadedUnit {
    path: PathBuf,
    /// Version the unit was stored at.
    version: FormatVersion,
    root: SerializedNode,
    /// Child-index path from `root` to the node carrying each id.
    ids: HashMap<ObjectId, Vec<usize>>,
}

impl LoadedUnit {
    fn new(path: PathBuf, version: FormatVersion, root: SerializedNode) -> EngineResult<Self> {
        let mut ids = HashMap::new();
        index_ids(&root, &mut Vec::new(), &mut ids)?;
        Ok(Self {
            path,
            version,
            root,
            ids,
        })
    }

    fn find(&self, id: &ObjectId) -> Option<&SerializedNode> {
        let path = self.ids.get(id)?;
        path.iter().try_fold(&self.root, |node, &i| match node.children.get(i) {
            Some(NodeChild::Element(inner)) => Some(inner),
            _ => None,
        })
    }
}

fn index_ids(
    node: &SerializedNode,
    path: &mut Vec<usize>,
    ids: &mut HashMap<ObjectId, Vec<usize>>,
) -> EngineResult<()> {
    if node.is_object_node() {
        if let Some(id) = node.object_id()? {
            ids.entry(id).or_insert_with(|| path.clone());
        }
    }
    for (i, child) in node.children.iter().enumerate() {
        if let NodeChild::Element(inner) = child {
            path.push(i);
            index_ids(inner, path, ids)?;
            path.pop();
        }
    }
    Ok(())
}

fn collect_includes(node: &SerializedNode, unit: &Path, out: &mut Vec<PathBuf>) {
    for child in &node.children {
        match child {
            NodeChild::Include(marker) => {
                let target = resolve_href(unit, &marker.href);
                if !out.contains(&target) {
                    out.push(target);
                }
            }
            NodeChild::Element(inner) => collect_includes(inner, unit, out),
            _ => {}
        }
    }
}

/// Summary of one unit of an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitInfo {
    pub path: PathBuf,
    /// Version the unit was stored at, before any patching.
    pub version: FormatVersion,
    /// Label of the unit's root object, `Type#id`.
    pub root: String,
    pub objects: usize,
    /// Units this one includes, in document order.
    pub includes: Vec<PathBuf>,
}

/// Per-load state. Borrowed collaborators belong to the serializer; unit
/// documents are cached for the duration of the pass.
pub(crate) struct Loader<'a> {
    store: &'a dyn UnitStore,
    codecs: &'a CodecRegistry,
    buffers: &'a BufferRegistry,
    patches: &'a PatchChain,
    gate: &'a ValidationGate,
    identity: &'a mut IdentityTracker,
    validate: bool,
    archive_root: PathBuf,
    /// Version found in the root unit; satellites without an envelope are
    /// read at it.
    root_version: Option<FormatVersion>,
    units: HashMap<PathBuf, Arc<LoadedUnit>>,
    /// Units produced by patch steps, already at the current version.
    patched: HashMap<PathBuf, SerializedNode>,
    schemas: HashMap<TypeTag, Option<TypeSchema>>,
    /// Units whose nodes are being decoded, innermost last.
    stack: Vec<Arc<LoadedUnit>>,
}

impl<'a> Loader<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: &'a dyn UnitStore,
        codecs: &'a CodecRegistry,
        buffers: &'a BufferRegistry,
        patches: &'a PatchChain,
        gate: &'a ValidationGate,
        identity: &'a mut IdentityTracker,
        root_file: &Path,
        validate: bool,
    ) -> Self {
        let archive_root = root_file.parent().unwrap_or(Path::new("")).to_path_buf();
        Self {
            store,
            codecs,
            buffers,
            patches,
            gate,
            identity,
            validate,
            archive_root,
            root_version: None,
            units: HashMap::new(),
            patched: HashMap::new(),
            schemas: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Load the object graph rooted in the unit at `root_file`.
    pub fn load(&mut self, root_file: &Path) -> EngineResult<ObjectRef> {
        let unit = self.open_unit(root_file)?;
        self.stack.push(Arc::clone(&unit));
        let result = self.build(&unit.root);
        self.stack.pop();
        result
    }

    /// Every unit reachable from `root_file` through includes, breadth
    /// first.
    pub fn list_units(&mut self, root_file: &Path) -> EngineResult<Vec<UnitInfo>> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([path_clean::clean(root_file)]);
        let mut listed = Vec::new();
        while let Some(path) = queue.pop_front() {
            if !seen.insert(path.clone()) {
                continue;
            }
            let unit = self.open_unit(&path)?;
            let mut objects = 0;
            unit.root.walk_objects(&mut |_| objects += 1);
            let mut includes = Vec::new();
            collect_includes(&unit.root, &unit.path, &mut includes);
            queue.extend(includes.iter().cloned());
            listed.push(UnitInfo {
                path: unit.path.clone(),
                version: unit.version,
                root: root_label(&unit.root),
                objects,
                includes,
            });
        }
        Ok(listed)
    }

    /// Read, unwrap, upgrade and optionally validate the unit at `path`.
    fn open_unit(&mut self, path: &Path) -> EngineResult<Arc<LoadedUnit>> {
        let path = path_clean::clean(path);
        if let Some(unit) = self.units.get(&path) {
            return Ok(Arc::clone(unit));
        }

        let current = self.patches.current();
        let (version, root) = match self.patched.remove(&path) {
            Some(root) => (current, root),
            None => {
                let bytes = self.store.read_required(&path)?;
                let document =
                    read_document(&bytes).context_with(|| format!("reading {}", path.display()))?;
                let opened =
                    envelope::unwrap(document).context_with(|| format!("reading {}", path.display()))?;
                let found = opened
                    .version
                    .or(self.root_version)
                    .unwrap_or(current);
                let mut root = opened.content;
                let mut ctx = PatchContext::new(&path);
                self.patches
                    .upgrade(&mut root, found, &mut ctx)
                    .context_with(|| format!("upgrading {}", path.display()))?;
                for (emitted, document) in ctx.take_emitted() {
                    debug!(unit = %emitted.display(), "unit produced by patching");
                    self.patched.insert(path_clean::clean(emitted), document);
                }
                (found, root)
            }
        };
        self.root_version.get_or_insert(version);

        if self.validate {
            self.validate_unit(&root)
                .context_with(|| format!("validating {}", path.display()))?;
        }

        let unit = Arc::new(LoadedUnit::new(path.clone(), version, root)?);
        debug!(unit = %path.display(), %version, objects = unit.ids.len(), "opened unit");
        self.units.insert(path, Arc::clone(&unit));
        Ok(unit)
    }

    /// Check every object node of a unit, failing with all findings at once.
    fn validate_unit(&mut self, root: &SerializedNode) -> EngineResult<()> {
        let mut nodes = Vec::new();
        root.walk_objects(&mut |node| nodes.push(node));
        let mut log = ErrorLog::new();
        for node in nodes {
            if let Err(found) = self.check(node)? {
                log.merge(found);
            }
        }
        log.into_result().map_err(EngineError::ValidationFailed)
    }

    /// Registered validators and schemas win over the schema files stored
    /// in the archive.
    fn check(&mut self, node: &SerializedNode) -> EngineResult<Result<(), ErrorLog>> {
        let Ok(Some(type_tag)) = node.type_tag() else {
            return Ok(self.gate.validate(node));
        };
        if self.gate.covers(&type_tag) {
            return Ok(self.gate.validate(node));
        }
        if let Some(schema) = self.archive_schema(&type_tag)? {
            return Ok(schema.validate(node));
        }
        Ok(self.gate.validate(node))
    }

    fn archive_schema(&mut self, type_tag: &TypeTag) -> EngineResult<Option<&TypeSchema>> {
        if !self.schemas.contains_key(type_tag) {
            let schema = SchemaRegistry::new(self.store, &self.archive_root).read(type_tag)?;
            if schema.is_some() {
                debug!(%type_tag, "using schema stored with the archive");
            }
            self.schemas.insert(type_tag.clone(), schema);
        }
        Ok(self.schemas.get(type_tag).and_then(Option::as_ref))
    }

    fn current_unit(&self) -> EngineResult<Arc<LoadedUnit>> {
        self.stack
            .last()
            .cloned()
            .ok_or_else(|| EngineError::InvalidArgument("no unit is being decoded".into()))
    }

    /// Resolve the object of an inline node, decoding it when this pass
    /// meets its id for the first time.
    fn build(&mut self, node: &SerializedNode) -> EngineResult<ObjectRef> {
        let unit = self.current_unit()?;
        let type_tag = node.type_tag()?.ok_or_else(|| {
            EngineError::InvalidArgument(format!(
                "element <{}> in {} carries no class",
                node.name,
                unit.path.display()
            ))
        })?;
        let id = node.object_id()?;
        let resolved = self.identity.resolve(&type_tag, id.as_ref())?;
        let object = resolved.object;
        if !resolved.is_new {
            trace!(object = %object.label(), "already decoded");
            return Ok(object);
        }

        let codecs = self.codecs;
        codecs
            .decode(node, &object, self)
            .context_with(|| format!("decoding {} in {}", object.label(), unit.path.display()))?;
        self.load_buffer(node, &object, &unit.path)?;
        trace!(object = %object.label(), "decoded object");
        Ok(object)
    }

    fn load_buffer(&self, node: &SerializedNode, object: &ObjectRef, unit: &Path) -> EngineResult<()> {
        let Some(element) = node
            .elements_named(BUFFER_ELEMENT)
            .find(|e| !e.is_object_node())
        else {
            return Ok(());
        };
        let malformed = |what: &str| {
            EngineError::InvalidArgument(format!(
                "buffer of {} in {} has no {what}",
                object.label(),
                unit.display()
            ))
        };
        let protocol = element.attribute(ATTR_PROTOCOL).ok_or_else(|| malformed("protocol"))?;
        let href = element.attribute(ATTR_HREF).ok_or_else(|| malformed("href"))?;
        let handler = self.buffers.get(protocol)?;
        let source = resolve_href(unit, href);
        handler
            .load_buffer(self.store, object, &source)
            .context_with(|| format!("loading buffer of {}", object.label()))?;
        trace!(object = %object.label(), source = %source.display(), "loaded buffer");
        Ok(())
    }

    /// A reference to a node later in the same unit is decoded from there.
    fn resolve_reference(&mut self, type_tag: &TypeTag, id: &ObjectId) -> EngineResult<ObjectRef> {
        let object = match self.identity.get(id).cloned() {
            Some(object) => object,
            None => {
                let unit = self.current_unit()?;
                let node = unit.find(id).ok_or_else(|| {
                    EngineError::InvalidArgument(format!(
                        "reference to {type_tag}#{id} in {} names no node of the unit",
                        unit.path.display()
                    ))
                })?;
                self.build(node)?
            }
        };
        if object.type_tag() != type_tag {
            return Err(EngineError::TypeMismatch {
                expected: type_tag.to_string(),
                found: object.label(),
            });
        }
        Ok(object)
    }

    fn resolve_include(&mut self, href: &str, target: Option<&ObjectId>) -> EngineResult<ObjectRef> {
        let from = self.current_unit()?;
        let path = resolve_href(&from.path, href);
        let unit = self
            .open_unit(&path)
            .context_with(|| format!("following include {href} in {}", from.path.display()))?;

        if let Some(object) = target.and_then(|id| self.identity.get(id)).cloned() {
            return Ok(object);
        }
        self.stack.push(Arc::clone(&unit));
        let result = match target {
            None => self.build(&unit.root),
            Some(id) => match unit.find(id) {
                Some(node) => self.build(node),
                None => Err(EngineError::InvalidArgument(format!(
                    "include {href} in {} names object {id}, which {} does not hold",
                    from.path.display(),
                    unit.path.display()
                ))),
            },
        };
        self.stack.pop();
        result
    }
}

impl DecodeContext for Loader<'_> {
    fn resolve(&mut self, child: &NodeChild) -> CodecResult<ObjectRef> {
        let resolved = match child {
            NodeChild::Element(node) => self.build(node),
            NodeChild::Reference(reference) => self.resolve_reference(&reference.type_tag, &reference.id),
            NodeChild::Include(marker) => self.resolve_include(&marker.href, marker.object.as_ref()),
            NodeChild::Comment(_) => Err(EngineError::InvalidArgument(
                "a comment does not denote an object".into(),
            )),
            NodeChild::Pending(_) => Err(EngineError::PartitionIntegrity(
                "unassembled placeholder in a stored unit".into(),
            )),
        };
        resolved.map_err(CodecError::context)
    }
}

fn root_label(root: &SerializedNode) -> String {
    let class = root.attribute(ogx_types::node::ATTR_CLASS).unwrap_or(&root.name);
    match root.attribute(ogx_types::node::ATTR_ID) {
        Some(id) => format!("{class}#{id}"),
        None => format!("{class}#<anonymous>"),
    }
}
