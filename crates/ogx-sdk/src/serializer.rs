//! The serializer: one save or load pass at a time over a unit store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ogx_codec::{Codec, CodecRegistry};
use ogx_dag::{traverse, HierarchyIndex, Strategy};
use ogx_gate::{NodeValidator, SchemaRegistry, TypeSchema, ValidationGate};
use ogx_pack::{BufferPlacement, NeverSplit, PathPolicy, Partitioner, SplitPolicy};
use ogx_patch::{PatchChain, PatchStep};
use ogx_store::{BufferHandler, BufferRegistry, FsUnitStore, InMemoryUnitStore, UnitStore};
use ogx_types::{FormatVersion, ObjectRef, TypeTag};
use tracing::{debug, info};

use crate::config::SerializerConfig;
use crate::error::{EngineError, EngineResult, ResultExt};
use crate::identity::IdentityTracker;
use crate::load::{Loader, UnitInfo};
use crate::save::{commit, stage_units, SaveReport, SaveVisitor};

/// Saves object graphs as partitioned XML units and loads them back.
///
/// The serializer owns the pass state (identity table, hierarchy index), so
/// saves and loads on one instance never overlap.
pub struct Serializer {
    config: SerializerConfig,
    store: Arc<dyn UnitStore>,
    codecs: CodecRegistry,
    buffers: BufferRegistry,
    split: Box<dyn SplitPolicy>,
    paths: Box<dyn PathPolicy>,
    patches: PatchChain,
    gate: ValidationGate,
    identity: IdentityTracker,
    index: HierarchyIndex,
}

impl Serializer {
    /// A serializer with the default configuration.
    pub fn new(store: Arc<dyn UnitStore>) -> Self {
        let config = SerializerConfig::default();
        Self::assemble(store, config, Box::new(NeverSplit))
    }

    /// A serializer over files below `base`.
    pub fn on_disk(base: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FsUnitStore::new(base)))
    }

    /// A serializer over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryUnitStore::new()))
    }

    /// A serializer built from `config`. Fails with `InvalidArgument` when
    /// the config names invalid record types or an invalid id prefix.
    pub fn with_config(store: Arc<dyn UnitStore>, config: SerializerConfig) -> EngineResult<Self> {
        config.id_minting.validate()?;
        let split = config.split_policy()?;
        let record_types = config.record_type_tags()?;
        let mut serializer = Self::assemble(store, config, split);
        for type_tag in record_types {
            serializer.codecs.register_record(type_tag);
        }
        Ok(serializer)
    }

    fn assemble(
        store: Arc<dyn UnitStore>,
        config: SerializerConfig,
        split: Box<dyn SplitPolicy>,
    ) -> Self {
        Self {
            paths: config.path_policy(),
            patches: PatchChain::new(config.version()),
            identity: IdentityTracker::new(config.id_minting.clone(), config.conflict_policy),
            split,
            store,
            codecs: CodecRegistry::with_builtin(),
            buffers: BufferRegistry::with_builtin(),
            gate: ValidationGate::new(),
            index: HierarchyIndex::new(),
            config,
        }
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn UnitStore> {
        &self.store
    }

    /// The version new archives are written at and loads upgrade to.
    pub fn current_version(&self) -> FormatVersion {
        self.patches.current()
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn gate(&self) -> &ValidationGate {
        &self.gate
    }

    pub fn identity(&self) -> &IdentityTracker {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut IdentityTracker {
        &mut self.identity
    }

    /// Make a live instance available to later loads; see
    /// [`ConflictPolicy`](crate::ConflictPolicy).
    pub fn adopt(&mut self, object: &ObjectRef) -> EngineResult<()> {
        self.identity.adopt(object)
    }

    pub fn set_split_policy(&mut self, policy: Box<dyn SplitPolicy>) {
        self.split = policy;
    }

    pub fn set_path_policy(&mut self, policy: Box<dyn PathPolicy>) {
        self.paths = policy;
    }

    pub fn set_traversal(&mut self, strategy: Strategy) {
        self.config.traversal = strategy;
    }

    pub fn register_codec(&mut self, type_tag: TypeTag, codec: Arc<dyn Codec>) {
        self.codecs.register(type_tag, codec);
    }

    pub fn register_record(&mut self, type_tag: TypeTag) {
        self.codecs.register_record(type_tag);
    }

    pub fn register_buffer_handler(&mut self, handler: Arc<dyn BufferHandler>) {
        self.buffers.register(handler);
    }

    /// Protocol of the handler that writes buffers on save.
    pub fn set_buffer_protocol(&mut self, protocol: impl Into<String>) {
        self.config.buffer_protocol = protocol.into();
    }

    pub fn add_patch(&mut self, step: impl PatchStep + 'static) {
        self.patches.register(Arc::new(step));
    }

    pub fn add_schema(&mut self, schema: TypeSchema) {
        self.gate.add_schema(schema);
    }

    pub fn add_validator(&mut self, validator: Arc<dyn NodeValidator>) {
        self.gate.add_validator(validator);
    }

    /// Save the graph under `root` into units below `root_folder`.
    ///
    /// Every document is built before the first file is written, so a save
    /// that fails while encoding or assembling leaves the store untouched.
    /// The final commit writes file by file: each file is replaced
    /// atomically, but an I/O error during the commit can leave earlier
    /// files of the batch written.
    pub fn save(
        &mut self,
        root: &ObjectRef,
        root_folder: impl AsRef<Path>,
        write_schema: bool,
    ) -> EngineResult<SaveReport> {
        let root_folder = root_folder.as_ref();
        info!(root = %root.label(), folder = %root_folder.display(), "saving graph");
        self.index.clear_all();
        self.identity.begin_pass();

        let mut report = SaveReport::default();
        let result = self.save_pass(root, root_folder, write_schema, &mut report);
        self.index.clear_all();
        result?;

        info!(
            root = %root.label(),
            units = report.units.len(),
            buffers = report.buffers.len(),
            schemas = report.schemas.len(),
            "saved graph"
        );
        Ok(report)
    }

    fn save_pass(
        &mut self,
        root: &ObjectRef,
        root_folder: &Path,
        write_schema: bool,
        report: &mut SaveReport,
    ) -> EngineResult<()> {
        let handler = self.buffers.get(&self.config.buffer_protocol)?;
        let (units, buffers): (_, Vec<BufferPlacement>) = {
            let mut partitioner = Partitioner::new(
                root_folder,
                &mut *self.split,
                &mut *self.paths,
                Arc::clone(&handler),
            );
            let mut visitor = SaveVisitor {
                identity: &mut self.identity,
                index: &mut self.index,
                codecs: &self.codecs,
                partitioner: &mut partitioner,
            };
            traverse(root, self.config.traversal, &mut visitor)?;
            let units = partitioner.assemble(&self.index)?;
            (units, partitioner.buffers().to_vec())
        };

        let staging = InMemoryUnitStore::new();
        stage_units(units, self.config.version(), &staging, report)?;
        for placement in buffers {
            handler
                .save_buffer(&staging, &placement.object, &placement.file)
                .context_with(|| format!("saving buffer of {}", placement.object.label()))?;
            debug!(object = %placement.object.label(), file = %placement.file.display(), "staged buffer");
            report.buffers.push(placement.file);
        }
        if write_schema {
            let schemas = SchemaRegistry::new(&staging, root_folder).write_all(self.gate.schemas())?;
            report.schemas = schemas;
        }
        commit(&staging, self.store.as_ref())
    }

    /// Load the graph whose root lives in the unit at `file`.
    ///
    /// Older archives are upgraded through the registered patches. With
    /// `validate`, every unit is checked before any of its nodes is decoded.
    pub fn load(&mut self, file: impl AsRef<Path>, validate: bool) -> EngineResult<ObjectRef> {
        let file = file.as_ref();
        info!(file = %file.display(), validate, "loading graph");
        self.index.clear_all();
        self.identity.begin_pass();

        let root = Loader::new(
            self.store.as_ref(),
            &self.codecs,
            &self.buffers,
            &self.patches,
            &self.gate,
            &mut self.identity,
            file,
            validate,
        )
        .load(file)
        .context_with(|| format!("loading {}", file.display()))?;

        info!(root = %root.label(), objects = self.identity.len(), "loaded graph");
        Ok(root)
    }

    /// [`load`](Self::load), failing with `TypeMismatch` unless the root
    /// object has type `expected`.
    pub fn load_as(
        &mut self,
        file: impl AsRef<Path>,
        expected: &TypeTag,
        validate: bool,
    ) -> EngineResult<ObjectRef> {
        let root = self.load(file, validate)?;
        if root.type_tag() != expected {
            return Err(EngineError::TypeMismatch {
                expected: expected.to_string(),
                found: root.type_tag().to_string(),
            });
        }
        Ok(root)
    }

    /// Every unit reachable from the unit at `file`, root first.
    pub fn units(&mut self, file: impl AsRef<Path>) -> EngineResult<Vec<UnitInfo>> {
        let file = file.as_ref();
        Loader::new(
            self.store.as_ref(),
            &self.codecs,
            &self.buffers,
            &self.patches,
            &self.gate,
            &mut self.identity,
            file,
            false,
        )
        .list_units(file)
    }
}

impl std::fmt::Debug for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer")
            .field("config", &self.config)
            .field("codecs", &self.codecs)
            .field("buffers", &self.buffers)
            .field("patches", &self.patches)
            .field("gate", &self.gate)
            .finish()
    }
}
