use std::fmt;
use std::path::{Path, PathBuf};

use ogx_types::{FormatVersion, SerializedNode};

use crate::error::PatchResult;

/// One upgrade of a unit document from [`from_version`](Self::from_version)
/// to the next version.
///
/// Steps receive the bare content of every unit in the archive, the root
/// unit first, and rewrite it in place.
pub trait PatchStep: Send + Sync {
    fn from_version(&self) -> FormatVersion;

    /// Short description used in logs and errors.
    fn name(&self) -> &str;

    fn apply(&self, document: &mut SerializedNode, ctx: &mut PatchContext) -> PatchResult<()>;
}

/// Per-unit state handed to patch steps.
///
/// A step can move parts of a document into new units; emitted units are
/// patched by the remaining steps of the chain and then served to the
/// loader as if they had been read from disk.
#[derive(Debug)]
pub struct PatchContext {
    unit: PathBuf,
    emitted: Vec<(PathBuf, SerializedNode)>,
}

impl PatchContext {
    pub fn new(unit: impl Into<PathBuf>) -> Self {
        Self {
            unit: unit.into(),
            emitted: Vec::new(),
        }
    }

    /// Path of the unit being patched.
    pub fn unit(&self) -> &Path {
        &self.unit
    }

    /// Folder of the unit being patched.
    pub fn folder(&self) -> &Path {
        self.unit.parent().unwrap_or(Path::new(""))
    }

    /// Add a new unit at `path`.
    pub fn emit(&mut self, path: impl Into<PathBuf>, document: SerializedNode) {
        self.emitted.push((path.into(), document));
    }

    pub fn emitted(&self) -> &[(PathBuf, SerializedNode)] {
        &self.emitted
    }

    pub fn take_emitted(&mut self) -> Vec<(PathBuf, SerializedNode)> {
        std::mem::take(&mut self.emitted)
    }
}

type PatchFn = dyn Fn(&mut SerializedNode, &mut PatchContext) -> PatchResult<()> + Send + Sync;

/// A patch step backed by a closure.
pub struct FnStep {
    from: FormatVersion,
    name: String,
    f: Box<PatchFn>,
}

impl FnStep {
    pub fn new<F>(from: FormatVersion, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut SerializedNode, &mut PatchContext) -> PatchResult<()> + Send + Sync + 'static,
    {
        Self {
            from,
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl fmt::Debug for FnStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep")
            .field("from", &self.from)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PatchStep for FnStep {
    fn from_version(&self) -> FormatVersion {
        self.from
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, document: &mut SerializedNode, ctx: &mut PatchContext) -> PatchResult<()> {
        (self.f)(document, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PatchError;

    #[test]
    fn fn_step_runs_closure() {
        let step = FnStep::new(FormatVersion(1), "stamp", |doc, _| {
            doc.set_attribute("stamped", "yes");
            Ok(())
        });
        let mut doc = SerializedNode::new("Patient");
        step.apply(&mut doc, &mut PatchContext::new("a/Patient.xml"))
            .unwrap();
        assert_eq!(doc.attribute("stamped"), Some("yes"));
        assert_eq!(step.from_version(), FormatVersion(1));
        assert_eq!(step.name(), "stamp");
    }

    #[test]
    fn fn_step_errors_propagate() {
        let step = FnStep::new(FormatVersion(2), "fail", |_, _| {
            Err(PatchError::step("fail", "nope"))
        });
        let result = step.apply(&mut SerializedNode::new("X"), &mut PatchContext::new("X.xml"));
        assert!(matches!(result, Err(PatchError::Step { .. })));
    }

    #[test]
    fn context_collects_emitted_units() {
        let mut ctx = PatchContext::new("out/root.xml");
        assert_eq!(ctx.folder(), Path::new("out"));
        ctx.emit("out/a.xml", SerializedNode::new("A"));
        assert_eq!(ctx.emitted().len(), 1);
        let taken = ctx.take_emitted();
        assert_eq!(taken[0].0, PathBuf::from("out/a.xml"));
        assert!(ctx.emitted().is_empty());
    }
}
