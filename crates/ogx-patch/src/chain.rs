use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ogx_types::{FormatVersion, SerializedNode};
use tracing::{debug, info};

use crate::error::{PatchError, PatchResult};
use crate::step::{PatchContext, PatchStep};

/// Ordered set of patch steps upgrading documents to the current version.
///
/// Several steps may share a `from` version; they run in registration order.
#[derive(Clone)]
pub struct PatchChain {
    current: FormatVersion,
    steps: BTreeMap<FormatVersion, Vec<Arc<dyn PatchStep>>>,
}

impl PatchChain {
    /// A chain with no steps; only documents at `current` load.
    pub fn new(current: FormatVersion) -> Self {
        Self {
            current,
            steps: BTreeMap::new(),
        }
    }

    pub fn current(&self) -> FormatVersion {
        self.current
    }

    pub fn register(&mut self, step: Arc<dyn PatchStep>) -> &mut Self {
        self.steps.entry(step.from_version()).or_default().push(step);
        self
    }

    pub fn with_step(mut self, step: impl PatchStep + 'static) -> Self {
        self.register(Arc::new(step));
        self
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check that a document at `found` can be brought to the current
    /// version, without touching it.
    pub fn check(&self, found: FormatVersion) -> PatchResult<()> {
        if found > self.current {
            return Err(PatchError::UnsupportedFutureVersion {
                found,
                current: self.current,
            });
        }
        let mut version = found;
        while version < self.current {
            if !self.steps.contains_key(&version) {
                return Err(PatchError::UnsupportedPastVersion {
                    found,
                    current: self.current,
                    missing: version,
                });
            }
            version = version.next();
        }
        Ok(())
    }

    /// Upgrade one unit document from `found` to the current version.
    ///
    /// Units emitted by a step are upgraded by the steps after it and are
    /// left in `ctx` at the current version.
    pub fn upgrade(
        &self,
        document: &mut SerializedNode,
        found: FormatVersion,
        ctx: &mut PatchContext,
    ) -> PatchResult<()> {
        self.check(found)?;
        if found == self.current {
            return Ok(());
        }

        let earlier = ctx.take_emitted();
        let mut satellites: Vec<(PathBuf, SerializedNode)> = Vec::new();
        for (&from, steps) in self.steps.range(found..self.current) {
            for step in steps {
                debug!(unit = %ctx.unit().display(), step = step.name(), %from, "applying patch");
                // Units emitted by this step skip it; earlier ones do not.
                let mut produced = Vec::new();
                for (path, unit) in &mut satellites {
                    let mut unit_ctx = PatchContext::new(path.clone());
                    step.apply(unit, &mut unit_ctx)?;
                    produced.extend(unit_ctx.take_emitted());
                }
                step.apply(document, ctx)?;
                produced.extend(ctx.take_emitted());
                satellites.extend(produced);
            }
        }
        for (path, unit) in earlier.into_iter().chain(satellites) {
            ctx.emit(path, unit);
        }

        info!(
            unit = %ctx.unit().display(),
            from = %found,
            to = %self.current,
            emitted = ctx.emitted().len(),
            "upgraded unit"
        );
        Ok(())
    }
}

impl fmt::Debug for PatchChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<(FormatVersion, Vec<&str>)> = self
            .steps
            .iter()
            .map(|(v, s)| (*v, s.iter().map(|s| s.name()).collect()))
            .collect();
        f.debug_struct("PatchChain")
            .field("current", &self.current)
            .field("steps", &steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{ExtractToUnit, RenameType};
    use crate::step::FnStep;
    use ogx_types::node::ATTR_CLASS;
    use ogx_types::{IncludeMarker, NodeChild, ObjectId, TypeTag};

    fn tag(s: &str) -> TypeTag {
        TypeTag::new(s).unwrap()
    }

    fn object(t: &str, id: &str) -> SerializedNode {
        SerializedNode::object(&tag(t), Some(&ObjectId::new(id).unwrap()))
    }

    fn stamp(from: u32, value: &'static str) -> FnStep {
        FnStep::new(FormatVersion(from), value, move |doc, _| {
            let trail = doc.attribute("trail").unwrap_or_default().to_string();
            doc.set_attribute("trail", format!("{trail}{value}"));
            Ok(())
        })
    }

    #[test]
    fn steps_run_in_version_then_registration_order() {
        let chain = PatchChain::new(FormatVersion(4))
            .with_step(stamp(3, "c"))
            .with_step(stamp(1, "a"))
            .with_step(stamp(2, "b1"))
            .with_step(stamp(2, "b2"));
        assert_eq!(chain.len(), 4);

        let mut doc = object("Patient", "p1");
        chain
            .upgrade(&mut doc, FormatVersion(1), &mut PatchContext::new("p.xml"))
            .unwrap();
        assert_eq!(doc.attribute("trail"), Some("ab1b2c"));

        let mut doc = object("Patient", "p1");
        chain
            .upgrade(&mut doc, FormatVersion(3), &mut PatchContext::new("p.xml"))
            .unwrap();
        assert_eq!(doc.attribute("trail"), Some("c"));
    }

    #[test]
    fn current_version_is_untouched() {
        let chain = PatchChain::new(FormatVersion(2)).with_step(stamp(1, "a"));
        let mut doc = object("Patient", "p1");
        chain
            .upgrade(&mut doc, FormatVersion(2), &mut PatchContext::new("p.xml"))
            .unwrap();
        assert_eq!(doc.attribute("trail"), None);
    }

    #[test]
    fn future_version_is_rejected() {
        let chain = PatchChain::new(FormatVersion(2));
        assert!(matches!(
            chain.check(FormatVersion(3)),
            Err(PatchError::UnsupportedFutureVersion { found, current })
                if found == FormatVersion(3) && current == FormatVersion(2)
        ));
    }

    #[test]
    fn gap_in_chain_is_rejected() {
        let chain = PatchChain::new(FormatVersion(4))
            .with_step(stamp(1, "a"))
            .with_step(stamp(3, "c"));
        let mut doc = object("Patient", "p1");
        let result = chain.upgrade(&mut doc, FormatVersion(1), &mut PatchContext::new("p.xml"));
        assert!(matches!(
            result,
            Err(PatchError::UnsupportedPastVersion { missing, .. }) if missing == FormatVersion(2)
        ));
        // Nothing was applied.
        assert_eq!(doc.attribute("trail"), None);
        assert!(chain.check(FormatVersion(3)).is_ok());
    }

    #[test]
    fn emitted_units_receive_later_steps_only() {
        let chain = PatchChain::new(FormatVersion(3))
            .with_step(ExtractToUnit::new(FormatVersion(1), tag("Scan")))
            .with_step(stamp(1, "x"))
            .with_step(RenameType::new(FormatVersion(2), tag("Scan"), tag("Acquisition")));

        let mut doc =
            object("Patient", "p1").with_child(NodeChild::Element(object("Scan", "s1")));
        let mut ctx = PatchContext::new("out/Patient_p1.xml");
        chain.upgrade(&mut doc, FormatVersion(1), &mut ctx).unwrap();

        assert_eq!(doc.children[0], NodeChild::Include(IncludeMarker::new("Scan_s1.xml")));
        let (path, unit) = &ctx.emitted()[0];
        assert_eq!(path, &std::path::PathBuf::from("out/Scan_s1.xml"));
        assert_eq!(unit.attribute(ATTR_CLASS), Some("Acquisition"));
        assert_eq!(unit.attribute("trail"), Some("x"));
    }
}
