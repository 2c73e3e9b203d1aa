//! Visitor-driven walks over an object graph.
//!
//! What happens at an object is the [`Visitor`]'s business; how the walk
//! descends is the [`Strategy`]'s. The walk itself does not dedupe by object
//! identity: a shared object reached through two parents is visited once per
//! parent, and the visitor decides (by returning [`VisitAction::Prune`])
//! whether to descend again. True cycles are rejected up front.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use ogx_types::{ObjectKey, ObjectRef};

use crate::error::{DagError, DagResult};

/// What the walk should do after visiting an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitAction {
    /// Walk into the object's children.
    Descend,
    /// Skip the object's children.
    Prune,
}

/// Per-object callback of a traversal.
pub trait Visitor {
    type Error: From<DagError>;

    /// Called for every (father, object) pair the walk reaches. `father` is
    /// `None` only for the traversal root.
    fn visit(
        &mut self,
        father: Option<&ObjectRef>,
        object: &ObjectRef,
    ) -> Result<VisitAction, Self::Error>;
}

/// Order in which children are reached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Level by level, through a FIFO queue of (parent, child) pairs.
    #[default]
    BreadthFirst,
    /// Pre-order, children in slot order.
    DepthFirst,
}

/// Walk the graph under `root` with the given strategy.
///
/// Fails with [`DagError::CycleDetected`] before the first visit if the
/// graph contains a cycle.
pub fn traverse<V: Visitor>(
    root: &ObjectRef,
    strategy: Strategy,
    visitor: &mut V,
) -> Result<(), V::Error> {
    ensure_acyclic(root)?;
    match strategy {
        Strategy::BreadthFirst => breadth_first(root, visitor),
        Strategy::DepthFirst => depth_first(root, visitor),
    }
}

fn breadth_first<V: Visitor>(root: &ObjectRef, visitor: &mut V) -> Result<(), V::Error> {
    let mut queue: VecDeque<(ObjectRef, ObjectRef)> = VecDeque::new();
    let mut enqueued: HashSet<(ObjectKey, ObjectKey)> = HashSet::new();

    let mut enqueue_children = |queue: &mut VecDeque<(ObjectRef, ObjectRef)>, father: &ObjectRef| {
        for child in father.children() {
            if enqueued.insert((ObjectKey::of(father), ObjectKey::of(&child))) {
                queue.push_back((Arc::clone(father), child));
            }
        }
    };

    if visitor.visit(None, root)? == VisitAction::Descend {
        enqueue_children(&mut queue, root);
    }
    while let Some((father, object)) = queue.pop_front() {
        trace!(father = %father.label(), object = %object.label(), "bfs visit");
        if visitor.visit(Some(&father), &object)? == VisitAction::Descend {
            enqueue_children(&mut queue, &object);
        }
    }
    Ok(())
}

fn depth_first<V: Visitor>(root: &ObjectRef, visitor: &mut V) -> Result<(), V::Error> {
    let mut stack: Vec<(Option<ObjectRef>, ObjectRef)> = vec![(None, Arc::clone(root))];
    while let Some((father, object)) = stack.pop() {
        trace!(object = %object.label(), "dfs visit");
        if visitor.visit(father.as_ref(), &object)? == VisitAction::Descend {
            // Reverse so the first child is popped first.
            for child in object.children().into_iter().rev() {
                stack.push((Some(Arc::clone(&object)), child));
            }
        }
    }
    Ok(())
}

/// Fail if any object under `root` can reach one of its own ancestors.
pub fn ensure_acyclic(root: &ObjectRef) -> DagResult<()> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Colour {
        Grey,
        Black,
    }

    let mut colour: HashMap<ObjectKey, Colour> = HashMap::new();
    // (object, its children, index of the next child to explore)
    let mut stack: Vec<(ObjectRef, Vec<ObjectRef>, usize)> = Vec::new();

    colour.insert(ObjectKey::of(root), Colour::Grey);
    stack.push((Arc::clone(root), root.children(), 0));

    while let Some((_, children, next)) = stack.last_mut() {
        if *next == children.len() {
            if let Some((done, _, _)) = stack.pop() {
                colour.insert(ObjectKey::of(&done), Colour::Black);
            }
            continue;
        }
        let child = Arc::clone(&children[*next]);
        *next += 1;
        match colour.get(&ObjectKey::of(&child)) {
            Some(Colour::Black) => {}
            Some(Colour::Grey) => {
                let mut chain: Vec<String> = stack
                    .iter()
                    .skip_while(|(o, _, _)| !Arc::ptr_eq(o, &child))
                    .map(|(o, _, _)| o.label())
                    .collect();
                chain.push(child.label());
                return Err(DagError::CycleDetected {
                    path: chain.join(" -> "),
                });
            }
            None => {
                colour.insert(ObjectKey::of(&child), Colour::Grey);
                let grandchildren = child.children();
                stack.push((child, grandchildren, 0));
            }
        }
    }
    Ok(())
}

/// Distinct objects under `root` in first-visit order for the strategy.
pub fn visit_order(root: &ObjectRef, strategy: Strategy) -> DagResult<Vec<ObjectRef>> {
    struct Collect {
        seen: HashSet<ObjectKey>,
        order: Vec<ObjectRef>,
    }

    impl Visitor for Collect {
        type Error = DagError;

        fn visit(&mut self, _: Option<&ObjectRef>, object: &ObjectRef) -> DagResult<VisitAction> {
            if !self.seen.insert(ObjectKey::of(object)) {
                return Ok(VisitAction::Prune);
            }
            self.order.push(Arc::clone(object));
            Ok(VisitAction::Descend)
        }
    }

    let mut collect = Collect {
        seen: HashSet::new(),
        order: Vec::new(),
    };
    traverse(root, strategy, &mut collect)?;
    Ok(collect.order)
}
