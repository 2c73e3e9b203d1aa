//! Graph traversal and hierarchy bookkeeping for the object-graph archive
//! engine.
//!
//! [`traverse`] walks a shared object graph breadth-first or depth-first,
//! handing every (father, object) pair to a [`Visitor`]. [`HierarchyIndex`]
//! records what a pass learns about each object: its father, its node and
//! its owning unit.

pub mod error;
pub mod hierarchy;
pub mod traversal;

pub use error::{DagError, DagResult};
pub use hierarchy::HierarchyIndex;
pub use traversal::{ensure_acyclic, traverse, visit_order, Strategy, VisitAction, Visitor};
