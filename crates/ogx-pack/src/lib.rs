//! Partitioning of a save pass into units.
//!
//! During traversal the [`Partitioner`] assigns every object to a
//! [`PartitionUnit`]: the traversal root opens the first unit, and each
//! other object joins its father's unit unless the [`SplitPolicy`] starts a
//! new one, named by the [`PathPolicy`]. Once traversal is done,
//! [`Partitioner::assemble`] builds each unit's document, linking children
//! inline, by same-unit reference, or by include marker across units.
//!
//! # Built-in policies
//!
//! - Split: [`AlwaysSplit`], [`NeverSplit`], [`ListManaged`]
//! - Path: [`TypeAndId`] (`Type_id.xml`), [`Index`] (`Type_N.xml`),
//!   [`UniquePath`] (fixed, only sound with `NeverSplit`)

pub mod error;
pub mod partitioner;
pub mod policy;
pub mod unit;

pub use error::{PackError, PackResult};
pub use partitioner::{BufferPlacement, Partitioner, Placement};
pub use policy::{
    AlwaysSplit, Index, ListManaged, NeverSplit, PathPolicy, SplitPolicy, TypeAndId, UniquePath,
    UnitPath,
};
pub use unit::{AssembledUnit, PartitionUnit, UnitLayout, UnitLocation};
