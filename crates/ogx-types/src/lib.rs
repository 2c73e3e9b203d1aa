//! Foundation types for the object-graph archive engine (OGX).
//!
//! This crate provides the identity, object-model and document types used
//! throughout OGX. Every other OGX crate depends on `ogx-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] — Stable string identifier attached to a persisted object
//! - [`TypeTag`] — Explicit type tag selecting a codec
//! - [`ObjectKey`] — In-memory identity of a shared object (pointer identity)
//! - [`DataObject`] / [`ObjectRef`] — The shared, reference-counted object graph
//! - [`SerializedNode`] — Structured-document form of one object
//! - [`IncludeMarker`] — Cross-unit link standing in for a child
//! - [`FormatVersion`] — Archive format version carried by the envelope

pub mod data;
pub mod error;
pub mod node;
pub mod object;
pub mod version;

pub use data::{ChildSlot, DataObject, ObjectRef, ObjectState, Scalar, ScalarKind};
pub use error::TypeError;
pub use node::{IncludeMarker, NodeChild, ObjectReference, SerializedNode};
pub use object::{ObjectId, ObjectKey, TypeTag, UnitId};
pub use version::FormatVersion;
