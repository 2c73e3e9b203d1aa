//! Unit storage for the object-graph archive engine.
//!
//! A save pass produces a set of *units*: well-formed XML documents, each
//! holding a subtree of the object graph, plus optional out-of-band buffer
//! files. This crate turns [`SerializedNode`](ogx_types::SerializedNode)
//! trees into document bytes and back, and stores those bytes.
//!
//! # Storage Backends
//!
//! All backends implement the [`UnitStore`] trait:
//!
//! - [`FsUnitStore`] -- plain filesystem, each file written through a
//!   temporary sibling and renamed into place
//! - [`InMemoryUnitStore`] -- `BTreeMap`-based store for tests and embedding
//!
//! # External Buffers
//!
//! Objects with a large binary payload do not inline it. A [`BufferHandler`]
//! chooses a location next to the owning unit and moves the bytes; the
//! document only records the protocol tag and relative path.
//!
//! # Design Rules
//!
//! 1. The store never interprets document contents.
//! 2. All I/O errors are propagated with the offending path.
//! 3. `Pending` placeholders never reach the disk.

pub mod buffer;
pub mod document;
pub mod error;
pub mod fs;
pub mod memory;
pub mod paths;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use buffer::{BufferHandler, BufferRegistry, RawBuffers, ZstdBuffers, ATTR_PROTOCOL, BUFFER_ELEMENT};
pub use document::{document_digest, read_document, write_document};
pub use error::{StoreError, StoreResult};
pub use fs::FsUnitStore;
pub use memory::InMemoryUnitStore;
pub use paths::{relative_href, resolve_href};
pub use traits::UnitStore;
