//! Document validation for object-graph archives.
//!
//! On a validated load every object node is checked before it is decoded.
//! The [`ValidationGate`] routes each node to the [`NodeValidator`]s and
//! [`TypeSchema`]s registered for its type and merges their findings into
//! one [`ErrorLog`]. Schemas are plain data; [`SchemaRegistry`] stores them
//! alongside an archive so a later load can validate against them.

pub mod error;
pub mod gate;
pub mod log;
pub mod registry;
pub mod schema;
pub mod validator;

pub use error::{GateError, GateResult};
pub use gate::ValidationGate;
pub use log::{ErrorLog, Issue};
pub use registry::{SchemaRegistry, SCHEMA_FOLDER};
pub use schema::{AttributeRule, FieldRule, TypeSchema};
pub use validator::NodeValidator;
