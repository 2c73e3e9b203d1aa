//! Codecs for the object-graph archive engine.
//!
//! A [`Codec`] translates one object to and from one
//! [`SerializedNode`](ogx_types::SerializedNode). The [`CodecRegistry`] maps type tags to
//! codecs and ships built-ins for the scalar types (`Integer`, `Float`,
//! `Boolean`, `String`) and the two containers (`List`, `Map`). Composite
//! domain types can use the generic [`RecordCodec`]. Saving a type without a
//! codec degrades to the [`OpaqueCodec`] with a warning; loading one fails.

pub mod builtin;
pub mod codec;
pub mod error;
pub mod opaque;
pub mod record;
pub mod registry;

pub use builtin::{ListCodec, MapCodec, ScalarCodec};
pub use codec::{pending, Codec, DecodeContext};
pub use error::{CodecError, CodecResult};
pub use opaque::OpaqueCodec;
pub use record::RecordCodec;
pub use registry::CodecRegistry;
