//! Compact bit-level message serialization for bandwidth-constrained
//! channels, in the style of DCCL: a host describes its messages with
//! [`schema::MessageDescriptor`]s, loads them into a [`driver::Driver`],
//! and the driver packs/unpacks values through a registry of pluggable
//! [`codec_trait::FieldCodec`]s addressed by field type and name.
//!
//! This crate does not ship a schema language, code generator, or
//! predicate-expression interpreter; those are external collaborators a
//! host plugs in (see [`dynamic_conditions`] for the predicate boundary).
//! What it does ship: the bit-level wire format, the built-in numeric and
//! primitive codecs, message traversal across codec versions 2 through 4,
//! an adaptive arithmetic coder, the default id scheme, and optional body
//! encryption.

pub mod arithmetic;
pub mod bitvec;
pub mod codec_trait;
pub mod codecs;
pub mod constants;
pub mod context;
pub mod crypto;
pub mod driver;
pub mod dynamic_conditions;
pub mod id_codec;
pub mod message_codec;
pub mod registry;
pub mod result;
pub mod schema;
pub mod value;

pub use driver::Driver;
pub use result::{Error, Result};
pub use schema::{Cardinality, FieldDescriptor, FieldOptions, FieldType, MessageDescriptor, MessageOptions, OneofInfo};
pub use value::{DynamicMessage, FieldValue, MessageView, MessageViewMut, Value};
