//! Runtime proto3 schema engine.
//!
//! Schema units arrive as IDL text at runtime, get compiled into a
//! [`SchemaContext`], and are then used to resolve Confluent message-index
//! paths and to convert protobuf payloads to and from JSON without any
//! generated code.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod idl;

mod context;
mod linker;
mod resolver;

pub use codec::{DecodeOptions, MAX_RECURSION_DEPTH};
pub use context::SchemaContext;
pub use descriptor::{
    Cardinality, EnumDescriptor, EnumValue, FieldDescriptor, MessageDescriptor, OneofDescriptor,
    ProtoType, UnitDescriptor,
};
pub use error::{CompileError, DecodeError, EncodeError, Error, ResolveError, Result};
pub use idl::ast::Syntax;
