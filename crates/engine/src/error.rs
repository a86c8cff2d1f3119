//! Error types for the schema engine.
//!
//! Each engine operation has its own error type so callers can tell a broken
//! schema apart from a broken record. None of them leave a [`SchemaContext`]
//! in a modified state.
//!
//! [`SchemaContext`]: crate::SchemaContext

use thiserror::Error;

/// Failure to compile or link one schema unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("{unit}:{line}:{column}: {message}")]
    Syntax {
        unit: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{unit}: import \"{import}\" has not been added to this context")]
    UnresolvedImport { unit: String, import: String },

    #[error("{unit}: field \"{field}\" refers to unknown type \"{type_name}\"")]
    UnresolvedType {
        unit: String,
        field: String,
        type_name: String,
    },

    #[error("{unit}: \"{name}\" is already defined")]
    DuplicateSymbol { unit: String, name: String },

    #[error("unit \"{unit}\" has already been added to this context")]
    DuplicateUnit { unit: String },

    #[error("{unit}: {message}")]
    Invalid { unit: String, message: String },
}

/// Failure to map a message-index path to a message type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Index out of range at position {position}")]
    IndexOutOfRange { position: usize },

    #[error("Unknown schema unit: {0}")]
    UnknownUnit(String),
}

/// Failure to decode a protobuf payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Could not find descriptor for message type \"{0}\"")]
    UnknownMessageType(String),

    #[error("malformed payload for {message}: {detail}")]
    Malformed { message: String, detail: String },

    #[error("invalid tag {tag} in {message}")]
    InvalidTag { message: String, tag: u32 },

    #[error("invalid wire type {wire_type} for field {field_number} in {message}")]
    InvalidWireType {
        message: String,
        field_number: u32,
        wire_type: u32,
    },

    #[error("length {length} in {message} exceeds the {remaining} remaining bytes")]
    LengthOutOfBounds {
        message: String,
        length: u64,
        remaining: u64,
    },

    #[error("field \"{field}\" of {message} is not valid UTF-8")]
    InvalidUtf8 { message: String, field: String },

    #[error("message nesting exceeds {limit} levels at {message}")]
    RecursionLimitExceeded { message: String, limit: usize },

    #[error("in field \"{field}\": {source}")]
    InField {
        field: String,
        #[source]
        source: Box<DecodeError>,
    },
}

/// Failure to encode a JSON document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("Could not find descriptor for message type \"{0}\"")]
    UnknownMessageType(String),

    #[error("invalid JSON document: {0}")]
    InvalidJson(String),

    #[error("message {message} has no field named \"{field}\"")]
    UnknownField { message: String, field: String },

    #[error("field \"{field}\" expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("value {value} is out of range for field \"{field}\" of type {field_type}")]
    OutOfRange {
        field: String,
        field_type: String,
        value: String,
    },

    #[error("enum {enum_name} has no value named \"{value}\" (field \"{field}\")")]
    UnknownEnumValue {
        field: String,
        enum_name: String,
        value: String,
    },

    #[error("oneof \"{oneof}\" of {message} has more than one member set: {}", .fields.join(", "))]
    MultipleOneofMembers {
        message: String,
        oneof: String,
        fields: Vec<String>,
    },

    #[error("field \"{field}\" is set more than once")]
    DuplicateField { field: String },

    #[error("protobuf output error: {0}")]
    Output(String),
}

/// Any engine error, for callers that do not care which stage failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
