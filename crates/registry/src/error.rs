//! Error types for registry access and schema compilation.

use protoscribe_engine::CompileError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid schema registry URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Schema registry returned status {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Invalid schema registry response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("Schema {schema} has type {schema_type}, only PROTOBUF is supported")]
    UnsupportedSchemaType { schema: String, schema_type: String },

    #[error("Schema not found: {0}")]
    NotFound(String),

    #[error("Schema reference cycle through \"{0}\"")]
    ReferenceCycle(String),

    #[error("Failed to compile schema unit \"{unit}\": {source}")]
    Compile {
        unit: String,
        #[source]
        source: CompileError,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
