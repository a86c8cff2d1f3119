//! Schema-registry access for protoscribe.
//!
//! [`RegistryClient`] talks to a Confluent-compatible registry over HTTP,
//! [`SchemaCache`] turns schema ids into compiled, shareable
//! [`SchemaContext`](protoscribe_engine::SchemaContext)s.

mod cache;
mod client;
mod error;
mod source;

pub use cache::{SchemaCache, ROOT_UNIT};
pub use client::{RegistryClient, RegistryConfig};
pub use error::{RegistryError, Result};
pub use source::{RegisteredSchema, SchemaReference, SchemaSource, StaticSource};
