use serde_json::Value;

use crate::codec::{DecodeOptions, ProtoDecoder, ProtoEncoder};
use crate::descriptor::{DescriptorPool, EnumDescriptor, MessageDescriptor, UnitDescriptor};
use crate::error::{CompileError, DecodeError, EncodeError, ResolveError};
use crate::{idl, linker, resolver};

/// A set of linked schema units and everything needed to resolve, decode and
/// encode messages they declare.
///
/// Units are added one at a time, dependencies first. Once every unit is in,
/// the context is only read and can be shared across threads.
///
/// ```
/// use protoscribe_engine::SchemaContext;
///
/// let mut context = SchemaContext::new();
/// context
///     .add_unit("test.proto", r#"
///         syntax = "proto3";
///         message Test { int32 data = 1; }
///     "#)
///     .unwrap();
///
/// let name = context.resolve_name("test.proto", &[]).unwrap();
/// assert_eq!(context.decode(&name, &[0x08, 0x07]).unwrap(), r#"{"data":7}"#);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaContext {
    pool: DescriptorPool,
}

impl SchemaContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `idl_text` and registers it under `name`, the path other
    /// units use to import it. Either the whole unit is added or nothing is.
    pub fn add_unit(&mut self, name: &str, idl_text: &str) -> Result<(), CompileError> {
        if self.has_unit(name) {
            return Err(CompileError::DuplicateUnit {
                unit: name.to_string(),
            });
        }
        let file = idl::parse(name, idl_text)?;
        let linked = linker::link(&self.pool, name, &file)?;
        self.pool.commit(linked);
        tracing::debug!(unit = name, "added schema unit");
        Ok(())
    }

    pub fn has_unit(&self, name: &str) -> bool {
        self.pool.unit_by_name(name).is_some()
    }

    /// Registered units in insertion order.
    pub fn units(&self) -> impl Iterator<Item = &UnitDescriptor> {
        self.pool.units()
    }

    pub fn unit(&self, name: &str) -> Option<&UnitDescriptor> {
        self.pool.unit_by_name(name)
    }

    /// Looks up a message by fully qualified name, with or without the
    /// leading dot. Map entry messages are not reachable this way.
    pub fn message(&self, name: &str) -> Option<&MessageDescriptor> {
        self.pool.message_by_name(name)
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumDescriptor> {
        self.pool.enum_by_name(name)
    }

    /// Top-level messages of a unit in declaration order.
    pub fn messages_in(&self, unit: &str) -> Option<Vec<&MessageDescriptor>> {
        self.pool
            .unit_by_name(unit)
            .map(|u| u.messages().iter().map(|&id| self.pool.message(id)).collect())
    }

    /// Underlying arena, for walking descriptor ids.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    pub fn resolve(&self, root_unit: &str, indices: &[i64]) -> Result<&MessageDescriptor, ResolveError> {
        resolver::resolve(&self.pool, root_unit, indices)
    }

    /// Like [`resolve`](Self::resolve) but returns the fully qualified name.
    pub fn resolve_name(&self, root_unit: &str, indices: &[i64]) -> Result<String, ResolveError> {
        self.resolve(root_unit, indices)
            .map(|m| m.full_name().to_string())
    }

    /// Index path that selects `message_type` within its own unit.
    pub fn message_index(&self, message_type: &str) -> Option<Vec<i64>> {
        self.message(message_type)
            .and_then(|m| resolver::index_path(&self.pool, m))
    }

    /// Decodes `payload` and renders it as compact JSON text.
    pub fn decode(&self, message_type: &str, payload: &[u8]) -> Result<String, DecodeError> {
        self.decode_value(message_type, payload)
            .map(|value| value.to_string())
    }

    pub fn decode_value(&self, message_type: &str, payload: &[u8]) -> Result<Value, DecodeError> {
        self.decode_with(message_type, payload, &DecodeOptions::default())
    }

    pub fn decode_with(
        &self,
        message_type: &str,
        payload: &[u8],
        options: &DecodeOptions,
    ) -> Result<Value, DecodeError> {
        let message = self
            .message(message_type)
            .ok_or_else(|| DecodeError::UnknownMessageType(message_type.to_string()))?;
        ProtoDecoder::new(&self.pool, options).decode(message, payload)
    }

    /// Parses `json_text` and encodes it as `message_type`.
    pub fn encode(&self, message_type: &str, json_text: &str) -> Result<Vec<u8>, EncodeError> {
        let message = self
            .message(message_type)
            .ok_or_else(|| EncodeError::UnknownMessageType(message_type.to_string()))?;
        let value: Value =
            serde_json::from_str(json_text).map_err(|e| EncodeError::InvalidJson(e.to_string()))?;
        ProtoEncoder::new(&self.pool).encode(message, &value)
    }

    pub fn encode_value(&self, message_type: &str, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let message = self
            .message(message_type)
            .ok_or_else(|| EncodeError::UnknownMessageType(message_type.to_string()))?;
        ProtoEncoder::new(&self.pool).encode(message, value)
    }
}
