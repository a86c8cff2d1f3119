//! JSON value to protobuf binary conversion driven by linked descriptors.
//!
//! Output is canonical: fields in ascending number order, repeated numeric
//! fields packed unless the schema says otherwise, implicit-presence fields
//! left out when they hold their default.

use base64::Engine as _;
use serde_json::{Map, Value};

use crate::codec::wire::{zigzag_encode32, zigzag_encode64, WireError, WireType, WireWriter};
use crate::descriptor::{Cardinality, DescriptorPool, FieldDescriptor, MessageDescriptor, ProtoType};
use crate::error::EncodeError;

/// A converted field value in its wire representation.
#[derive(Debug, Clone, PartialEq)]
enum WireValue {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Bytes(Vec<u8>),
}

impl WireValue {
    fn wire_type(&self) -> WireType {
        match self {
            WireValue::Varint(_) => WireType::Varint,
            WireValue::Fixed32(_) => WireType::Fixed32,
            WireValue::Fixed64(_) => WireType::Fixed64,
            WireValue::Bytes(_) => WireType::LengthDelimited,
        }
    }

    /// Zero bits. `-0.0` is not a default.
    fn is_default(&self) -> bool {
        match self {
            WireValue::Varint(v) | WireValue::Fixed64(v) => *v == 0,
            WireValue::Fixed32(v) => *v == 0,
            WireValue::Bytes(b) => b.is_empty(),
        }
    }

    fn write(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError> {
        match self {
            WireValue::Varint(v) => writer.write_varint(*v),
            WireValue::Fixed32(v) => writer.write_fixed32(*v),
            WireValue::Fixed64(v) => writer.write_fixed64(*v),
            WireValue::Bytes(b) => writer.write_length_delimited(b),
        }
    }

    fn write_tagged(&self, writer: &mut WireWriter<'_>, number: u32) -> Result<(), WireError> {
        writer.write_tag(number, self.wire_type())?;
        self.write(writer)
    }
}

pub struct ProtoEncoder<'a> {
    pool: &'a DescriptorPool,
}

impl<'a> ProtoEncoder<'a> {
    pub fn new(pool: &'a DescriptorPool) -> Self {
        Self { pool }
    }

    pub fn encode(&self, message: &MessageDescriptor, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let object = value.as_object().ok_or_else(|| EncodeError::TypeMismatch {
            field: message.full_name().to_string(),
            expected: "object".to_string(),
            actual: kind_of(value).to_string(),
        })?;
        self.encode_object(message, object)
    }

    fn encode_object(
        &self,
        message: &MessageDescriptor,
        object: &Map<String, Value>,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut present: Vec<(&FieldDescriptor, &Value)> = Vec::with_capacity(object.len());
        for (key, value) in object {
            let field = message
                .field_by_name(key)
                .ok_or_else(|| EncodeError::UnknownField {
                    message: message.full_name().to_string(),
                    field: key.clone(),
                })?;
            if value.is_null() {
                continue;
            }
            if present.iter().any(|(f, _)| f.number() == field.number()) {
                return Err(EncodeError::DuplicateField {
                    field: field.name().to_string(),
                });
            }
            present.push((field, value));
        }

        for oneof in message.oneofs() {
            let members: Vec<String> = oneof
                .field_indices()
                .iter()
                .map(|&i| &message.fields()[i])
                .filter(|f| present.iter().any(|(p, _)| p.number() == f.number()))
                .map(|f| f.name().to_string())
                .collect();
            if members.len() > 1 {
                return Err(EncodeError::MultipleOneofMembers {
                    message: message.full_name().to_string(),
                    oneof: oneof.name().to_string(),
                    fields: members,
                });
            }
        }

        present.sort_by_key(|(field, _)| field.number());

        let mut buffer = Vec::new();
        let mut writer = WireWriter::new(&mut buffer);
        for (field, value) in present {
            self.encode_field(&mut writer, field, value)?;
        }
        writer.finish().map_err(output_error)?;
        Ok(buffer)
    }

    fn encode_field(
        &self,
        writer: &mut WireWriter<'_>,
        field: &FieldDescriptor,
        value: &Value,
    ) -> Result<(), EncodeError> {
        match field.cardinality() {
            Cardinality::Map => {
                let entries = value
                    .as_object()
                    .ok_or_else(|| mismatch(field, "object", value))?;
                let ProtoType::Message(entry_id) = field.field_type() else {
                    return Err(mismatch(field, "map", value));
                };
                let entry = self.pool.message(entry_id);
                let [key_field, value_field] = entry.fields() else {
                    return Err(EncodeError::Output(format!(
                        "map entry {} must have exactly a key and a value",
                        entry.full_name()
                    )));
                };
                for (key, item) in entries {
                    let key = self.to_wire(key_field, &map_key_value(key_field, key))?;
                    let item = if item.is_null() {
                        self.default_wire(value_field)
                    } else {
                        self.to_wire(value_field, item)?
                    };
                    let mut entry_bytes = Vec::new();
                    let mut entry_writer = WireWriter::new(&mut entry_bytes);
                    key.write_tagged(&mut entry_writer, key_field.number())
                        .map_err(output_error)?;
                    item.write_tagged(&mut entry_writer, value_field.number())
                        .map_err(output_error)?;
                    entry_writer.finish().map_err(output_error)?;
                    WireValue::Bytes(entry_bytes)
                        .write_tagged(writer, field.number())
                        .map_err(output_error)?;
                }
            }
            Cardinality::Repeated => {
                let items = value
                    .as_array()
                    .ok_or_else(|| mismatch(field, "array", value))?;
                if items.is_empty() {
                    return Ok(());
                }
                let mut converted = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        return Err(mismatch(field, field.field_type().type_name(), item));
                    }
                    converted.push(self.to_wire(field, item)?);
                }
                if field.is_packed() {
                    let mut packed = Vec::new();
                    let mut packed_writer = WireWriter::new(&mut packed);
                    for item in &converted {
                        item.write(&mut packed_writer).map_err(output_error)?;
                    }
                    packed_writer.finish().map_err(output_error)?;
                    WireValue::Bytes(packed)
                        .write_tagged(writer, field.number())
                        .map_err(output_error)?;
                } else {
                    for item in &converted {
                        item.write_tagged(writer, field.number()).map_err(output_error)?;
                    }
                }
            }
            Cardinality::Singular => {
                let converted = self.to_wire(field, value)?;
                if !field.has_presence() && converted.is_default() {
                    return Ok(());
                }
                converted
                    .write_tagged(writer, field.number())
                    .map_err(output_error)?;
            }
        }
        Ok(())
    }

    /// Converts one JSON value to the wire form of `field`'s type.
    fn to_wire(&self, field: &FieldDescriptor, value: &Value) -> Result<WireValue, EncodeError> {
        let field_type = field.field_type();
        Ok(match field_type {
            ProtoType::Int32 => WireValue::Varint(to_i32(field, value)? as i64 as u64),
            ProtoType::Int64 => WireValue::Varint(to_i64(field, value)? as u64),
            ProtoType::Uint32 => WireValue::Varint(to_u32(field, value)? as u64),
            ProtoType::Uint64 => WireValue::Varint(to_u64(field, value)?),
            ProtoType::Sint32 => WireValue::Varint(zigzag_encode32(to_i32(field, value)?) as u64),
            ProtoType::Sint64 => WireValue::Varint(zigzag_encode64(to_i64(field, value)?)),
            ProtoType::Fixed32 => WireValue::Fixed32(to_u32(field, value)?),
            ProtoType::Sfixed32 => WireValue::Fixed32(to_i32(field, value)? as u32),
            ProtoType::Fixed64 => WireValue::Fixed64(to_u64(field, value)?),
            ProtoType::Sfixed64 => WireValue::Fixed64(to_i64(field, value)? as u64),
            ProtoType::Float => {
                let v = to_f64(field, value)?;
                if v.is_finite() && (v as f32).is_infinite() {
                    return Err(out_of_range(field, value));
                }
                WireValue::Fixed32((v as f32).to_bits())
            }
            ProtoType::Double => WireValue::Fixed64(to_f64(field, value)?.to_bits()),
            ProtoType::Bool => match value {
                Value::Bool(b) => WireValue::Varint(u64::from(*b)),
                other => return Err(mismatch(field, "bool", other)),
            },
            ProtoType::String => match value {
                Value::String(s) => WireValue::Bytes(s.as_bytes().to_vec()),
                other => return Err(mismatch(field, "string", other)),
            },
            ProtoType::Bytes => match value {
                Value::String(s) => WireValue::Bytes(decode_base64(s).ok_or_else(|| {
                    mismatch(field, "base64 string", value)
                })?),
                other => return Err(mismatch(field, "base64 string", other)),
            },
            ProtoType::Enum(id) => {
                let enum_type = self.pool.enum_type(id);
                let number = match value {
                    Value::String(name) => {
                        enum_type
                            .number_of(name)
                            .ok_or_else(|| EncodeError::UnknownEnumValue {
                                field: field.name().to_string(),
                                enum_name: enum_type.full_name().to_string(),
                                value: name.clone(),
                            })?
                    }
                    Value::Number(_) => to_i32(field, value)?,
                    other => return Err(mismatch(field, "enum name or number", other)),
                };
                WireValue::Varint(number as i64 as u64)
            }
            ProtoType::Message(id) => {
                let message = self.pool.message(id);
                let object = value
                    .as_object()
                    .ok_or_else(|| mismatch(field, "object", value))?;
                WireValue::Bytes(self.encode_object(message, object)?)
            }
        })
    }

    /// Zero value for a map entry whose value was given as `null`.
    fn default_wire(&self, field: &FieldDescriptor) -> WireValue {
        match field.field_type().wire_type() {
            WireType::Fixed32 => WireValue::Fixed32(0),
            WireType::Fixed64 => WireValue::Fixed64(0),
            WireType::LengthDelimited => WireValue::Bytes(Vec::new()),
            _ => match field.field_type() {
                ProtoType::Enum(id) => {
                    WireValue::Varint(self.pool.enum_type(id).default_number() as i64 as u64)
                }
                _ => WireValue::Varint(0),
            },
        }
    }
}

/// Map keys arrive as JSON object keys; bools are spelled out, integer
/// keys go through the numeric-string path.
fn map_key_value(key_field: &FieldDescriptor, key: &str) -> Value {
    match (key_field.field_type(), key) {
        (ProtoType::Bool, "true") => Value::Bool(true),
        (ProtoType::Bool, "false") => Value::Bool(false),
        _ => Value::String(key.to_string()),
    }
}

fn decode_base64(text: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
    [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(text).ok())
}

fn to_i64(field: &FieldDescriptor, value: &Value) -> Result<i64, EncodeError> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(v)
            } else if n.is_u64() {
                Err(out_of_range(field, value))
            } else {
                integral_f64(field, value, n.as_f64().unwrap_or(f64::NAN), i64::MIN as f64, i64::MAX as f64)
                    .map(|v| v as i64)
            }
        }
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(v) => Ok(v),
            Err(_) if s.trim().parse::<u64>().is_ok() => Err(out_of_range(field, value)),
            Err(_) => Err(mismatch(field, "integer", value)),
        },
        other => Err(mismatch(field, "integer", other)),
    }
}

fn to_u64(field: &FieldDescriptor, value: &Value) -> Result<u64, EncodeError> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Ok(v)
            } else if n.is_i64() {
                Err(out_of_range(field, value))
            } else {
                integral_f64(field, value, n.as_f64().unwrap_or(f64::NAN), 0.0, u64::MAX as f64)
                    .map(|v| v as u64)
            }
        }
        Value::String(s) => match s.trim().parse::<u64>() {
            Ok(v) => Ok(v),
            Err(_) if s.trim().parse::<i64>().is_ok() => Err(out_of_range(field, value)),
            Err(_) => Err(mismatch(field, "unsigned integer", value)),
        },
        other => Err(mismatch(field, "unsigned integer", other)),
    }
}

fn to_i32(field: &FieldDescriptor, value: &Value) -> Result<i32, EncodeError> {
    i32::try_from(to_i64(field, value)?).map_err(|_| out_of_range(field, value))
}

fn to_u32(field: &FieldDescriptor, value: &Value) -> Result<u32, EncodeError> {
    u32::try_from(to_u64(field, value)?).map_err(|_| out_of_range(field, value))
}

/// Accepts floats such as `7.0` for integer fields; rejects fractions.
fn integral_f64(
    field: &FieldDescriptor,
    value: &Value,
    v: f64,
    min: f64,
    max: f64,
) -> Result<f64, EncodeError> {
    if v.fract() != 0.0 || !v.is_finite() {
        return Err(mismatch(field, "integer", value));
    }
    if v < min || v > max {
        return Err(out_of_range(field, value));
    }
    Ok(v)
}

fn to_f64(field: &FieldDescriptor, value: &Value) -> Result<f64, EncodeError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(field, "number", value)),
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            text => text
                .trim()
                .parse::<f64>()
                .map_err(|_| mismatch(field, "number", value)),
        },
        other => Err(mismatch(field, "number", other)),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(field: &FieldDescriptor, expected: &str, value: &Value) -> EncodeError {
    EncodeError::TypeMismatch {
        field: field.name().to_string(),
        expected: expected.to_string(),
        actual: kind_of(value).to_string(),
    }
}

fn out_of_range(field: &FieldDescriptor, value: &Value) -> EncodeError {
    EncodeError::OutOfRange {
        field: field.name().to_string(),
        field_type: field.field_type().type_name().to_string(),
        value: value.to_string(),
    }
}

fn output_error(e: WireError) -> EncodeError {
    EncodeError::Output(e.to_string())
}
