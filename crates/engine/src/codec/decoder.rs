//! Protobuf binary to JSON value conversion driven by linked descriptors.

use base64::Engine as _;
use serde_json::{Map, Number, Value};

use crate::codec::wire::{zigzag_decode32, zigzag_decode64, WireError, WireReader, WireType};
use crate::descriptor::{
    Cardinality, DescriptorPool, EnumId, FieldDescriptor, MessageDescriptor, ProtoType,
};
use crate::error::DecodeError;

/// Deepest message nesting a payload may use.
pub const MAX_RECURSION_DEPTH: usize = 100;

/// Largest integer a JSON number can carry without losing precision.
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Knobs for rendering decoded messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Render absent implicit-presence scalars, empty repeated fields and
    /// empty maps with their default values.
    pub emit_defaults: bool,
    /// Use lowerCamelCase JSON names instead of proto field names as keys.
    pub use_json_names: bool,
}

/// Per-field state collected while scanning one message.
#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Scalar(Value),
    /// Singular message fields merge, so their chunks are concatenated and
    /// decoded once at the end.
    Message(Vec<u8>),
    List(Vec<Value>),
    Map(Map<String, Value>),
}

pub struct ProtoDecoder<'a> {
    pool: &'a DescriptorPool,
    options: &'a DecodeOptions,
}

impl<'a> ProtoDecoder<'a> {
    pub fn new(pool: &'a DescriptorPool, options: &'a DecodeOptions) -> Self {
        Self { pool, options }
    }

    pub fn decode(&self, message: &MessageDescriptor, data: &[u8]) -> Result<Value, DecodeError> {
        self.decode_message(message, data, 0)
    }

    fn decode_message(
        &self,
        message: &MessageDescriptor,
        data: &[u8],
        depth: usize,
    ) -> Result<Value, DecodeError> {
        if depth >= MAX_RECURSION_DEPTH {
            return Err(DecodeError::RecursionLimitExceeded {
                message: message.full_name().to_string(),
                limit: MAX_RECURSION_DEPTH,
            });
        }

        let mut slots = vec![Slot::Empty; message.fields().len()];
        let mut reader = WireReader::new(data);
        let wire = |e| wire_error(message, e);

        while !reader.eof().map_err(wire)? {
            let (number, wire_type) = reader.read_tag().map_err(wire)?;
            let Some(&index) = message.by_number.get(&number) else {
                reader.skip(number, wire_type).map_err(wire)?;
                continue;
            };
            let field = &message.fields()[index];
            let read = self.read_field(message, field, wire_type, &mut reader, &mut slots[index], depth)?;
            if !read {
                tracing::trace!(
                    message = message.full_name(),
                    field = field.name(),
                    wire_type = wire_type.raw(),
                    "skipping field with unexpected wire type"
                );
                reader.skip(number, wire_type).map_err(wire)?;
                continue;
            }
            // The last oneof member on the wire wins.
            if let Some(oneof) = field.oneof_index() {
                for &other in message.oneofs()[oneof].field_indices() {
                    if other != index {
                        slots[other] = Slot::Empty;
                    }
                }
            }
        }

        self.assemble(message, slots, depth)
    }

    /// Reads one occurrence of `field` into its slot. Returns `false` when the
    /// wire type does not fit the field, leaving the value unread.
    fn read_field(
        &self,
        message: &MessageDescriptor,
        field: &FieldDescriptor,
        wire_type: WireType,
        reader: &mut WireReader<'_>,
        slot: &mut Slot,
        depth: usize,
    ) -> Result<bool, DecodeError> {
        let wire = |e| wire_error(message, e);
        let field_type = field.field_type();

        match field.cardinality() {
            Cardinality::Map => {
                let ProtoType::Message(entry_id) = field_type else {
                    return Ok(false);
                };
                if wire_type != WireType::LengthDelimited {
                    return Ok(false);
                }
                let bytes = reader.read_length_delimited().map_err(wire)?;
                let (key, value) = self
                    .decode_map_entry(self.pool.message(entry_id), &bytes, depth + 1)
                    .map_err(|e| in_field(field, e))?;
                if !matches!(slot, Slot::Map(_)) {
                    *slot = Slot::Map(Map::new());
                }
                if let Slot::Map(entries) = slot {
                    entries.insert(key, value);
                }
            }
            Cardinality::Repeated => {
                if !matches!(slot, Slot::List(_)) {
                    *slot = Slot::List(Vec::new());
                }
                let Slot::List(values) = slot else {
                    return Ok(false);
                };
                if wire_type == WireType::LengthDelimited && field_type.is_packable() {
                    let bytes = reader.read_length_delimited().map_err(wire)?;
                    let mut packed = WireReader::new(&bytes);
                    while !packed.eof().map_err(wire)? {
                        values.push(self.read_scalar(field_type, &mut packed).map_err(wire)?);
                    }
                } else if wire_type == field_type.wire_type() {
                    values.push(self.read_value(message, field, reader, depth)?);
                } else {
                    return Ok(false);
                }
            }
            Cardinality::Singular => {
                if wire_type != field_type.wire_type() {
                    return Ok(false);
                }
                if let ProtoType::Message(_) = field_type {
                    let bytes = reader.read_length_delimited().map_err(wire)?;
                    match slot {
                        Slot::Message(buffer) => buffer.extend_from_slice(&bytes),
                        _ => *slot = Slot::Message(bytes),
                    }
                } else {
                    *slot = Slot::Scalar(self.read_value(message, field, reader, depth)?);
                }
            }
        }
        Ok(true)
    }

    /// Reads a single non-packed value of `field`'s type.
    fn read_value(
        &self,
        message: &MessageDescriptor,
        field: &FieldDescriptor,
        reader: &mut WireReader<'_>,
        depth: usize,
    ) -> Result<Value, DecodeError> {
        let wire = |e| wire_error(message, e);
        match field.field_type() {
            ProtoType::Message(id) => {
                let bytes = reader.read_length_delimited().map_err(wire)?;
                self.decode_message(self.pool.message(id), &bytes, depth + 1)
                    .map_err(|e| in_field(field, e))
            }
            ProtoType::String => {
                let bytes = reader.read_length_delimited().map_err(wire)?;
                String::from_utf8(bytes)
                    .map(Value::String)
                    .map_err(|_| DecodeError::InvalidUtf8 {
                        message: message.full_name().to_string(),
                        field: field.name().to_string(),
                    })
            }
            ProtoType::Bytes => {
                let bytes = reader.read_length_delimited().map_err(wire)?;
                Ok(Value::String(
                    base64::engine::general_purpose::STANDARD.encode(bytes),
                ))
            }
            scalar => self.read_scalar(scalar, reader).map_err(wire),
        }
    }

    /// Reads a numeric, boolean or enum value.
    fn read_scalar(&self, field_type: ProtoType, reader: &mut WireReader<'_>) -> Result<Value, WireError> {
        Ok(match field_type {
            ProtoType::Int32 => Value::from(reader.read_varint()? as i32),
            ProtoType::Int64 => int64_value(reader.read_varint()? as i64),
            ProtoType::Uint32 => Value::from(reader.read_varint()? as u32),
            ProtoType::Uint64 => uint64_value(reader.read_varint()?),
            ProtoType::Sint32 => Value::from(zigzag_decode32(reader.read_varint()? as u32)),
            ProtoType::Sint64 => int64_value(zigzag_decode64(reader.read_varint()?)),
            ProtoType::Bool => Value::Bool(reader.read_varint()? != 0),
            ProtoType::Enum(id) => self.enum_value(id, reader.read_varint()? as i32),
            ProtoType::Fixed32 => Value::from(reader.read_fixed32()?),
            ProtoType::Sfixed32 => Value::from(reader.read_fixed32()? as i32),
            ProtoType::Float => float_value(f32::from_bits(reader.read_fixed32()?)),
            ProtoType::Fixed64 => uint64_value(reader.read_fixed64()?),
            ProtoType::Sfixed64 => int64_value(reader.read_fixed64()? as i64),
            ProtoType::Double => double_value(f64::from_bits(reader.read_fixed64()?)),
            ProtoType::String | ProtoType::Bytes | ProtoType::Message(_) => {
                return Err(WireError::Stream(format!(
                    "{} values cannot be packed",
                    field_type.type_name()
                )))
            }
        })
    }

    fn decode_map_entry(
        &self,
        entry: &MessageDescriptor,
        data: &[u8],
        depth: usize,
    ) -> Result<(String, Value), DecodeError> {
        let (key_field, value_field) = match entry.fields() {
            [key, value] => (key, value),
            _ => {
                return Err(DecodeError::Malformed {
                    message: entry.full_name().to_string(),
                    detail: "map entry must have exactly a key and a value".to_string(),
                })
            }
        };

        let mut key = None;
        let mut value = None;
        let mut reader = WireReader::new(data);
        let wire = |e| wire_error(entry, e);
        while !reader.eof().map_err(wire)? {
            let (number, wire_type) = reader.read_tag().map_err(wire)?;
            let target = match number {
                1 => key_field,
                2 => value_field,
                _ => {
                    reader.skip(number, wire_type).map_err(wire)?;
                    continue;
                }
            };
            if wire_type != target.field_type().wire_type() {
                reader.skip(number, wire_type).map_err(wire)?;
                continue;
            }
            let decoded = self.read_value(entry, target, &mut reader, depth)?;
            if number == 1 {
                key = Some(decoded);
            } else {
                value = Some(decoded);
            }
        }

        let key = match key.unwrap_or_else(|| self.default_value(key_field)) {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let value = match value {
            Some(value) => value,
            None => match value_field.field_type() {
                ProtoType::Message(id) => self.decode_message(self.pool.message(id), &[], depth + 1)?,
                _ => self.default_value(value_field),
            },
        };
        Ok((key, value))
    }

    /// Turns the collected slots into a JSON object in declaration order.
    fn assemble(
        &self,
        message: &MessageDescriptor,
        slots: Vec<Slot>,
        depth: usize,
    ) -> Result<Value, DecodeError> {
        let mut object = Map::new();
        for (field, slot) in message.fields().iter().zip(slots) {
            let key = if self.options.use_json_names {
                field.json_name()
            } else {
                field.name()
            };
            let value = match slot {
                Slot::Scalar(value) => {
                    if !field.has_presence()
                        && !self.options.emit_defaults
                        && self.is_default(field, &value)
                    {
                        continue;
                    }
                    value
                }
                Slot::Message(bytes) => match field.field_type() {
                    ProtoType::Message(id) => self
                        .decode_message(self.pool.message(id), &bytes, depth + 1)
                        .map_err(|e| in_field(field, e))?,
                    _ => continue,
                },
                Slot::List(values) if !values.is_empty() => Value::Array(values),
                Slot::Map(entries) if !entries.is_empty() => Value::Object(entries),
                Slot::List(_) | Slot::Map(_) | Slot::Empty => {
                    if !self.options.emit_defaults {
                        continue;
                    }
                    match field.cardinality() {
                        Cardinality::Repeated => Value::Array(Vec::new()),
                        Cardinality::Map => Value::Object(Map::new()),
                        Cardinality::Singular if !field.has_presence() => self.default_value(field),
                        Cardinality::Singular => continue,
                    }
                }
            };
            object.insert(key.to_string(), value);
        }
        Ok(Value::Object(object))
    }

    /// JSON rendering of a scalar field's zero value.
    fn default_value(&self, field: &FieldDescriptor) -> Value {
        match field.field_type() {
            ProtoType::Bool => Value::Bool(false),
            ProtoType::String | ProtoType::Bytes => Value::String(String::new()),
            ProtoType::Float | ProtoType::Double => double_value(0.0),
            ProtoType::Enum(id) => {
                self.enum_value(id, self.pool.enum_type(id).default_number())
            }
            ProtoType::Message(_) => Value::Null,
            _ => Value::from(0),
        }
    }

    /// Floats compare by bit pattern so `-0.0` is not taken for the default.
    fn is_default(&self, field: &FieldDescriptor, value: &Value) -> bool {
        match field.field_type() {
            ProtoType::Float | ProtoType::Double => {
                value.as_f64().is_some_and(|v| v.to_bits() == 0)
            }
            _ => *value == self.default_value(field),
        }
    }

    /// Enum numbers render as their value name; numbers the enum does not
    /// declare stay numeric.
    fn enum_value(&self, id: EnumId, number: i32) -> Value {
        match self.pool.enum_type(id).name_of(number) {
            Some(name) => Value::String(name.to_string()),
            None => Value::from(number),
        }
    }
}

fn in_field(field: &FieldDescriptor, source: DecodeError) -> DecodeError {
    DecodeError::InField {
        field: field.name().to_string(),
        source: Box::new(source),
    }
}

fn wire_error(message: &MessageDescriptor, e: WireError) -> DecodeError {
    let message = message.full_name().to_string();
    match e {
        WireError::InvalidTag(tag) => DecodeError::InvalidTag { message, tag },
        WireError::InvalidWireType {
            field_number,
            wire_type,
        } => DecodeError::InvalidWireType {
            message,
            field_number,
            wire_type,
        },
        WireError::LengthOutOfBounds { length, remaining } => DecodeError::LengthOutOfBounds {
            message,
            length,
            remaining,
        },
        WireError::GroupTooDeep { limit } => DecodeError::RecursionLimitExceeded { message, limit },
        other => DecodeError::Malformed {
            message,
            detail: other.to_string(),
        },
    }
}

/// 64-bit integers beyond 2^53 - 1 are rendered as decimal strings.
fn int64_value(v: i64) -> Value {
    if v.unsigned_abs() <= MAX_SAFE_INTEGER {
        Value::from(v)
    } else {
        Value::String(v.to_string())
    }
}

fn uint64_value(v: u64) -> Value {
    if v <= MAX_SAFE_INTEGER {
        Value::from(v)
    } else {
        Value::String(v.to_string())
    }
}

/// Widens through the shortest decimal form so `7.8f32` renders as `7.8`.
fn float_value(v: f32) -> Value {
    if !v.is_finite() {
        return non_finite(v as f64);
    }
    let widened = v.to_string().parse::<f64>().unwrap_or(v as f64);
    double_value(widened)
}

fn double_value(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None => non_finite(v),
    }
}

fn non_finite(v: f64) -> Value {
    let text = if v.is_nan() {
        "NaN"
    } else if v > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    };
    Value::String(text.to_string())
}
