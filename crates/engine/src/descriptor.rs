//! Linked descriptor graph.
//!
//! Descriptors live in flat arenas owned by a [`DescriptorPool`] and refer to
//! each other through [`MessageId`] / [`EnumId`] / [`UnitId`] handles, so
//! forward, nested and cross-unit references need no shared ownership.

use std::collections::HashMap;

use crate::idl::ast::Syntax;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub(crate) usize);

/// Protobuf field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message(MessageId),
    Enum(EnumId),
}

impl std::fmt::Display for ProtoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl ProtoType {
    /// Maps a scalar type keyword to its type.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "double" => ProtoType::Double,
            "float" => ProtoType::Float,
            "int32" => ProtoType::Int32,
            "int64" => ProtoType::Int64,
            "uint32" => ProtoType::Uint32,
            "uint64" => ProtoType::Uint64,
            "sint32" => ProtoType::Sint32,
            "sint64" => ProtoType::Sint64,
            "fixed32" => ProtoType::Fixed32,
            "fixed64" => ProtoType::Fixed64,
            "sfixed32" => ProtoType::Sfixed32,
            "sfixed64" => ProtoType::Sfixed64,
            "bool" => ProtoType::Bool,
            "string" => ProtoType::String,
            "bytes" => ProtoType::Bytes,
            _ => return None,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ProtoType::Double => "double",
            ProtoType::Float => "float",
            ProtoType::Int32 => "int32",
            ProtoType::Int64 => "int64",
            ProtoType::Uint32 => "uint32",
            ProtoType::Uint64 => "uint64",
            ProtoType::Sint32 => "sint32",
            ProtoType::Sint64 => "sint64",
            ProtoType::Fixed32 => "fixed32",
            ProtoType::Fixed64 => "fixed64",
            ProtoType::Sfixed32 => "sfixed32",
            ProtoType::Sfixed64 => "sfixed64",
            ProtoType::Bool => "bool",
            ProtoType::String => "string",
            ProtoType::Bytes => "bytes",
            ProtoType::Message(_) => "message",
            ProtoType::Enum(_) => "enum",
        }
    }

    /// Integral and string types may key a map; floats, bytes, enums and
    /// messages may not.
    pub fn is_valid_map_key(&self) -> bool {
        !matches!(
            self,
            ProtoType::Double
                | ProtoType::Float
                | ProtoType::Bytes
                | ProtoType::Message(_)
                | ProtoType::Enum(_)
        )
    }

    /// Whether repeated values of this type can use packed encoding.
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            ProtoType::String | ProtoType::Bytes | ProtoType::Message(_)
        )
    }

    /// Wire type of a single value of this type.
    pub fn wire_type(&self) -> crate::codec::wire::WireType {
        use crate::codec::wire::WireType;
        match self {
            ProtoType::Double | ProtoType::Fixed64 | ProtoType::Sfixed64 => WireType::Fixed64,
            ProtoType::Float | ProtoType::Fixed32 | ProtoType::Sfixed32 => WireType::Fixed32,
            ProtoType::String | ProtoType::Bytes | ProtoType::Message(_) => {
                WireType::LengthDelimited
            }
            _ => WireType::Varint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Singular,
    Repeated,
    /// Repeated synthetic key/value entries rendered as a JSON object.
    Map,
}

/// Describes a single field in a message.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) json_name: String,
    pub(crate) number: u32,
    pub(crate) field_type: ProtoType,
    pub(crate) cardinality: Cardinality,
    pub(crate) oneof: Option<usize>,
    pub(crate) packed: bool,
    pub(crate) explicit_presence: bool,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// lowerCamelCase name, or the `json_name` option when declared.
    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn field_type(&self) -> ProtoType {
        self.field_type
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_map(&self) -> bool {
        self.cardinality == Cardinality::Map
    }

    /// Index of the owning oneof within [`MessageDescriptor::oneofs`].
    pub fn oneof_index(&self) -> Option<usize> {
        self.oneof
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }

    /// Whether a default value is still "set" (oneof members, `optional`
    /// fields, proto2 singular fields and message fields).
    pub fn has_presence(&self) -> bool {
        self.cardinality == Cardinality::Singular
            && (self.explicit_presence
                || self.oneof.is_some()
                || matches!(self.field_type, ProtoType::Message(_)))
    }
}

#[derive(Debug, Clone)]
pub struct OneofDescriptor {
    pub(crate) name: String,
    /// Indices into the owning message's fields.
    pub(crate) fields: Vec<usize>,
}

impl OneofDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_indices(&self) -> &[usize] {
        &self.fields
    }
}

/// Describes a protobuf message type.
#[derive(Debug, Clone)]
pub struct MessageDescriptor {
    pub(crate) id: MessageId,
    /// Fully qualified name, e.g. `mypackage.Outer.Inner`.
    pub(crate) full_name: String,
    pub(crate) name: String,
    pub(crate) unit: UnitId,
    pub(crate) parent: Option<MessageId>,
    /// Fields in declaration order.
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) oneofs: Vec<OneofDescriptor>,
    /// Directly nested messages in declaration order; index resolution walks
    /// this list.
    pub(crate) nested_messages: Vec<MessageId>,
    pub(crate) nested_enums: Vec<EnumId>,
    pub(crate) map_entry: bool,
    pub(crate) by_number: HashMap<u32, usize>,
    pub(crate) by_name: HashMap<String, usize>,
}

impl MessageDescriptor {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn parent(&self) -> Option<MessageId> {
        self.parent
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn oneofs(&self) -> &[OneofDescriptor] {
        &self.oneofs
    }

    pub fn nested_messages(&self) -> &[MessageId] {
        &self.nested_messages
    }

    pub fn nested_enums(&self) -> &[EnumId] {
        &self.nested_enums
    }

    pub fn is_map_entry(&self) -> bool {
        self.map_entry
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    /// Looks a field up by proto name, falling back to its JSON name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i]).or_else(|| {
            self.fields.iter().find(|f| f.json_name == name)
        })
    }

    pub(crate) fn index_fields(&mut self) {
        self.by_number = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.number, i))
            .collect();
        self.by_name = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
}

#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    pub(crate) full_name: String,
    pub(crate) name: String,
    pub(crate) unit: UnitId,
    pub(crate) values: Vec<EnumValue>,
    pub(crate) by_number: HashMap<i32, usize>,
    pub(crate) by_name: HashMap<String, i32>,
}

impl EnumDescriptor {
    pub(crate) fn new(full_name: String, name: String, unit: UnitId, values: Vec<EnumValue>) -> Self {
        // Aliases share a number; the last declared name wins.
        let by_number = values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.number, i))
            .collect();
        let by_name = values.iter().map(|v| (v.name.clone(), v.number)).collect();
        Self {
            full_name,
            name,
            unit,
            values,
            by_number,
            by_name,
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Values in declaration order.
    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.by_number
            .get(&number)
            .map(|&i| self.values[i].name.as_str())
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    /// The proto3 default: the first declared value.
    pub fn default_number(&self) -> i32 {
        self.values.first().map(|v| v.number).unwrap_or(0)
    }
}

/// One registered schema unit.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    pub(crate) name: String,
    pub(crate) syntax: Syntax,
    pub(crate) package: Option<String>,
    pub(crate) dependencies: Vec<UnitId>,
    pub(crate) public_dependencies: Vec<UnitId>,
    /// Top-level messages in declaration order.
    pub(crate) messages: Vec<MessageId>,
    pub(crate) enums: Vec<EnumId>,
}

impl UnitDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn dependencies(&self) -> &[UnitId] {
        &self.dependencies
    }

    pub fn messages(&self) -> &[MessageId] {
        &self.messages
    }

    pub fn enums(&self) -> &[EnumId] {
        &self.enums
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Symbol {
    Message(MessageId),
    Enum(EnumId),
}

/// Arena of every unit, message and enum registered in one context.
#[derive(Debug, Clone, Default)]
pub struct DescriptorPool {
    pub(crate) units: Vec<UnitDescriptor>,
    pub(crate) messages: Vec<MessageDescriptor>,
    pub(crate) enums: Vec<EnumDescriptor>,
    pub(crate) units_by_name: HashMap<String, UnitId>,
    pub(crate) symbols: HashMap<String, Symbol>,
}

impl DescriptorPool {
    pub fn unit(&self, id: UnitId) -> &UnitDescriptor {
        &self.units[id.0]
    }

    pub fn message(&self, id: MessageId) -> &MessageDescriptor {
        &self.messages[id.0]
    }

    pub fn enum_type(&self, id: EnumId) -> &EnumDescriptor {
        &self.enums[id.0]
    }

    pub fn unit_by_name(&self, name: &str) -> Option<&UnitDescriptor> {
        self.units_by_name.get(name).map(|&id| self.unit(id))
    }

    pub fn message_by_name(&self, name: &str) -> Option<&MessageDescriptor> {
        match self.symbols.get(name.strip_prefix('.').unwrap_or(name)) {
            Some(Symbol::Message(id)) => Some(self.message(*id)),
            _ => None,
        }
    }

    pub fn enum_by_name(&self, name: &str) -> Option<&EnumDescriptor> {
        match self.symbols.get(name.strip_prefix('.').unwrap_or(name)) {
            Some(Symbol::Enum(id)) => Some(self.enum_type(*id)),
            _ => None,
        }
    }

    pub(crate) fn symbol_unit(&self, symbol: Symbol) -> UnitId {
        match symbol {
            Symbol::Message(id) => self.message(id).unit,
            Symbol::Enum(id) => self.enum_type(id).unit,
        }
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitDescriptor> {
        self.units.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proto_type_display() {
        assert_eq!(ProtoType::String.to_string(), "string");
        assert_eq!(ProtoType::Int32.to_string(), "int32");
        assert_eq!(ProtoType::Bool.to_string(), "bool");
        assert_eq!(ProtoType::Bytes.to_string(), "bytes");
        assert_eq!(ProtoType::Message(MessageId(0)).to_string(), "message");
        assert_eq!(ProtoType::Enum(EnumId(0)).to_string(), "enum");
    }

    #[test]
    fn test_from_keyword() {
        assert_eq!(ProtoType::from_keyword("sfixed64"), Some(ProtoType::Sfixed64));
        assert_eq!(ProtoType::from_keyword("Address"), None);
    }

    #[test]
    fn test_map_key_validity() {
        assert!(ProtoType::String.is_valid_map_key());
        assert!(ProtoType::Sint64.is_valid_map_key());
        assert!(ProtoType::Bool.is_valid_map_key());
        assert!(!ProtoType::Double.is_valid_map_key());
        assert!(!ProtoType::Bytes.is_valid_map_key());
    }

    #[test]
    fn test_enum_aliases_last_declared_wins() {
        let status = EnumDescriptor::new(
            "Status".to_string(),
            "Status".to_string(),
            UnitId(0),
            vec![
                EnumValue {
                    name: "UNKNOWN".to_string(),
                    number: 0,
                },
                EnumValue {
                    name: "STARTED".to_string(),
                    number: 1,
                },
                EnumValue {
                    name: "RUNNING".to_string(),
                    number: 1,
                },
            ],
        );
        assert_eq!(status.name_of(1), Some("RUNNING"));
        assert_eq!(status.number_of("STARTED"), Some(1));
        assert_eq!(status.name_of(7), None);
        assert_eq!(status.default_number(), 0);
    }
}
