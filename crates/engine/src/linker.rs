//! Resolves a parsed unit against the units already in a pool.
//!
//! Linking happens in two passes over the declaration tree: the first assigns
//! arena ids and fully qualified names to every message and enum, the second
//! builds field descriptors once every local name is known. Nothing is written
//! into the pool until both passes succeed.

use std::collections::{HashMap, HashSet};

use crate::descriptor::{
    Cardinality, DescriptorPool, EnumDescriptor, EnumId, EnumValue, FieldDescriptor, MessageId,
    MessageDescriptor, OneofDescriptor, ProtoType, Symbol, UnitDescriptor, UnitId,
};
use crate::error::CompileError;
use crate::idl::ast::{EnumDecl, FieldDecl, FileDecl, Label, MessageDecl, Syntax, TypeRef};

const MAX_FIELD_NUMBER: u64 = 536_870_911;
const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<u64> = 19_000..=19_999;

/// A fully linked unit, ready to be appended to the pool.
pub(crate) struct LinkedUnit {
    unit: UnitDescriptor,
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    symbols: HashMap<String, Symbol>,
}

impl DescriptorPool {
    pub(crate) fn commit(&mut self, linked: LinkedUnit) {
        let id = UnitId(self.units.len());
        self.units_by_name.insert(linked.unit.name.clone(), id);
        self.units.push(linked.unit);
        self.messages.extend(linked.messages);
        self.enums.extend(linked.enums);
        self.symbols.extend(linked.symbols);
    }
}

pub(crate) fn link(
    pool: &DescriptorPool,
    unit_name: &str,
    file: &FileDecl,
) -> Result<LinkedUnit, CompileError> {
    let unit_id = UnitId(pool.units.len());

    let mut dependencies = Vec::new();
    let mut public_dependencies = Vec::new();
    for import in &file.imports {
        let dep = *pool
            .units_by_name
            .get(&import.path)
            .ok_or_else(|| CompileError::UnresolvedImport {
                unit: unit_name.to_string(),
                import: import.path.clone(),
            })?;
        if !dependencies.contains(&dep) {
            dependencies.push(dep);
        }
        if import.public && !public_dependencies.contains(&dep) {
            public_dependencies.push(dep);
        }
    }

    let mut linker = Linker {
        pool,
        unit_name,
        unit_id,
        syntax: file.syntax,
        message_base: pool.messages.len(),
        enum_base: pool.enums.len(),
        messages: Vec::new(),
        enums: Vec::new(),
        local: HashMap::new(),
        visible: visible_units(pool, unit_id, &dependencies),
        pending: Vec::new(),
    };

    let scope = file.package.clone().unwrap_or_default();
    let mut top_messages = Vec::with_capacity(file.messages.len());
    let mut top_enums = Vec::with_capacity(file.enums.len());
    for decl in &file.enums {
        top_enums.push(linker.declare_enum(decl, &scope)?);
    }
    for decl in &file.messages {
        top_messages.push(linker.declare_message(decl, &scope, None)?);
    }

    for (id, decl) in std::mem::take(&mut linker.pending) {
        linker.build_fields(id, decl)?;
    }

    tracing::debug!(
        unit = unit_name,
        messages = linker.messages.len(),
        enums = linker.enums.len(),
        "linked schema unit"
    );

    Ok(LinkedUnit {
        unit: UnitDescriptor {
            name: unit_name.to_string(),
            syntax: file.syntax,
            package: file.package.clone(),
            dependencies,
            public_dependencies,
            messages: top_messages,
            enums: top_enums,
        },
        messages: linker.messages,
        enums: linker.enums,
        symbols: linker.local,
    })
}

/// The unit itself, its direct imports, and anything those re-export through
/// `import public`.
fn visible_units(pool: &DescriptorPool, unit: UnitId, dependencies: &[UnitId]) -> HashSet<UnitId> {
    let mut visible = HashSet::from([unit]);
    let mut stack: Vec<UnitId> = dependencies.to_vec();
    while let Some(dep) = stack.pop() {
        if visible.insert(dep) {
            stack.extend(pool.unit(dep).public_dependencies.iter().copied());
        }
    }
    visible
}

struct Linker<'a> {
    pool: &'a DescriptorPool,
    unit_name: &'a str,
    unit_id: UnitId,
    syntax: Syntax,
    message_base: usize,
    enum_base: usize,
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    local: HashMap<String, Symbol>,
    visible: HashSet<UnitId>,
    pending: Vec<(MessageId, &'a MessageDecl)>,
}

impl<'a> Linker<'a> {
    fn declare_message(
        &mut self,
        decl: &'a MessageDecl,
        scope: &str,
        parent: Option<MessageId>,
    ) -> Result<MessageId, CompileError> {
        let full_name = qualify(scope, &decl.name);
        let id = MessageId(self.message_base + self.messages.len());
        self.define(&full_name, Symbol::Message(id))?;
        let message = self.new_message(id, full_name.clone(), decl.name.clone(), parent);
        self.messages.push(message);
        self.pending.push((id, decl));

        let mut nested_enums = Vec::with_capacity(decl.enums.len());
        for nested in &decl.enums {
            nested_enums.push(self.declare_enum(nested, &full_name)?);
        }
        let mut nested_messages = Vec::with_capacity(decl.messages.len());
        for nested in &decl.messages {
            nested_messages.push(self.declare_message(nested, &full_name, Some(id))?);
        }

        let message = self.local_message_mut(id);
        message.nested_messages = nested_messages;
        message.nested_enums = nested_enums;
        Ok(id)
    }

    fn declare_enum(&mut self, decl: &EnumDecl, scope: &str) -> Result<EnumId, CompileError> {
        let full_name = qualify(scope, &decl.name);
        if decl.values.is_empty() {
            return Err(self.invalid(format!("enum {full_name} must declare at least one value")));
        }
        let id = EnumId(self.enum_base + self.enums.len());
        self.define(&full_name, Symbol::Enum(id))?;
        let values = decl
            .values
            .iter()
            .map(|v| EnumValue {
                name: v.name.clone(),
                number: v.number,
            })
            .collect();
        self.enums.push(EnumDescriptor::new(
            full_name,
            decl.name.clone(),
            self.unit_id,
            values,
        ));
        Ok(id)
    }

    fn define(&mut self, full_name: &str, symbol: Symbol) -> Result<(), CompileError> {
        if self.local.contains_key(full_name) || self.pool.symbols.contains_key(full_name) {
            return Err(CompileError::DuplicateSymbol {
                unit: self.unit_name.to_string(),
                name: full_name.to_string(),
            });
        }
        self.local.insert(full_name.to_string(), symbol);
        Ok(())
    }

    fn new_message(
        &self,
        id: MessageId,
        full_name: String,
        name: String,
        parent: Option<MessageId>,
    ) -> MessageDescriptor {
        MessageDescriptor {
            id,
            full_name,
            name,
            unit: self.unit_id,
            parent,
            fields: Vec::new(),
            oneofs: Vec::new(),
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
            map_entry: false,
            by_number: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    fn local_message_mut(&mut self, id: MessageId) -> &mut MessageDescriptor {
        &mut self.messages[id.0 - self.message_base]
    }

    fn build_fields(&mut self, id: MessageId, decl: &MessageDecl) -> Result<(), CompileError> {
        let scope = self.messages[id.0 - self.message_base].full_name.clone();
        let mut fields: Vec<FieldDescriptor> = Vec::with_capacity(decl.fields.len());

        for field in &decl.fields {
            self.check_field_number(&scope, field)?;
            if let Some(other) = fields.iter().find(|f| f.number as u64 == field.number) {
                return Err(self.invalid(format!(
                    "field number {} of {scope} is used by both \"{}\" and \"{}\"",
                    field.number, other.name, field.name
                )));
            }
            if fields.iter().any(|f| f.name == field.name) {
                return Err(self.invalid(format!(
                    "field \"{}\" of {scope} is declared twice",
                    field.name
                )));
            }

            let repeated = field.label == Label::Repeated;
            let (field_type, cardinality) = match &field.type_ref {
                TypeRef::Scalar(scalar) => (*scalar, cardinality_of(repeated)),
                TypeRef::Named(name) => (
                    self.resolve_type(name, &scope, &field.name)?,
                    cardinality_of(repeated),
                ),
                TypeRef::Map { key, value } => {
                    let value_type = match value.as_ref() {
                        TypeRef::Scalar(scalar) => *scalar,
                        TypeRef::Named(name) => self.resolve_type(name, &scope, &field.name)?,
                        TypeRef::Map { .. } => {
                            return Err(self.invalid(format!(
                                "map field \"{}\" of {scope} cannot have a map value",
                                field.name
                            )))
                        }
                    };
                    let entry = self.declare_map_entry(id, &scope, &field.name, *key, value_type);
                    (ProtoType::Message(entry), Cardinality::Map)
                }
            };

            let packed = cardinality == Cardinality::Repeated
                && field_type.is_packable()
                && field.packed.unwrap_or(self.syntax == Syntax::Proto3);
            let explicit_presence = match self.syntax {
                Syntax::Proto3 => field.label == Label::Optional,
                Syntax::Proto2 => !repeated,
            };

            fields.push(FieldDescriptor {
                name: field.name.clone(),
                json_name: field
                    .json_name
                    .clone()
                    .unwrap_or_else(|| to_json_name(&field.name)),
                number: field.number as u32,
                field_type,
                cardinality,
                oneof: field.oneof,
                packed,
                explicit_presence,
            });
        }

        let oneofs = decl
            .oneofs
            .iter()
            .enumerate()
            .map(|(index, name)| OneofDescriptor {
                name: name.clone(),
                fields: fields
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.oneof == Some(index))
                    .map(|(i, _)| i)
                    .collect(),
            })
            .collect();

        let message = self.local_message_mut(id);
        message.fields = fields;
        message.oneofs = oneofs;
        message.index_fields();
        Ok(())
    }

    fn check_field_number(&self, scope: &str, field: &FieldDecl) -> Result<(), CompileError> {
        if field.number == 0 || field.number > MAX_FIELD_NUMBER {
            return Err(self.invalid(format!(
                "field \"{}\" of {scope} has invalid number {} (line {})",
                field.name, field.number, field.line
            )));
        }
        if RESERVED_FIELD_NUMBERS.contains(&field.number) {
            return Err(self.invalid(format!(
                "field \"{}\" of {scope} uses number {} reserved for the protobuf implementation (line {})",
                field.name, field.number, field.line
            )));
        }
        Ok(())
    }

    /// Creates the synthetic `<Field>Entry` message backing a map field. It
    /// is neither a named symbol nor part of the parent's nested list.
    fn declare_map_entry(
        &mut self,
        parent: MessageId,
        scope: &str,
        field_name: &str,
        key: ProtoType,
        value: ProtoType,
    ) -> MessageId {
        let name = format!("{}Entry", to_camel_case(field_name));
        let id = MessageId(self.message_base + self.messages.len());
        let mut entry = self.new_message(id, qualify(scope, &name), name, Some(parent));
        entry.map_entry = true;
        entry.fields = [("key", 1, key), ("value", 2, value)]
            .into_iter()
            .map(|(name, number, field_type)| FieldDescriptor {
                name: name.to_string(),
                json_name: name.to_string(),
                number,
                field_type,
                cardinality: Cardinality::Singular,
                oneof: None,
                packed: false,
                explicit_presence: false,
            })
            .collect();
        entry.index_fields();
        self.messages.push(entry);
        id
    }

    /// Protobuf scoping: a leading dot is absolute, anything else is tried
    /// from the innermost scope outwards.
    fn resolve_type(
        &self,
        name: &str,
        scope: &str,
        field_name: &str,
    ) -> Result<ProtoType, CompileError> {
        let found = if let Some(absolute) = name.strip_prefix('.') {
            self.lookup(absolute)
        } else {
            let mut current = scope;
            loop {
                let candidate = qualify(current, name);
                if let Some(symbol) = self.lookup(&candidate) {
                    break Some(symbol);
                }
                if current.is_empty() {
                    break None;
                }
                current = current.rfind('.').map(|i| &current[..i]).unwrap_or("");
            }
        };

        match found {
            Some(Symbol::Message(id)) => Ok(ProtoType::Message(id)),
            Some(Symbol::Enum(id)) => Ok(ProtoType::Enum(id)),
            None => Err(CompileError::UnresolvedType {
                unit: self.unit_name.to_string(),
                field: format!("{scope}.{field_name}"),
                type_name: name.to_string(),
            }),
        }
    }

    fn lookup(&self, full_name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.local.get(full_name) {
            return Some(*symbol);
        }
        self.pool
            .symbols
            .get(full_name)
            .copied()
            .filter(|symbol| self.visible.contains(&self.pool.symbol_unit(*symbol)))
    }

    fn invalid(&self, message: String) -> CompileError {
        CompileError::Invalid {
            unit: self.unit_name.to_string(),
            message,
        }
    }
}

fn cardinality_of(repeated: bool) -> Cardinality {
    if repeated {
        Cardinality::Repeated
    } else {
        Cardinality::Singular
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

/// `foo_bar_baz` -> `fooBarBaz`
pub(crate) fn to_json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `foo_bar` -> `FooBar`
fn to_camel_case(name: &str) -> String {
    let json = to_json_name(name);
    let mut chars = json.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => json,
    }
}
