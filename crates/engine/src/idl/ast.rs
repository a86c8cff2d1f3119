//! Unlinked declarations produced by the parser.
//!
//! Type references are kept as written; the linker resolves them against the
//! rest of the context.

use crate::descriptor::ProtoType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileDecl {
    pub syntax: Syntax,
    pub package: Option<String>,
    pub imports: Vec<ImportDecl>,
    pub messages: Vec<MessageDecl>,
    pub enums: Vec<EnumDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: String,
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub oneofs: Vec<String>,
    /// Nested messages in declaration order.
    pub messages: Vec<MessageDecl>,
    pub enums: Vec<EnumDecl>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// No label (proto3 implicit presence, or proto2 default).
    None,
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Scalar(ProtoType),
    /// A message or enum name, possibly dotted or fully qualified.
    Named(String),
    Map { key: ProtoType, value: Box<TypeRef> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub number: u64,
    pub label: Label,
    pub type_ref: TypeRef,
    /// Index into the enclosing message's `oneofs`.
    pub oneof: Option<usize>,
    pub packed: Option<bool>,
    pub json_name: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub values: Vec<EnumValueDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDecl {
    pub name: String,
    pub number: i32,
}
