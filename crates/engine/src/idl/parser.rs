//! Recursive-descent parser turning proto IDL tokens into unlinked declarations.

use super::ast::{
    EnumDecl, EnumValueDecl, FieldDecl, FileDecl, ImportDecl, Label, MessageDecl, Syntax,
    TypeRef,
};
use super::lexer::{Token, TokenKind};
use crate::descriptor::ProtoType;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Value on the right-hand side of an option assignment.
#[derive(Debug, Clone, PartialEq)]
enum Constant {
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Ident(String),
    Aggregate,
}

#[derive(Default)]
struct FieldOptions {
    packed: Option<bool>,
    json_name: Option<String>,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    syntax: Syntax,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            syntax: Syntax::Proto2,
        }
    }

    pub fn parse_file(mut self) -> ParseResult<FileDecl> {
        let mut file = FileDecl {
            syntax: Syntax::Proto2,
            package: None,
            imports: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
        };

        while let Some(token) = self.peek().cloned() {
            match &token.kind {
                TokenKind::Symbol(';') => {
                    self.pos += 1;
                }
                TokenKind::Ident(word) => match word.as_str() {
                    "syntax" => {
                        self.pos += 1;
                        self.expect_symbol('=')?;
                        let value = self.expect_string()?;
                        self.syntax = match value.as_str() {
                            "proto3" => Syntax::Proto3,
                            "proto2" => Syntax::Proto2,
                            other => {
                                return Err(self.error_at(
                                    &token,
                                    format!("unsupported syntax \"{other}\""),
                                ))
                            }
                        };
                        file.syntax = self.syntax;
                        self.expect_symbol(';')?;
                    }
                    "package" => {
                        self.pos += 1;
                        if file.package.is_some() {
                            return Err(self.error_at(&token, "multiple package declarations"));
                        }
                        file.package = Some(self.parse_full_ident()?);
                        self.expect_symbol(';')?;
                    }
                    "import" => {
                        self.pos += 1;
                        let public = self.eat_keyword("public");
                        if !public {
                            self.eat_keyword("weak");
                        }
                        let path = self.expect_string()?;
                        self.expect_symbol(';')?;
                        file.imports.push(ImportDecl { path, public });
                    }
                    "option" => {
                        self.pos += 1;
                        self.parse_option_body()?;
                    }
                    "message" => {
                        self.pos += 1;
                        file.messages.push(self.parse_message(token.line)?);
                    }
                    "enum" => {
                        self.pos += 1;
                        file.enums.push(self.parse_enum()?);
                    }
                    "service" | "extend" => {
                        self.pos += 1;
                        self.parse_type_name()?;
                        self.skip_block()?;
                    }
                    other => {
                        return Err(self.error_at(
                            &token,
                            format!("expected a top-level declaration, found \"{other}\""),
                        ))
                    }
                },
                other => {
                    return Err(self.error_at(
                        &token,
                        format!("expected a top-level declaration, found {other}"),
                    ))
                }
            }
        }

        Ok(file)
    }

    fn parse_message(&mut self, line: usize) -> ParseResult<MessageDecl> {
        let name = self.expect_ident()?;
        let mut message = MessageDecl {
            name,
            line,
            ..Default::default()
        };
        self.expect_symbol('{')?;

        loop {
            let token = self.next_or_eof("'}' closing message")?;
            match &token.kind {
                TokenKind::Symbol('}') => break,
                TokenKind::Symbol(';') => {}
                TokenKind::Ident(word) => match word.as_str() {
                    "message" => message.messages.push(self.parse_message(token.line)?),
                    "enum" => message.enums.push(self.parse_enum()?),
                    "oneof" => self.parse_oneof(&mut message)?,
                    "option" => self.parse_option_body()?,
                    "reserved" | "extensions" => self.skip_statement()?,
                    "extend" => {
                        self.parse_type_name()?;
                        self.skip_block()?;
                    }
                    "optional" | "required" | "repeated" => {
                        let label = match word.as_str() {
                            "optional" => Label::Optional,
                            "required" => Label::Required,
                            _ => Label::Repeated,
                        };
                        let field = self.parse_field(label, None, token.line)?;
                        message.fields.push(field);
                    }
                    _ => {
                        // The token is the start of the field type.
                        self.pos -= 1;
                        let field = self.parse_field(Label::None, None, token.line)?;
                        message.fields.push(field);
                    }
                },
                other => {
                    return Err(self.error_at(
                        &token,
                        format!("expected a field or declaration, found {other}"),
                    ))
                }
            }
        }

        Ok(message)
    }

    fn parse_oneof(&mut self, message: &mut MessageDecl) -> ParseResult<()> {
        let name = self.expect_ident()?;
        let index = message.oneofs.len();
        message.oneofs.push(name);
        self.expect_symbol('{')?;

        loop {
            let token = self.next_or_eof("'}' closing oneof")?;
            match &token.kind {
                TokenKind::Symbol('}') => break,
                TokenKind::Symbol(';') => {}
                TokenKind::Ident(word) if word == "option" => self.parse_option_body()?,
                TokenKind::Ident(word)
                    if matches!(word.as_str(), "optional" | "required" | "repeated") =>
                {
                    return Err(self.error_at(&token, "oneof fields cannot have labels"));
                }
                TokenKind::Ident(_) => {
                    self.pos -= 1;
                    let field = self.parse_field(Label::None, Some(index), token.line)?;
                    if matches!(field.type_ref, TypeRef::Map { .. }) {
                        return Err(self.error_at(&token, "map fields cannot be oneof members"));
                    }
                    message.fields.push(field);
                }
                other => {
                    return Err(
                        self.error_at(&token, format!("expected a oneof field, found {other}"))
                    )
                }
            }
        }

        Ok(())
    }

    fn parse_field(
        &mut self,
        label: Label,
        oneof: Option<usize>,
        line: usize,
    ) -> ParseResult<FieldDecl> {
        let type_token = self.peek_or_eof("field type")?;
        let type_ref = if self.peek_keyword("map") && self.peek_symbol_at(1, '<') {
            self.pos += 1;
            if label != Label::None {
                return Err(self.error_at(&type_token, "map fields cannot have labels"));
            }
            self.parse_map_type()?
        } else if self.peek_keyword("group") {
            return Err(self.error_at(&type_token, "groups are not supported"));
        } else {
            self.parse_field_type()?
        };

        let name = self.expect_ident()?;
        self.expect_symbol('=')?;
        let number_token = self.peek_or_eof("field number")?;
        let number = match self.next_or_eof("field number")?.kind {
            TokenKind::Int(n) => n,
            other => {
                return Err(self.error_at(
                    &number_token,
                    format!("expected a field number, found {other}"),
                ))
            }
        };

        let options = if self.peek_symbol('[') {
            self.parse_field_options()?
        } else {
            FieldOptions::default()
        };
        self.expect_symbol(';')?;

        Ok(FieldDecl {
            name,
            number,
            label,
            type_ref,
            oneof,
            packed: options.packed,
            json_name: options.json_name,
            line,
        })
    }

    fn parse_map_type(&mut self) -> ParseResult<TypeRef> {
        self.expect_symbol('<')?;
        let key_token = self.peek_or_eof("map key type")?;
        let key_name = self.expect_ident()?;
        let key = match ProtoType::from_keyword(&key_name) {
            Some(key) if key.is_valid_map_key() => key,
            _ => {
                return Err(self.error_at(
                    &key_token,
                    format!("\"{key_name}\" is not a valid map key type"),
                ))
            }
        };
        self.expect_symbol(',')?;
        let value = self.parse_field_type()?;
        self.expect_symbol('>')?;
        Ok(TypeRef::Map {
            key,
            value: Box::new(value),
        })
    }

    fn parse_field_type(&mut self) -> ParseResult<TypeRef> {
        let name = self.parse_type_name()?;
        Ok(match ProtoType::from_keyword(&name) {
            Some(scalar) => TypeRef::Scalar(scalar),
            None => TypeRef::Named(name),
        })
    }

    /// `[.]ident(.ident)*`
    fn parse_type_name(&mut self) -> ParseResult<String> {
        let mut name = String::new();
        if self.eat_symbol('.') {
            name.push('.');
        }
        name.push_str(&self.parse_full_ident()?);
        Ok(name)
    }

    fn parse_full_ident(&mut self) -> ParseResult<String> {
        let mut name = self.expect_ident()?;
        while self.eat_symbol('.') {
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    fn parse_enum(&mut self) -> ParseResult<EnumDecl> {
        let name = self.expect_ident()?;
        let mut values = Vec::new();
        self.expect_symbol('{')?;

        loop {
            let token = self.next_or_eof("'}' closing enum")?;
            match &token.kind {
                TokenKind::Symbol('}') => break,
                TokenKind::Symbol(';') => {}
                TokenKind::Ident(word) if word == "option" => self.parse_option_body()?,
                TokenKind::Ident(word) if word == "reserved" => self.skip_statement()?,
                TokenKind::Ident(value_name) => {
                    self.expect_symbol('=')?;
                    let negative = self.eat_symbol('-');
                    let number_token = self.peek_or_eof("enum value number")?;
                    let magnitude = match self.next_or_eof("enum value number")?.kind {
                        TokenKind::Int(n) => n as i128,
                        other => {
                            return Err(self.error_at(
                                &number_token,
                                format!("expected an enum value number, found {other}"),
                            ))
                        }
                    };
                    let signed = if negative { -magnitude } else { magnitude };
                    let number = i32::try_from(signed).map_err(|_| {
                        self.error_at(
                            &number_token,
                            format!("enum value {signed} is out of the int32 range"),
                        )
                    })?;
                    if self.peek_symbol('[') {
                        self.parse_field_options()?;
                    }
                    self.expect_symbol(';')?;
                    values.push(EnumValueDecl {
                        name: value_name.clone(),
                        number,
                    });
                }
                other => {
                    return Err(
                        self.error_at(&token, format!("expected an enum value, found {other}"))
                    )
                }
            }
        }

        Ok(EnumDecl { name, values })
    }

    /// Parses `name = constant;` after the `option` keyword.
    fn parse_option_body(&mut self) -> ParseResult<()> {
        self.parse_option_name()?;
        self.expect_symbol('=')?;
        self.parse_constant()?;
        self.expect_symbol(';')
    }

    fn parse_field_options(&mut self) -> ParseResult<FieldOptions> {
        let mut options = FieldOptions::default();
        self.expect_symbol('[')?;
        loop {
            let name_token = self.peek_or_eof("option name")?;
            let name = self.parse_option_name()?;
            self.expect_symbol('=')?;
            let value = self.parse_constant()?;
            match (name.as_str(), value) {
                ("packed", Constant::Bool(packed)) => options.packed = Some(packed),
                ("packed", _) => {
                    return Err(self.error_at(&name_token, "option \"packed\" expects a bool"))
                }
                ("json_name", Constant::Str(json_name)) => options.json_name = Some(json_name),
                ("json_name", _) => {
                    return Err(
                        self.error_at(&name_token, "option \"json_name\" expects a string")
                    )
                }
                _ => {}
            }
            if !self.eat_symbol(',') {
                break;
            }
        }
        self.expect_symbol(']')?;
        Ok(options)
    }

    fn parse_option_name(&mut self) -> ParseResult<String> {
        let mut name = if self.eat_symbol('(') {
            let inner = self.parse_type_name()?;
            self.expect_symbol(')')?;
            format!("({inner})")
        } else {
            self.expect_ident()?
        };
        while self.eat_symbol('.') {
            name.push('.');
            if self.eat_symbol('(') {
                let inner = self.parse_type_name()?;
                self.expect_symbol(')')?;
                name.push_str(&format!("({inner})"));
            } else {
                name.push_str(&self.expect_ident()?);
            }
        }
        Ok(name)
    }

    fn parse_constant(&mut self) -> ParseResult<Constant> {
        let token = self.next_or_eof("option value")?;
        match token.kind {
            TokenKind::Str(mut value) => {
                while let Some(Token {
                    kind: TokenKind::Str(next),
                    ..
                }) = self.peek().cloned()
                {
                    value.push_str(&next);
                    self.pos += 1;
                }
                Ok(Constant::Str(value))
            }
            TokenKind::Int(n) => Ok(Constant::Int(n as i128)),
            TokenKind::Float(f) => Ok(Constant::Float(f)),
            TokenKind::Symbol(sign @ ('-' | '+')) => {
                let next = self.next_or_eof("number")?;
                let negate = sign == '-';
                match next.kind {
                    TokenKind::Int(n) if negate => Ok(Constant::Int(-(n as i128))),
                    TokenKind::Int(n) => Ok(Constant::Int(n as i128)),
                    TokenKind::Float(f) if negate => Ok(Constant::Float(-f)),
                    TokenKind::Float(f) => Ok(Constant::Float(f)),
                    TokenKind::Ident(ref word) if word == "inf" || word == "nan" => {
                        Ok(Constant::Ident(format!("{sign}{word}")))
                    }
                    ref other => {
                        Err(self.error_at(&next, format!("expected a number, found {other}")))
                    }
                }
            }
            TokenKind::Symbol('{') => {
                self.pos -= 1;
                self.skip_block()?;
                Ok(Constant::Aggregate)
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Ok(Constant::Bool(true)),
                "false" => Ok(Constant::Bool(false)),
                _ => {
                    let mut name = word;
                    while self.eat_symbol('.') {
                        name.push('.');
                        name.push_str(&self.expect_ident()?);
                    }
                    Ok(Constant::Ident(name))
                }
            },
            ref other => {
                Err(self.error_at(&token, format!("expected an option value, found {other}")))
            }
        }
    }

    /// Skips a `{ ... }` block including nested blocks.
    fn skip_block(&mut self) -> ParseResult<()> {
        self.expect_symbol('{')?;
        let mut depth = 1usize;
        while depth > 0 {
            let token = self.next_or_eof("'}'")?;
            match token.kind {
                TokenKind::Symbol('{') => depth += 1,
                TokenKind::Symbol('}') => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// Skips tokens up to and including the next `;`.
    fn skip_statement(&mut self) -> ParseResult<()> {
        loop {
            let token = self.next_or_eof("';'")?;
            if token.kind == TokenKind::Symbol(';') {
                return Ok(());
            }
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_or_eof(&self, expected: &str) -> ParseResult<Token> {
        self.peek().cloned().ok_or_else(|| self.eof_error(expected))
    }

    fn next_or_eof(&mut self, expected: &str) -> ParseResult<Token> {
        let token = self.peek_or_eof(expected)?;
        self.pos += 1;
        Ok(token)
    }

    fn peek_symbol(&self, symbol: char) -> bool {
        self.peek_symbol_at(0, symbol)
    }

    fn peek_symbol_at(&self, offset: usize, symbol: char) -> bool {
        matches!(
            self.tokens.get(self.pos + offset),
            Some(Token { kind: TokenKind::Symbol(c), .. }) if *c == symbol
        )
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Ident(w), .. }) if w == keyword)
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.peek_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> ParseResult<()> {
        let token = self.next_or_eof(&format!("'{symbol}'"))?;
        match token.kind {
            TokenKind::Symbol(c) if c == symbol => Ok(()),
            ref other => Err(self.error_at(&token, format!("expected '{symbol}', found {other}"))),
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        let token = self.next_or_eof("identifier")?;
        match token.kind {
            TokenKind::Ident(name) => Ok(name),
            ref other => Err(self.error_at(&token, format!("expected identifier, found {other}"))),
        }
    }

    fn expect_string(&mut self) -> ParseResult<String> {
        let token = self.next_or_eof("string")?;
        match token.kind {
            TokenKind::Str(mut value) => {
                while let Some(Token {
                    kind: TokenKind::Str(next),
                    ..
                }) = self.peek().cloned()
                {
                    value.push_str(&next);
                    self.pos += 1;
                }
                Ok(value)
            }
            ref other => Err(self.error_at(&token, format!("expected string, found {other}"))),
        }
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ParseError {
        ParseError {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn eof_error(&self, expected: &str) -> ParseError {
        let (line, column) = self
            .tokens
            .last()
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1));
        ParseError {
            line,
            column,
            message: format!("unexpected end of input, expected {expected}"),
        }
    }
}
