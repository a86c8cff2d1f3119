//! Front end for the `.proto` IDL: tokens, syntax tree and parser.

pub mod ast;
pub mod lexer;
pub mod parser;

use crate::error::CompileError;
use ast::FileDecl;
use lexer::Lexer;
use parser::Parser;

/// Tokenizes and parses one unit's source text.
pub(crate) fn parse(unit: &str, text: &str) -> Result<FileDecl, CompileError> {
    let tokens = Lexer::new(text)
        .tokenize()
        .map_err(|e| CompileError::Syntax {
            unit: unit.to_string(),
            line: e.line,
            column: e.column,
            message: e.message,
        })?;
    Parser::new(tokens)
        .parse_file()
        .map_err(|e| CompileError::Syntax {
            unit: unit.to_string(),
            line: e.line,
            column: e.column,
            message: e.message,
        })
}
