//! Tokenizer for proto IDL text.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(u64),
    Float(f64),
    Str(String),
    Symbol(char),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "identifier \"{s}\""),
            TokenKind::Int(i) => write!(f, "integer {i}"),
            TokenKind::Float(v) => write!(f, "number {v}"),
            TokenKind::Str(s) => write!(f, "string \"{s}\""),
            TokenKind::Symbol(c) => write!(f, "'{c}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Position and message of a lexing failure.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> LexError {
        LexError {
            line,
            column,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => match self.peek_second() {
                    Some('/') => {
                        while let Some(c) = self.bump() {
                            if c == '\n' {
                                break;
                            }
                        }
                    }
                    Some('*') => {
                        let (line, column) = (self.line, self.column);
                        self.bump();
                        self.bump();
                        let mut closed = false;
                        while let Some(c) = self.bump() {
                            if c == '*' && self.peek() == Some('/') {
                                self.bump();
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(self.error(line, column, "unterminated block comment"));
                        }
                    }
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_trivia()?;
        let (line, column) = (self.line, self.column);
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let kind = if c.is_ascii_alphabetic() || c == '_' {
            TokenKind::Ident(self.read_ident())
        } else if c.is_ascii_digit()
            || (c == '.' && self.peek_second().is_some_and(|n| n.is_ascii_digit()))
        {
            self.read_number(line, column)?
        } else if c == '"' || c == '\'' {
            TokenKind::Str(self.read_string(line, column)?)
        } else if "{}[]()<>;,=.-+:/".contains(c) {
            self.bump();
            TokenKind::Symbol(c)
        } else {
            return Err(self.error(line, column, format!("unexpected character '{c}'")));
        };

        Ok(Some(Token { kind, line, column }))
    }

    fn read_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        ident
    }

    fn read_number(&mut self, line: usize, column: usize) -> Result<TokenKind, LexError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            let exponent_sign =
                (c == '-' || c == '+') && matches!(text.chars().last(), Some('e' | 'E'))
                    && !text.starts_with("0x")
                    && !text.starts_with("0X");
            if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        let invalid = || LexError {
            line,
            column,
            message: format!("invalid number \"{text}\""),
        };

        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return u64::from_str_radix(hex, 16)
                .map(TokenKind::Int)
                .map_err(|_| invalid());
        }

        let is_float = text.contains('.')
            || text.contains('e')
            || text.contains('E')
            || text.ends_with('f')
            || text.ends_with('F');
        if is_float {
            let trimmed = text.trim_end_matches(['f', 'F']);
            return trimmed
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| invalid());
        }

        if text.len() > 1 && text.starts_with('0') {
            return u64::from_str_radix(&text[1..], 8)
                .map(TokenKind::Int)
                .map_err(|_| invalid());
        }

        text.parse::<u64>().map(TokenKind::Int).map_err(|_| invalid())
    }

    fn read_string(&mut self, line: usize, column: usize) -> Result<String, LexError> {
        let quote = self.bump().unwrap_or('"');
        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error(line, column, "unterminated string literal"));
            };
            match c {
                '\n' => return Err(self.error(line, column, "newline in string literal")),
                '\\' => value.push(self.read_escape(line, column)?),
                c if c == quote => return Ok(value),
                c => value.push(c),
            }
        }
    }

    fn read_escape(&mut self, line: usize, column: usize) -> Result<char, LexError> {
        let Some(c) = self.bump() else {
            return Err(self.error(line, column, "unterminated string literal"));
        };
        let escaped = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'v' => '\x0b',
            '\\' | '\'' | '"' | '?' => c,
            'x' | 'X' => {
                let mut code = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match self.peek().and_then(|d| d.to_digit(16)) {
                        Some(d) => {
                            code = code * 16 + d;
                            self.bump();
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    return Err(self.error(line, column, "invalid hex escape"));
                }
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            self.bump();
                        }
                        None => break,
                    }
                }
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            other => {
                return Err(self.error(line, column, format!("invalid escape '\\{other}'")));
            }
        };
        Ok(escaped)
    }
}
