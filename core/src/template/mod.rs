//! Uop body templates.
//!
//! A body is kept as the token stream it was written in. Emission copies the
//! tokens through verbatim except for a fixed set of macro identifiers, which
//! are expanded against the current stack state.

mod lexer;
mod macros;

#[cfg(test)]
mod macros_test;

use std::fmt;
use std::sync::Arc;

pub use lexer::lex;
pub use macros::{MACROS, emit_tokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Number,
    Str,
    Char,
    Comment,
    /// A whole preprocessor line.
    CMacro,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    /// Any other operator or punctuation.
    Op,
}

/// A body token with its position in the definition file.
///
/// Lines are 1-based, columns 0-based; `end_column` is one past the last
/// character on `end_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A malformed body: either the lexer could not make sense of the text or a
/// macro invocation does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    pub message: String,
    pub file: Arc<str>,
    pub line: u32,
}

impl TemplateError {
    pub fn new(message: impl Into<String>, file: Arc<str>, line: u32) -> Self {
        Self {
            message: message.into(),
            file,
            line,
        }
    }

    pub fn at(message: impl Into<String>, tkn: &Token) -> Self {
        Self::new(message, tkn.file.clone(), tkn.line)
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.file, self.line)
    }
}

impl std::error::Error for TemplateError {}
