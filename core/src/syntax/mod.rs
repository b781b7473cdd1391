//! Front ends for the supported expression dialects.
//!
//! Each dialect has its own pest grammar and Pratt parser, and both produce
//! the shared [`ast::Node`] tree consumed by the type checker.

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

use crate::types::Type;

pub mod ast;
mod basic;
mod c_style;

pub use ast::{
    ArrayItem, BinaryOp, CastKind, ElementInit, InitValue, Initializer, Literal, MemberInit, Node,
    NodeKind, TypeName, UnaryOp,
};

/// Maximum height of a parsed tree, counting both bracketed nesting and
/// chained operators. Every later stage recurses over the tree.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Maximum operators in one unbracketed operator sequence.
pub const MAX_OPERATORS: usize = 4 * MAX_NESTING_DEPTH;

/// Byte range in the parsed text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn combine(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<pest::Span<'_>> for Span {
    fn from(span: pest::Span<'_>) -> Self {
        Span::new(span.start(), span.end())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    /// Case-sensitive, brace-and-operator syntax.
    CStyle,
    /// Case-insensitive, keyword syntax.
    Basic,
}

impl Language {
    pub fn is_case_sensitive(self) -> bool {
        matches!(self, Language::CStyle)
    }

    pub fn names_equal(self, a: &str, b: &str) -> bool {
        if self.is_case_sensitive() {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    /// Built-in type named by a keyword of this dialect.
    pub fn primitive_keyword(self, name: &str) -> Option<Type> {
        match self {
            Language::CStyle => match name {
                "int" | "long" => Some(Type::Int),
                "float" | "double" => Some(Type::Float),
                "bool" => Some(Type::Bool),
                "string" => Some(Type::String),
                "object" => Some(Type::Object),
                _ => None,
            },
            Language::Basic => match name.to_ascii_lowercase().as_str() {
                "integer" | "long" => Some(Type::Int),
                "double" | "single" => Some(Type::Float),
                "boolean" => Some(Type::Bool),
                "string" => Some(Type::String),
                "object" => Some(Type::Object),
                _ => None,
            },
        }
    }

    /// Parses a complete unit: `(` expression `)`.
    pub fn parse(self, text: &str) -> Result<Node, SyntaxError> {
        match self {
            Language::CStyle => c_style::parse(text),
            Language::Basic => basic::parse(text),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::CStyle => "c-style",
            Language::Basic => "basic",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "cstyle" | "c-style" => Ok(Language::CStyle),
            "basic" | "vb" => Ok(Language::Basic),
            other => Err(format!("unknown language '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

/// Converts a pest error into a [`SyntaxError`], naming rules with
/// `describe`.
pub(crate) fn convert_pest_error<R: pest::RuleType>(
    error: pest::error::Error<R>,
    describe: fn(&R) -> String,
) -> SyntaxError {
    let span = match error.location {
        pest::error::InputLocation::Pos(pos) => Span::new(pos, pos),
        pest::error::InputLocation::Span((start, end)) => Span::new(start, end),
    };
    let error = error.renamed_rules(describe);
    SyntaxError {
        message: error.variant.message().to_string(),
        span,
    }
}

/// Decodes the body of a quoted C-style string literal.
pub(crate) fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => return Err(format!("unknown escape sequence '\\{}'", other)),
            None => return Err("unterminated escape sequence".to_string()),
        }
    }
    Ok(out)
}
