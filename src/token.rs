//! Tokens produced by the lexer
//!
//! A [`Token`] pairs a [`TokenKind`] with the verbatim source text it was read
//! from, its decoded [`Value`] (for literal kinds), and its source extent.

use crate::error::Location;
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_rational::BigRational;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Classification of a lexical unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Eof,
    Whitespace,
    Comment,
    Word,
    String,
    RawString,
    Regexp,
    /// Base-10 integer
    Integer,
    /// `B#digits` integer
    BaseInt,
    Binary,
    Octal,
    Hex,
    /// Decimal floating point
    Decimal,
    Rational,
    Duration,
    Boolean,
    Semicolon,
    CurlOpen,
    CurlClose,
    BracketOpen,
    BracketClose,
    /// `#{`
    MapOpen,
}

impl TokenKind {
    /// Returns a human readable name for error messages
    pub fn type_name(self) -> &'static str {
        match self {
            TokenKind::Eof => "end of file",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Comment => "comment",
            TokenKind::Word => "word",
            TokenKind::String => "string",
            TokenKind::RawString => "raw string",
            TokenKind::Regexp => "regexp",
            TokenKind::Integer => "integer",
            TokenKind::BaseInt => "base integer",
            TokenKind::Binary => "binary integer",
            TokenKind::Octal => "octal integer",
            TokenKind::Hex => "hex integer",
            TokenKind::Decimal => "decimal",
            TokenKind::Rational => "rational",
            TokenKind::Duration => "duration",
            TokenKind::Boolean => "boolean",
            TokenKind::Semicolon => "';'",
            TokenKind::CurlOpen => "'{'",
            TokenKind::CurlClose => "'}'",
            TokenKind::BracketOpen => "'['",
            TokenKind::BracketClose => "']'",
            TokenKind::MapOpen => "'#{'",
        }
    }

    /// Returns true for kinds that hold a value usable as an expression
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            TokenKind::Word
                | TokenKind::String
                | TokenKind::RawString
                | TokenKind::Regexp
                | TokenKind::Integer
                | TokenKind::BaseInt
                | TokenKind::Binary
                | TokenKind::Octal
                | TokenKind::Hex
                | TokenKind::Decimal
                | TokenKind::Rational
                | TokenKind::Duration
                | TokenKind::Boolean
        )
    }

    /// Returns true for every integer kind regardless of base
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TokenKind::Integer
                | TokenKind::BaseInt
                | TokenKind::Binary
                | TokenKind::Octal
                | TokenKind::Hex
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Decoded value of a literal token
#[derive(Debug, Clone)]
pub enum Value {
    /// Words, quoted strings and raw strings
    String(String),
    Bool(bool),
    /// Integers of every base
    Integer(BigInt),
    Rational(BigRational),
    Decimal(BigDecimal),
    /// Signed duration in nanoseconds
    Duration(i64),
    Regexp(Regex),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Integer(l), Value::Integer(r)) => l == r,
            (Value::Rational(l), Value::Rational(r)) => l == r,
            (Value::Decimal(l), Value::Decimal(r)) => l == r,
            (Value::Duration(l), Value::Duration(r)) => l == r,
            // Compiled patterns have no equality; compare their source text.
            (Value::Regexp(l), Value::Regexp(r)) => l.as_str() == r.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Rational(r) => write!(f, "{r}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Duration(ns) => write!(f, "{ns}ns"),
            Value::Regexp(rx) => write!(f, "#/{}/", rx.as_str()),
        }
    }
}

/// A classified lexical unit
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Verbatim source text of the token
    pub raw: String,
    /// Decoded value; `None` for punctuation, whitespace, comments and EOF
    pub value: Option<Value>,
    pub start: Location,
    /// Exclusive end of the token
    pub end: Location,
}

impl Token {
    /// Creates a token without a decoded value
    pub fn new(kind: TokenKind, raw: impl Into<String>, start: Location, end: Location) -> Self {
        Self {
            kind,
            raw: raw.into(),
            value: None,
            start,
            end,
        }
    }

    /// Attaches a decoded value
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Returns the string value of word, string and raw string tokens
    pub fn as_str(&self) -> Option<&str> {
        match (&self.value, self.kind) {
            (
                Some(Value::String(s)),
                TokenKind::Word | TokenKind::String | TokenKind::RawString,
            ) => Some(s),
            _ => None,
        }
    }

    /// Returns the comment text following the `//` or `'` marker
    pub fn comment_text(&self) -> Option<&str> {
        if self.kind != TokenKind::Comment {
            return None;
        }
        self.raw
            .strip_prefix("//")
            .or_else(|| self.raw.strip_prefix('\''))
    }

    /// Retags boolean words as [`TokenKind::Boolean`]
    pub(crate) fn into_bool(mut self) -> Self {
        if self.kind != TokenKind::Word {
            return self;
        }
        let b = match self.raw.as_str() {
            "true" | "True" | "TRUE" | "yes" | "Yes" | "YES" => true,
            "false" | "False" | "FALSE" | "no" | "No" | "NO" => false,
            _ => return self,
        };
        self.kind = TokenKind::Boolean;
        self.value = Some(Value::Bool(b));
        self
    }

    /// Undoes [`Token::into_bool`] so a boolean can act as a name
    pub(crate) fn into_word(mut self) -> Self {
        if self.kind == TokenKind::Boolean {
            self.kind = TokenKind::Word;
            self.value = Some(Value::String(self.raw.clone()));
        }
        self
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} at {}", self.kind, self.raw, self.start)
    }
}
