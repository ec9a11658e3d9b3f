//! Error types and source locations for codf lexing and parsing
//!
//! Every error carries enough position information to point a user at the
//! offending input: lexical errors carry the [`Location`] where lexing failed,
//! and parse errors carry the whole offending [`Token`].

use crate::token::{Token, TokenKind};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A position in a named source
///
/// `line` and `column` describe the next unread character, so the `end` of a
/// token is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    /// Name of the source (usually a file path); may be empty
    pub name: Arc<str>,
    /// Byte offset from start of input (0-based)
    pub offset: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based), counted in decoded characters
    pub column: usize,
}

impl Location {
    /// Creates a location at the start of an unnamed input
    pub fn new() -> Self {
        Self::named("")
    }

    /// Creates a location at the start of the named input
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Advances the location past `ch`
    ///
    /// `prev` is the character consumed before `ch`; a line feed directly
    /// after a carriage return completes a CRLF pair and does not start
    /// another line.
    pub fn advance(&mut self, ch: char, prev: Option<char>) {
        self.offset += ch.len_utf8();
        match ch {
            '\n' if prev == Some('\r') => {}
            '\n' | '\r' => {
                self.line += 1;
                self.column = 1;
            }
            _ => {
                self.column += 1;
            }
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "{}:{}:{}", self.name, self.line, self.column)
        }
    }
}

/// Main error type for codf parsing operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Lexical analysis error
    #[error("Lexical error: {0}")]
    Lex(#[from] LexError),

    /// Parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl Error {
    /// Returns the location the error refers to
    pub fn location(&self) -> &Location {
        match self {
            Error::Lex(err) => err.location(),
            Error::Parse(err) => &err.token().start,
        }
    }
}

/// Lexical analysis errors
///
/// These are reserved for input that cannot be recovered from. Malformed
/// numeric literals and similar near-misses become word tokens instead.
#[derive(Debug, Clone, Error)]
pub enum LexError {
    /// Input is not valid UTF-8
    #[error("Invalid UTF-8 sequence at {location}")]
    InvalidUtf8 { location: Location },

    /// A control character appeared outside of a string body
    #[error("Unexpected character {character:?} at {location}")]
    UnexpectedCharacter { character: char, location: Location },

    /// Quoted string not properly terminated
    #[error("Unterminated string beginning at {location}")]
    UnterminatedString { location: Location },

    /// Raw string not properly terminated
    #[error("Unterminated raw string beginning at {location}")]
    UnterminatedRawString { location: Location },

    /// Regular expression not properly terminated
    #[error("Unterminated regexp beginning at {location}")]
    UnterminatedRegexp { location: Location },

    /// Invalid or truncated escape sequence in a quoted string
    #[error("Invalid escape sequence '\\{sequence}' at {location}")]
    InvalidEscape {
        sequence: String,
        location: Location,
    },

    /// Regular expression rejected by the regex engine
    #[error("Invalid regexp at {location}: {message}")]
    InvalidRegexp { message: String, location: Location },

    /// Rational literal with a zero denominator
    #[error("Rational literal {text:?} has a zero denominator at {location}")]
    ZeroDenominator { text: String, location: Location },

    /// Reading from the underlying source failed
    #[error("IO error at {location}: {message}")]
    Io { message: String, location: Location },
}

impl LexError {
    /// Returns the location at which the error was raised
    pub fn location(&self) -> &Location {
        match self {
            LexError::InvalidUtf8 { location }
            | LexError::UnexpectedCharacter { location, .. }
            | LexError::UnterminatedString { location }
            | LexError::UnterminatedRawString { location }
            | LexError::UnterminatedRegexp { location }
            | LexError::InvalidEscape { location, .. }
            | LexError::InvalidRegexp { location, .. }
            | LexError::ZeroDenominator { location, .. }
            | LexError::Io { location, .. } => location,
        }
    }
}

/// A construct that may be left open when parsing stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Construct {
    /// A statement with the given name
    Statement(String),
    /// A section with the given name
    Section(String),
    /// An array
    Array,
    /// A map
    Map,
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Construct::Statement(name) => write!(f, "statement {name:?}"),
            Construct::Section(name) => write!(f, "section {name:?}"),
            Construct::Array => f.write_str("array"),
            Construct::Map => f.write_str("map"),
        }
    }
}

/// Parsing errors
///
/// Each variant carries the token that could not be accepted.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// A token appeared where something else was expected
    #[error("[{}] unexpected {}: expected {expected}", .token.start, .token.kind)]
    Unexpected {
        token: Box<Token>,
        expected: &'static str,
    },

    /// A construct was still open when a closing token or EOF arrived
    #[error("[{}] unexpected {}: expected end of {construct} beginning at {start}", .token.start, .token.kind)]
    Unterminated {
        token: Box<Token>,
        construct: Construct,
        start: Location,
    },

    /// A map key was not followed by a value
    #[error("[{}] unexpected {}: expected value for key {key:?} at {start}", .token.start, .token.kind)]
    MissingMapValue {
        token: Box<Token>,
        key: String,
        start: Location,
    },

    /// A map key was not a word or string
    #[error("[{}] unexpected {}: bad key {key:?}; expected word or string", .token.start, .token.kind)]
    InvalidMapKey { token: Box<Token>, key: String },
}

impl ParseError {
    /// Returns the offending token
    pub fn token(&self) -> &Token {
        match self {
            ParseError::Unexpected { token, .. }
            | ParseError::Unterminated { token, .. }
            | ParseError::MissingMapValue { token, .. }
            | ParseError::InvalidMapKey { token, .. } => token,
        }
    }

    /// Returns the kind of the offending token
    pub fn kind(&self) -> TokenKind {
        self.token().kind
    }

    pub(crate) fn unexpected(token: Token, expected: &'static str) -> Self {
        ParseError::Unexpected {
            token: Box::new(token),
            expected,
        }
    }
}
