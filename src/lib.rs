//! # codf
//!
//! A lexer and parser for codf, a small configuration language built from
//! statements, sections and typed literals.
//!
//! ## Overview
//!
//! A codf document is a sequence of statements (`name args...;`) and sections
//! (`name args... { children }`). Arguments are literals, arrays (`[ ... ]`) or
//! maps (`#{ key value ... }`). The crate turns source text into a
//! [`Document`] tree; binding that tree to application settings is left to the
//! caller.
//!
//! ## Key Features
//!
//! - **Rich literals**: arbitrary-precision integers in several bases,
//!   rationals, decimals, durations, booleans, regexps and three string forms
//! - **Forgiving words**: anything that almost looks like a number but isn't
//!   (`10.0.0.1`, `64mb`, `0xfg`) is kept as a bare word
//! - **Precise locations**: every token carries its start and end location
//! - **Streaming input**: the lexer reads from any [`std::io::BufRead`]
//!
//! ## Basic Usage
//!
//! ```rust
//! use codf::parse_str;
//!
//! let doc = parse_str("server.conf", r#"
//!     server example.org {
//!         listen 0.0.0.0:80;
//!         timeout 30s;
//!     }
//! "#)?;
//!
//! let server = doc.children[0].as_section().unwrap();
//! assert_eq!(server.name(), "server");
//! assert_eq!(server.args[0].as_str(), Some("example.org"));
//!
//! let timeout = server.children[1].args()[0].as_literal().unwrap();
//! assert_eq!(timeout.as_duration(), Some(30_000_000_000));
//! # Ok::<(), codf::Error>(())
//! ```
//!
//! ## Tokens
//!
//! ```rust
//! use codf::{Lexer, TokenKind};
//!
//! let mut lexer = Lexer::new("port 0x1f90;".as_bytes());
//! let mut kinds = Vec::new();
//! loop {
//!     let token = lexer.read_token()?;
//!     if token.kind == TokenKind::Eof {
//!         break;
//!     }
//!     kinds.push(token.kind);
//! }
//! assert_eq!(
//!     kinds,
//!     [TokenKind::Word, TokenKind::Whitespace, TokenKind::Hex, TokenKind::Semicolon]
//! );
//! # Ok::<(), codf::LexError>(())
//! ```
//!
//! ## Error Handling
//!
//! Errors carry the location of the offending input:
//!
//! ```rust
//! use codf::{parse_str, Error, ParseError};
//!
//! match parse_str("app.conf", "server {\n  listen 80;\n") {
//!     Err(Error::Parse(err @ ParseError::Unterminated { .. })) => {
//!         assert_eq!(
//!             err.to_string(),
//!             "[app.conf:3:1] unexpected end of file: expected end of section \"server\" beginning at app.conf:1:1"
//!         );
//!     }
//!     other => panic!("unexpected result: {other:?}"),
//! }
//! ```

pub mod document;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;


pub use document::{Array, Document, Expr, Literal, Map, MapEntry, Node, Section, Statement};
pub use error::{Construct, Error, LexError, Location, ParseError};
pub use lexer::{DEFAULT_PRECISION, Lexer, LexerConfig, LexerFlags, TokenSource};
pub use parser::{Parser, parse_reader, parse_str};
pub use token::{Token, TokenKind, Value};
