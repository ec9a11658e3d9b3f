//! codf parser for assembling tokens into a document tree
//!
//! The parser is a single-pass state machine. It pulls one token at a time
//! from a [`TokenSource`], feeds it to the current [`State`], and keeps every
//! construct still under construction on a context stack. Nothing is ever
//! backtracked: a statement that turns out to have a body is promoted to a
//! section in place when its `{` arrives.

use crate::document::{Array, Document, Expr, Literal, Map, MapEntry, Node, Section, Statement};
use crate::error::{Construct, Error, ParseError};
use crate::lexer::{Lexer, LexerConfig, TokenSource};
use crate::token::{Token, TokenKind};
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::io::{BufReader, Read};
use tracing::{debug, trace};

/// What the parser expects from the next token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Start of a statement or section, or the end of the enclosing body
    Segment,
    /// Inside a statement, array or map: values, nested literals or a terminator
    ///
    /// `space_required` is set after a name or scalar, where another scalar
    /// must be separated by whitespace or a comment.
    Value { space_required: bool },
    /// The document was closed by EOF
    Done,
}

/// A statement whose terminator has not been seen yet
#[derive(Debug)]
struct OpenStatement {
    name: Literal,
    args: Vec<Expr>,
}

impl OpenStatement {
    /// Turns the statement into a section body opened by `start`
    fn promote(self, start: Token) -> OpenSection {
        OpenSection {
            name: self.name,
            args: self.args,
            children: Vec::new(),
            start,
        }
    }

    fn close(self, end: Token) -> Statement {
        Statement {
            name: self.name,
            args: self.args,
            end,
        }
    }
}

#[derive(Debug)]
struct OpenSection {
    name: Literal,
    args: Vec<Expr>,
    children: Vec<Node>,
    start: Token,
}

impl OpenSection {
    fn close(self, end: Token) -> Section {
        Section {
            name: self.name,
            args: self.args,
            children: self.children,
            start: self.start,
            end,
        }
    }
}

#[derive(Debug)]
struct OpenArray {
    elems: Vec<Expr>,
    start: Token,
}

/// A map under construction, alternating between keys and values
#[derive(Debug)]
struct MapBuilder {
    elems: IndexMap<String, MapEntry>,
    /// Sequence number of the next entry
    ord: usize,
    /// Key waiting for its value
    key: Option<Expr>,
    start: Token,
}

impl MapBuilder {
    fn new(start: Token) -> Self {
        Self {
            elems: IndexMap::new(),
            ord: 0,
            key: None,
            start,
        }
    }

    fn add_expr(&mut self, expr: Expr) -> Result<(), ParseError> {
        let Some(key) = self.key.take() else {
            self.key = Some(expr);
            return Ok(());
        };

        let name = map_key(&key)?;
        // Last write wins and moves to the end so storage order follows `ord`.
        self.elems.shift_remove(&name);
        self.elems.insert(
            name,
            MapEntry {
                ord: self.ord,
                key,
                value: expr,
            },
        );
        self.ord += 1;
        Ok(())
    }

    fn close(self, end: Token) -> Map {
        Map {
            elems: self.elems,
            start: self.start,
            end,
        }
    }
}

/// Decodes a map key, which must be a word or a string
fn map_key(key: &Expr) -> Result<String, ParseError> {
    match key {
        Expr::Literal(lit)
            if matches!(
                lit.kind(),
                TokenKind::Word | TokenKind::String | TokenKind::RawString
            ) =>
        {
            if let Some(s) = lit.as_str() {
                return Ok(s.to_string());
            }
        }
        _ => {}
    }
    let token = key.token().clone();
    Err(ParseError::InvalidMapKey {
        key: token.raw.clone(),
        token: Box::new(token),
    })
}

/// An open construct on the context stack
#[derive(Debug)]
enum Context {
    /// The root; its children live in [`Parser::document`]
    Document,
    Section(OpenSection),
    Statement(OpenStatement),
    Array(OpenArray),
    Map(MapBuilder),
}

/// codf parser
pub struct Parser {
    document: Document,
    state: State,
    stack: SmallVec<[Context; 6]>,
    last_token: Option<Token>,
    /// First error, repeated on every later call
    failed: Option<Error>,
}

impl Parser {
    /// Creates a parser with an empty document
    pub fn new() -> Self {
        let mut stack = SmallVec::new();
        stack.push(Context::Document);
        Self {
            document: Document::new(),
            state: State::Segment,
            stack,
            last_token: None,
            failed: None,
        }
    }

    /// Pulls tokens from `source` until the document is closed by EOF
    ///
    /// Once an error is returned the parser is poisoned and returns the same
    /// error on every later call. After the document is complete, further
    /// calls return `Ok` without reading.
    pub fn parse<S: TokenSource + ?Sized>(&mut self, source: &mut S) -> Result<(), Error> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        while self.state != State::Done {
            let token = match source.read_token() {
                Ok(token) => token,
                Err(err) => return Err(self.fail(err.into())),
            };
            self.last_token = Some(token.clone());
            if let Err(err) = self.step(token) {
                return Err(self.fail(err.into()));
            }
        }

        Ok(())
    }

    /// Returns the document built so far
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Consumes the parser and returns the document built so far
    pub fn into_document(self) -> Document {
        self.document
    }

    /// Returns the most recently read token
    pub fn last_token(&self) -> Option<&Token> {
        self.last_token.as_ref()
    }

    /// Returns true once EOF has closed the document
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    fn fail(&mut self, err: Error) -> Error {
        debug!(error = %err, "parse failed");
        self.failed = Some(err.clone());
        err
    }

    fn step(&mut self, token: Token) -> Result<(), ParseError> {
        trace!(state = ?self.state, kind = %token.kind, at = %token.start, "token");
        match self.state {
            State::Segment => self.begin_segment(token),
            State::Value { space_required } => match token.kind {
                TokenKind::Whitespace | TokenKind::Comment => {
                    self.state = State::Value {
                        space_required: false,
                    };
                    Ok(())
                }
                kind if space_required && kind.is_scalar() => {
                    Err(ParseError::unexpected(token, "expected whitespace"))
                }
                _ => self.parse_value(token),
            },
            State::Done => Ok(()),
        }
    }

    /// Attaches a closed statement or section to the enclosing body
    fn attach(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(Context::Section(sect)) => sect.children.push(node),
            _ => self.document.children.push(node),
        }
    }

    /// Adds a completed expression to the innermost statement, array or map
    fn add_expr(&mut self, expr: Expr) -> Result<(), ParseError> {
        match self.stack.last_mut() {
            Some(Context::Statement(stmt)) => stmt.args.push(expr),
            Some(Context::Array(ary)) => ary.elems.push(expr),
            Some(Context::Map(map)) => map.add_expr(expr)?,
            _ => {
                return Err(ParseError::unexpected(
                    expr.token().clone(),
                    "expected statement or section name",
                ));
            }
        }
        Ok(())
    }

    /// Builds the error for a token that arrived while the top context was
    /// still open
    fn close_error(&self, token: Token) -> ParseError {
        let token = Box::new(token);
        match self.stack.last() {
            Some(Context::Statement(stmt)) => ParseError::Unterminated {
                token,
                construct: Construct::Statement(stmt.name.token.raw.clone()),
                start: stmt.name.token.start.clone(),
            },
            Some(Context::Section(sect)) => ParseError::Unterminated {
                token,
                construct: Construct::Section(sect.name.token.raw.clone()),
                start: sect.name.token.start.clone(),
            },
            Some(Context::Array(ary)) => ParseError::Unterminated {
                token,
                construct: Construct::Array,
                start: ary.start.start.clone(),
            },
            Some(Context::Map(map)) => match &map.key {
                Some(key) => ParseError::MissingMapValue {
                    token,
                    key: key.as_str().unwrap_or(&key.token().raw).to_string(),
                    start: key.token().start.clone(),
                },
                None => ParseError::Unterminated {
                    token,
                    construct: Construct::Map,
                    start: map.start.start.clone(),
                },
            },
            Some(Context::Document) | None => ParseError::Unexpected {
                token,
                expected: "expected statement, section, or EOF",
            },
        }
    }

    fn begin_segment(&mut self, token: Token) -> Result<(), ParseError> {
        match token.kind {
            TokenKind::Semicolon | TokenKind::Whitespace | TokenKind::Comment => Ok(()),
            TokenKind::CurlClose => match self.stack.pop() {
                Some(Context::Section(sect)) => {
                    trace!(name = %sect.name.token.raw, "section closed");
                    self.attach(Node::Section(sect.close(token)));
                    Ok(())
                }
                other => {
                    self.stack.extend(other);
                    Err(self.close_error(token))
                }
            },
            TokenKind::Eof => {
                if matches!(self.stack.last(), Some(Context::Document) | None) {
                    debug!(children = self.document.children.len(), "document complete");
                    self.state = State::Done;
                    Ok(())
                } else {
                    Err(self.close_error(token))
                }
            }
            TokenKind::Word | TokenKind::Boolean => {
                self.stack.push(Context::Statement(OpenStatement {
                    name: Literal::new(token.into_word()),
                    args: Vec::new(),
                }));
                self.state = State::Value {
                    space_required: true,
                };
                Ok(())
            }
            _ => Err(ParseError::unexpected(
                token,
                "expected statement or section name",
            )),
        }
    }

    fn parse_value(&mut self, token: Token) -> Result<(), ParseError> {
        match token.kind {
            TokenKind::BracketOpen => {
                self.stack.push(Context::Array(OpenArray {
                    elems: Vec::new(),
                    start: token,
                }));
                self.state = State::Value {
                    space_required: false,
                };
                Ok(())
            }
            TokenKind::MapOpen => {
                self.stack.push(Context::Map(MapBuilder::new(token)));
                self.state = State::Value {
                    space_required: false,
                };
                Ok(())
            }
            kind if kind.is_scalar() => {
                self.add_expr(Expr::Literal(Literal::new(token)))?;
                self.state = State::Value {
                    space_required: true,
                };
                Ok(())
            }
            _ => self.parse_sentinel(token),
        }
    }

    /// Handles tokens that end or restructure the current construct
    fn parse_sentinel(&mut self, token: Token) -> Result<(), ParseError> {
        match token.kind {
            TokenKind::Eof => Err(self.close_error(token)),
            TokenKind::Semicolon => match self.stack.pop() {
                Some(Context::Statement(stmt)) => {
                    self.attach(Node::Statement(stmt.close(token)));
                    self.state = State::Segment;
                    Ok(())
                }
                other => {
                    self.stack.extend(other);
                    Err(self.close_error(token))
                }
            },
            TokenKind::BracketClose => match self.stack.pop() {
                Some(Context::Array(ary)) => {
                    self.add_expr(Expr::Array(Array {
                        elems: ary.elems,
                        start: ary.start,
                        end: token,
                    }))?;
                    self.state = State::Value {
                        space_required: false,
                    };
                    Ok(())
                }
                other => {
                    self.stack.extend(other);
                    Err(self.close_error(token))
                }
            },
            TokenKind::CurlClose => match self.stack.pop() {
                Some(Context::Map(map)) => {
                    if let Some(key) = &map.key {
                        // A dangling key that could never be valid is reported as such.
                        map_key(key)?;
                        self.stack.push(Context::Map(map));
                        return Err(self.close_error(token));
                    }
                    self.add_expr(Expr::Map(map.close(token)))?;
                    self.state = State::Value {
                        space_required: false,
                    };
                    Ok(())
                }
                other => {
                    self.stack.extend(other);
                    Err(self.close_error(token))
                }
            },
            TokenKind::CurlOpen => match self.stack.pop() {
                Some(Context::Statement(stmt)) => {
                    debug!(name = %stmt.name.token.raw, at = %token.start, "statement promoted to section");
                    self.stack.push(Context::Section(stmt.promote(token)));
                    self.state = State::Segment;
                    Ok(())
                }
                other => {
                    self.stack.extend(other);
                    Err(self.close_error(token))
                }
            },
            _ => Err(ParseError::unexpected(token, "expected statement body")),
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a complete document from a string
///
/// `name` is recorded in every token location and error message.
pub fn parse_str(name: &str, text: &str) -> Result<Document, Error> {
    let config = LexerConfig::default().with_name(name);
    let mut lexer = Lexer::with_config(text.as_bytes(), config);
    let mut parser = Parser::new();
    parser.parse(&mut lexer)?;
    Ok(parser.into_document())
}

/// Parses a complete document from any reader
pub fn parse_reader<R: Read>(name: &str, reader: R) -> Result<Document, Error> {
    let config = LexerConfig::default().with_name(name);
    let mut lexer = Lexer::with_config(BufReader::new(reader), config);
    let mut parser = Parser::new();
    parser.parse(&mut lexer)?;
    Ok(parser.into_document())
}
