//! Document tree produced by the parser
//!
//! The tree is made of two sum types: [`Node`] for the children of a document
//! or section, and [`Expr`] for anything in an argument or element position.
//! Every node keeps the tokens that bound it so callers can report errors
//! against the source text.

use crate::token::{Token, TokenKind, Value};
use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_rational::BigRational;
use regex::Regex;

/// Root of a parsed document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Document {
    /// Creates an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the document has no statements or sections
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Iterates over top-level children with the given name
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |node| node.name() == name)
    }
}

/// A statement or section
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Statement(Statement),
    Section(Section),
}

impl Node {
    /// Returns the node name
    pub fn name(&self) -> &str {
        match self {
            Node::Statement(stmt) => stmt.name(),
            Node::Section(sect) => sect.name(),
        }
    }

    /// Returns the arguments following the name
    pub fn args(&self) -> &[Expr] {
        match self {
            Node::Statement(stmt) => &stmt.args,
            Node::Section(sect) => &sect.args,
        }
    }

    /// Returns the section body, or an empty slice for statements
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Statement(_) => &[],
            Node::Section(sect) => &sect.children,
        }
    }

    /// Returns the first token of the node (its name)
    pub fn start(&self) -> &Token {
        match self {
            Node::Statement(stmt) => &stmt.name.token,
            Node::Section(sect) => &sect.name.token,
        }
    }

    /// Returns the token that closed the node: `;` or `}`
    pub fn end(&self) -> &Token {
        match self {
            Node::Statement(stmt) => &stmt.end,
            Node::Section(sect) => &sect.end,
        }
    }

    /// Returns the node as a statement, if it has no body
    pub fn as_statement(&self) -> Option<&Statement> {
        match self {
            Node::Statement(stmt) => Some(stmt),
            Node::Section(_) => None,
        }
    }

    /// Returns the node as a section, if it has a body
    pub fn as_section(&self) -> Option<&Section> {
        match self {
            Node::Section(sect) => Some(sect),
            Node::Statement(_) => None,
        }
    }
}

/// Sections may nest arbitrarily deep; their bodies are released iteratively
impl Drop for Node {
    fn drop(&mut self) {
        let Node::Section(sect) = self else {
            return;
        };
        if sect.children.is_empty() {
            return;
        }
        let mut pending = std::mem::take(&mut sect.children);
        while let Some(mut node) = pending.pop() {
            if let Node::Section(sect) = &mut node {
                pending.append(&mut sect.children);
            }
        }
    }
}

/// A declaration terminated by `;`
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub name: Literal,
    pub args: Vec<Expr>,
    /// The terminating `;`
    pub end: Token,
}

impl Statement {
    /// Returns the decoded statement name
    pub fn name(&self) -> &str {
        self.name.as_str().unwrap_or(&self.name.token.raw)
    }
}

/// A declaration with a `{ ... }` body
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: Literal,
    pub args: Vec<Expr>,
    pub children: Vec<Node>,
    /// The opening `{`
    pub start: Token,
    /// The closing `}`
    pub end: Token,
}

impl Section {
    /// Returns the decoded section name
    pub fn name(&self) -> &str {
        self.name.as_str().unwrap_or(&self.name.token.raw)
    }
}

/// Anything that can appear as an argument, element, map key or map value
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Array(Array),
    Map(Map),
}

impl Expr {
    /// Returns the first token of the expression
    pub fn token(&self) -> &Token {
        match self {
            Expr::Literal(lit) => &lit.token,
            Expr::Array(ary) => &ary.start,
            Expr::Map(map) => &map.start,
        }
    }

    /// Returns the last token of the expression
    pub fn end(&self) -> &Token {
        match self {
            Expr::Literal(lit) => &lit.token,
            Expr::Array(ary) => &ary.end,
            Expr::Map(map) => &map.end,
        }
    }

    /// Returns the string value of word, string and raw string literals
    pub fn as_str(&self) -> Option<&str> {
        self.as_literal().and_then(Literal::as_str)
    }

    /// Returns the expression as a scalar literal
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Returns the expression as an array
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Expr::Array(ary) => Some(ary),
            _ => None,
        }
    }

    /// Returns the expression as a map
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Expr::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Moves nested expressions out of `self` onto `pending`
    fn take_children(&mut self, pending: &mut Vec<Expr>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Array(ary) => pending.append(&mut ary.elems),
            Expr::Map(map) => {
                for (_, entry) in map.elems.drain(..) {
                    pending.push(entry.key);
                    pending.push(entry.value);
                }
            }
        }
    }
}

/// Arrays and maps may nest arbitrarily deep; they are released iteratively
impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(mut expr) = pending.pop() {
            expr.take_children(&mut pending);
        }
    }
}

/// A single scalar token
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub token: Token,
}

impl Literal {
    /// Wraps a scalar token
    pub fn new(token: Token) -> Self {
        Self { token }
    }

    /// Returns the kind of the underlying token
    pub fn kind(&self) -> TokenKind {
        self.token.kind
    }

    /// Returns the decoded token value
    pub fn value(&self) -> Option<&Value> {
        self.token.value.as_ref()
    }

    /// Returns the string value of word, string and raw string literals
    pub fn as_str(&self) -> Option<&str> {
        self.token.as_str()
    }

    /// Returns the value of a boolean literal
    pub fn as_bool(&self) -> Option<bool> {
        match self.value() {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value of an integer literal of any base
    pub fn as_integer(&self) -> Option<&BigInt> {
        match self.value() {
            Some(Value::Integer(n)) => Some(n),
            _ => None,
        }
    }

    /// Returns the normalized value of a rational literal
    pub fn as_rational(&self) -> Option<&BigRational> {
        match self.value() {
            Some(Value::Rational(r)) => Some(r),
            _ => None,
        }
    }

    /// Returns the value of a decimal literal
    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self.value() {
            Some(Value::Decimal(d)) => Some(d),
            _ => None,
        }
    }

    /// Returns a duration literal in nanoseconds
    pub fn as_duration(&self) -> Option<i64> {
        match self.value() {
            Some(Value::Duration(ns)) => Some(*ns),
            _ => None,
        }
    }

    /// Returns the compiled pattern of a regexp literal
    pub fn as_regex(&self) -> Option<&Regex> {
        match self.value() {
            Some(Value::Regexp(rx)) => Some(rx),
            _ => None,
        }
    }
}

/// An ordered `[ ... ]` sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub elems: Vec<Expr>,
    /// The opening `[`
    pub start: Token,
    /// The closing `]`
    pub end: Token,
}

impl Array {
    /// Returns the number of elements
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Expr> {
        self.elems.iter()
    }
}

/// A `#{ key value ... }` map keyed by the decoded key string
///
/// Entries are stored in `ord` order; a repeated key replaces the earlier entry
/// and moves to the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    pub elems: IndexMap<String, MapEntry>,
    /// The opening `#{`
    pub start: Token,
    /// The closing `}`
    pub end: Token,
}

impl Map {
    /// Returns the value stored under `key`
    pub fn get(&self, key: &str) -> Option<&Expr> {
        self.elems.get(key).map(|entry| &entry.value)
    }

    /// Returns the entry stored under `key`, including its key expression
    pub fn entry(&self, key: &str) -> Option<&MapEntry> {
        self.elems.get(key)
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Iterates over entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MapEntry)> {
        self.elems.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A key/value pair of a [`Map`]
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    /// Position among all key/value pairs read by the map, counting replaced ones
    pub ord: usize,
    pub key: Expr,
    pub value: Expr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;

    fn word(text: &str) -> Token {
        Token::new(TokenKind::Word, text, Location::new(), Location::new())
            .with_value(Value::String(text.to_string()))
    }

    fn punct(kind: TokenKind, text: &str) -> Token {
        Token::new(kind, text, Location::new(), Location::new())
    }

    #[test]
    fn test_node_accessors() {
        let stmt = Node::Statement(Statement {
            name: Literal::new(word("listen")),
            args: vec![Expr::Literal(Literal::new(word("80")))],
            end: punct(TokenKind::Semicolon, ";"),
        });
        assert_eq!(stmt.name(), "listen");
        assert_eq!(stmt.args().len(), 1);
        assert!(stmt.children().is_empty());
        assert_eq!(stmt.end().kind, TokenKind::Semicolon);
        assert!(stmt.as_section().is_none());

        let sect = Node::Section(Section {
            name: Literal::new(word("server")),
            args: Vec::new(),
            children: vec![stmt.clone()],
            start: punct(TokenKind::CurlOpen, "{"),
            end: punct(TokenKind::CurlClose, "}"),
        });
        assert_eq!(sect.start().raw, "server");
        assert_eq!(sect.children(), &[stmt]);
    }

    #[test]
    fn test_map_lookup() {
        let mut elems = IndexMap::new();
        elems.insert(
            "k".to_string(),
            MapEntry {
                ord: 1,
                key: Expr::Literal(Literal::new(word("k"))),
                value: Expr::Literal(Literal::new(word("v"))),
            },
        );
        let map = Map {
            elems,
            start: punct(TokenKind::MapOpen, "#{"),
            end: punct(TokenKind::CurlClose, "}"),
        };
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("k").and_then(Expr::as_str), Some("v"));
        assert_eq!(map.entry("k").map(|e| e.ord), Some(1));
        assert!(map.get("missing").is_none());

        let expr = Expr::Map(map);
        assert_eq!(expr.token().raw, "#{");
        assert_eq!(expr.end().raw, "}");
        assert!(expr.as_str().is_none());
    }

    #[test]
    fn test_deeply_nested_arrays_drop() {
        let mut expr = Expr::Literal(Literal::new(word("leaf")));
        for _ in 0..200_000 {
            expr = Expr::Array(Array {
                elems: vec![expr],
                start: punct(TokenKind::BracketOpen, "["),
                end: punct(TokenKind::BracketClose, "]"),
            });
        }
        drop(expr);
    }

    #[test]
    fn test_deeply_nested_sections_drop() {
        let mut node = Node::Statement(Statement {
            name: Literal::new(word("leaf")),
            args: Vec::new(),
            end: punct(TokenKind::Semicolon, ";"),
        });
        for _ in 0..200_000 {
            node = Node::Section(Section {
                name: Literal::new(word("s")),
                args: Vec::new(),
                children: vec![node],
                start: punct(TokenKind::CurlOpen, "{"),
                end: punct(TokenKind::CurlClose, "}"),
            });
        }
        drop(Document {
            children: vec![node],
        });
    }

    #[test]
    fn test_literal_typed_accessors() {
        let lit = Literal::new(
            Token::new(TokenKind::Integer, "42", Location::new(), Location::new())
                .with_value(Value::Integer(BigInt::from(42))),
        );
        assert_eq!(lit.as_integer(), Some(&BigInt::from(42)));
        assert!(lit.as_str().is_none());
        assert!(lit.as_bool().is_none());
        assert!(lit.as_duration().is_none());
    }
}
