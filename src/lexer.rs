//! codf lexical analyzer
//!
//! This module converts a byte stream into a pull-based stream of [`Token`]s.
//! The lexer reads one UTF-8 character at a time from any [`BufRead`] and
//! never needs more than a single character of lookahead.
//!
//! Literal grammars overlap heavily (`10m` is a duration, `10mb` is a word,
//! `10.0.0.1` is a word, `10.5` is a decimal), so every specialized grammar is
//! attempted greedily and, if it does not complete, the characters consumed so
//! far are kept and lexing continues as a plain word. Only input that cannot be
//! reinterpreted (bad encoding, unterminated strings, bad escapes, zero
//! denominators) produces a [`LexError`].

use crate::error::{LexError, Location};
use crate::token::{Token, TokenKind, Value};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;
use tracing::trace;

/// Default bit precision for decimal literals
pub const DEFAULT_PRECISION: u32 = 80;

/// Bit set of literal families the lexer should not recognize
///
/// A disabled family is never attempted; its text lexes as a word instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LexerFlags(u8);

impl LexerFlags {
    /// Recognize every literal family
    pub const DEFAULT: Self = Self(0);
    /// Treat `#/.../` as words
    pub const NO_REGEXPS: Self = Self(1 << 0);
    /// Leave `true`, `yes`, `false`, `no` and friends as words
    pub const NO_BOOLS: Self = Self(1 << 1);
    /// Treat durations as words
    pub const NO_DURATIONS: Self = Self(1 << 2);
    /// Treat rationals as words
    pub const NO_RATIONALS: Self = Self(1 << 3);
    /// Treat decimals as words
    pub const NO_FLOATS: Self = Self(1 << 4);
    /// Treat hex, binary, octal and `B#digits` integers as words
    pub const NO_BASE_INTS: Self = Self(1 << 5);
    /// Treat every numeric literal, including plain integers, as a word
    pub const NO_NUMBERS: Self = Self(
        Self::NUMBERS_OFF.0
            | Self::NO_DURATIONS.0
            | Self::NO_RATIONALS.0
            | Self::NO_FLOATS.0
            | Self::NO_BASE_INTS.0,
    );

    /// Skips the numeric family entirely, plain integers included
    const NUMBERS_OFF: Self = Self(1 << 6);

    /// Creates empty flags
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns the raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Checks if any of the given flags are set
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Checks if all of the given flags are set
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns the union of two flag sets
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the difference of two flag sets
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Inserts the given flags
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Removes the given flags
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Returns true if no flags are set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the family guarded by `flag` is still enabled
    #[inline(always)]
    const fn allows(self, flag: Self) -> bool {
        !self.intersects(flag)
    }

    fn any_numbers(self) -> bool {
        self.allows(Self::NUMBERS_OFF)
    }
}

impl std::ops::BitOr for LexerFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for LexerFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl std::ops::BitAnd for LexerFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl std::ops::Sub for LexerFlags {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.difference(rhs)
    }
}

/// Configuration options for the lexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexerConfig {
    /// Source name recorded in every [`Location`]
    pub name: String,
    /// Disabled literal families
    pub flags: LexerFlags,
    /// Bit precision of decimal literals; zero selects [`DEFAULT_PRECISION`]
    pub precision: u32,
}

impl LexerConfig {
    /// Creates a new lexer configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the disabled literal families
    pub fn with_flags(mut self, flags: LexerFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the decimal precision in bits
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    /// Returns the effective precision in bits
    pub fn effective_precision(&self) -> u32 {
        if self.precision == 0 {
            DEFAULT_PRECISION
        } else {
            self.precision
        }
    }

    /// Returns the number of significant decimal digits kept for decimals
    pub fn decimal_digits(&self) -> u64 {
        // ceil(bits * log10(2))
        (u64::from(self.effective_precision()) * 30_103).div_ceil(100_000)
    }
}

impl Default for LexerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            flags: LexerFlags::DEFAULT,
            precision: DEFAULT_PRECISION,
        }
    }
}

/// Anything that can hand the parser one token at a time
pub trait TokenSource {
    /// Reads the next token
    fn read_token(&mut self) -> Result<Token, LexError>;
}

impl<T: TokenSource + ?Sized> TokenSource for &mut T {
    fn read_token(&mut self) -> Result<Token, LexError> {
        (**self).read_token()
    }
}

impl<R: BufRead> TokenSource for Lexer<R> {
    fn read_token(&mut self) -> Result<Token, LexError> {
        Lexer::read_token(self)
    }
}

/// Characters that can never continue a word at nesting depth zero
#[inline(always)]
fn is_delimiter(ch: char) -> bool {
    matches!(ch, ';' | '"' | '`' | '{' | '}' | '[' | ']')
}

/// Control characters other than whitespace are rejected outright
#[inline(always)]
fn is_forbidden(ch: char) -> bool {
    ch.is_control() && !ch.is_whitespace()
}

/// Decides whether `ch` continues a word, updating the bracket depth
///
/// `{` always nests; `[` nests only inside brackets or right after `$`/`#`,
/// so `${a}` and `#[a]` are words while `a[` ends the word `a`.
fn continues_word(ch: char, prev: Option<char>, depth: &mut usize) -> bool {
    match ch {
        '{' => {
            *depth += 1;
            true
        }
        '[' if *depth > 0 || matches!(prev, Some('$' | '#')) => {
            *depth += 1;
            true
        }
        '}' | ']' if *depth > 0 => {
            *depth -= 1;
            true
        }
        ch if is_delimiter(ch) => false,
        ch => !ch.is_whitespace() && !ch.is_control(),
    }
}

fn is_unit_start(ch: char) -> bool {
    matches!(ch, 'n' | 'u' | 'μ' | 'µ' | 'm' | 's' | 'h')
}

/// Nanoseconds per duration unit
fn unit_nanos(unit: &str) -> Option<u64> {
    Some(match unit {
        "ns" => 1,
        "us" | "μs" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 60 * 60 * 1_000_000_000,
        _ => return None,
    })
}

/// Sums the components of an unsigned duration body such as `1h30m0.5s`
///
/// The body has already been validated by the lexer; `None` means the total
/// does not fit in the signed range.
fn duration_nanos(body: &str, negative: bool) -> Option<i64> {
    let mut total: u128 = 0;
    let mut rest = body;
    while !rest.is_empty() {
        let int_len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (int_part, tail) = rest.split_at(int_len);
        let (frac_part, tail) = match tail.strip_prefix('.') {
            Some(tail) => {
                let len = tail
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(tail.len());
                tail.split_at(len)
            }
            None => ("", tail),
        };
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let unit = u128::from(unit_nanos(unit)?);

        let whole: u128 = int_part.parse().ok()?;
        total = total.checked_add(whole.checked_mul(unit)?)?;

        // Fraction digits beyond nanosecond resolution cannot matter.
        let mut frac: u128 = 0;
        let mut scale: u128 = 1;
        for d in frac_part.bytes().take(18) {
            frac = frac * 10 + u128::from(d - b'0');
            scale *= 10;
        }
        total = total.checked_add(frac * unit / scale)?;
        rest = tail;
    }

    if negative {
        if total > i64::MAX as u128 + 1 {
            return None;
        }
        Some((total as i128).wrapping_neg() as i64)
    } else {
        i64::try_from(total).ok()
    }
}

/// codf lexer reading from a buffered byte source
pub struct Lexer<R> {
    /// Byte source being lexed
    reader: R,
    /// Lexer configuration
    config: LexerConfig,
    /// Location of the next unread character
    location: Location,
    /// Start of the token in progress
    start: Location,
    /// Decoded lookahead character
    peeked: Option<char>,
    /// Whether `peeked` reflects the stream
    peek_loaded: bool,
    /// Most recently consumed character
    prev: Option<char>,
    /// Source text of the token in progress
    raw: String,
    /// First fatal error, repeated on every later call
    failed: Option<LexError>,
}

impl<R: BufRead> Lexer<R> {
    /// Creates a new lexer with default configuration
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, LexerConfig::default())
    }

    /// Creates a new lexer with custom configuration
    pub fn with_config(reader: R, config: LexerConfig) -> Self {
        let location = Location::named(Arc::<str>::from(config.name.as_str()));
        Self {
            reader,
            config,
            start: location.clone(),
            location,
            peeked: None,
            peek_loaded: false,
            prev: None,
            raw: String::new(),
            failed: None,
        }
    }

    /// Returns the lexer configuration
    pub fn config(&self) -> &LexerConfig {
        &self.config
    }

    /// Returns the location of the next unread character
    pub fn current_location(&self) -> &Location {
        &self.location
    }

    /// Reads the next token
    ///
    /// After the first error the lexer is poisoned and returns that error
    /// again on every call.
    pub fn read_token(&mut self) -> Result<Token, LexError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        match self.lex_token() {
            Ok(token) => Ok(token),
            Err(err) => {
                self.failed = Some(err.clone());
                Err(err)
            }
        }
    }

    fn io_error(&self, err: std::io::Error) -> LexError {
        LexError::Io {
            message: err.to_string(),
            location: self.location.clone(),
        }
    }

    fn invalid_utf8(&self) -> LexError {
        LexError::InvalidUtf8 {
            location: self.location.clone(),
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>, LexError> {
        loop {
            match self.reader.fill_buf() {
                Ok([]) => return Ok(None),
                Ok(buf) => {
                    let byte = buf[0];
                    self.reader.consume(1);
                    return Ok(Some(byte));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.io_error(err)),
            }
        }
    }

    /// Decodes one UTF-8 character from the source
    fn read_char(&mut self) -> Result<Option<char>, LexError> {
        let Some(first) = self.read_byte()? else {
            return Ok(None);
        };
        let width = match first {
            0x00..=0x7F => return Ok(Some(char::from(first))),
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return Err(self.invalid_utf8()),
        };
        let mut buf = [first, 0, 0, 0];
        for slot in buf.iter_mut().take(width).skip(1) {
            *slot = self.read_byte()?.ok_or_else(|| self.invalid_utf8())?;
        }
        std::str::from_utf8(&buf[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .map(Some)
            .ok_or_else(|| self.invalid_utf8())
    }

    /// Peeks at the current character without advancing
    fn peek(&mut self) -> Result<Option<char>, LexError> {
        if !self.peek_loaded {
            self.peeked = self.read_char()?;
            self.peek_loaded = true;
        }
        Ok(self.peeked)
    }

    /// Consumes the peeked character into the token in progress
    fn bump(&mut self) -> Option<char> {
        let ch = self.peeked.take()?;
        self.peek_loaded = false;
        self.location.advance(ch, self.prev);
        self.prev = Some(ch);
        self.raw.push(ch);
        Some(ch)
    }

    /// Consumes and returns the next character, failing with `eof` at end of input
    fn next_or(&mut self, eof: impl FnOnce(Location) -> LexError) -> Result<char, LexError> {
        match self.peek()? {
            Some(_) => Ok(self.bump().unwrap_or_default()),
            None => Err(eof(self.start.clone())),
        }
    }

    fn emit(&mut self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            std::mem::take(&mut self.raw),
            self.start.clone(),
            self.location.clone(),
        )
    }

    fn emit_value(&mut self, kind: TokenKind, value: Value) -> Token {
        self.emit(kind).with_value(value)
    }

    fn punct(&mut self, kind: TokenKind) -> Result<Token, LexError> {
        self.bump();
        Ok(self.emit(kind))
    }

    fn lex_token(&mut self) -> Result<Token, LexError> {
        self.raw.clear();
        self.start = self.location.clone();

        let Some(ch) = self.peek()? else {
            return Ok(self.emit(TokenKind::Eof));
        };

        match ch {
            ch if ch.is_whitespace() => self.lex_whitespace(),
            '\'' => {
                self.bump();
                self.lex_comment()
            }
            '/' => {
                self.bump();
                if self.peek()? == Some('/') {
                    self.bump();
                    self.lex_comment()
                } else {
                    self.lex_word()
                }
            }
            ';' => self.punct(TokenKind::Semicolon),
            '{' => self.punct(TokenKind::CurlOpen),
            '}' => self.punct(TokenKind::CurlClose),
            '[' => self.punct(TokenKind::BracketOpen),
            ']' => self.punct(TokenKind::BracketClose),
            '#' => {
                self.bump();
                match self.peek()? {
                    Some('{') => self.punct(TokenKind::MapOpen),
                    Some('/') if self.config.flags.allows(LexerFlags::NO_REGEXPS) => {
                        self.bump();
                        self.lex_regexp()
                    }
                    _ => self.lex_word(),
                }
            }
            '"' => self.lex_string(),
            '`' => self.lex_raw_string(),
            '+' | '-' | '0'..='9' if self.config.flags.any_numbers() => self.lex_number(),
            ch if is_forbidden(ch) => Err(LexError::UnexpectedCharacter {
                character: ch,
                location: self.location.clone(),
            }),
            _ => self.lex_word(),
        }
    }

    fn lex_whitespace(&mut self) -> Result<Token, LexError> {
        while let Some(ch) = self.peek()? {
            if !ch.is_whitespace() {
                break;
            }
            self.bump();
        }
        Ok(self.emit(TokenKind::Whitespace))
    }

    /// Lexes the remainder of a line comment; the marker is already consumed
    ///
    /// The line terminator is left for the following whitespace token, and
    /// end of input ends the comment without error.
    fn lex_comment(&mut self) -> Result<Token, LexError> {
        while let Some(ch) = self.peek()? {
            if matches!(ch, '\n' | '\r') {
                break;
            }
            self.bump();
        }
        Ok(self.emit(TokenKind::Comment))
    }

    /// Continues the token in progress as a word
    ///
    /// Whatever was consumed before the call stays part of the word, which is
    /// how failed numeric and regexp attempts degrade.
    fn lex_word(&mut self) -> Result<Token, LexError> {
        let mut depth = 0;
        while let Some(ch) = self.peek()? {
            if !continues_word(ch, self.prev, &mut depth) {
                break;
            }
            self.bump();
        }
        let word = self.raw.clone();
        let token = self.emit_value(TokenKind::Word, Value::String(word));
        if self.config.flags.allows(LexerFlags::NO_BOOLS) {
            Ok(token.into_bool())
        } else {
            Ok(token)
        }
    }

    /// Gives up on a numeric literal and lexes the whole run as a word
    fn fallback(&mut self) -> Result<Token, LexError> {
        trace!(prefix = %self.raw, start = %self.start, "numeric literal degraded to word");
        self.lex_word()
    }

    /// Returns true if the next character would end a word at depth zero
    fn at_literal_end(&mut self) -> Result<bool, LexError> {
        match self.peek()? {
            None => Ok(true),
            Some(ch) if is_forbidden(ch) => Err(LexError::UnexpectedCharacter {
                character: ch,
                location: self.location.clone(),
            }),
            Some(ch) => Ok(!continues_word(ch, self.prev, &mut 0)),
        }
    }

    /// Consumes digits of the given radix and returns how many were read
    fn take_digits(&mut self, radix: u32) -> Result<usize, LexError> {
        let mut count = 0;
        while let Some(ch) = self.peek()? {
            if !ch.is_digit(radix) {
                break;
            }
            self.bump();
            count += 1;
        }
        Ok(count)
    }

    fn is_negative(&self) -> bool {
        self.raw.starts_with('-')
    }

    fn signed_int(&self, digits: &str, radix: u32) -> Option<BigInt> {
        let n = BigInt::parse_bytes(digits.as_bytes(), radix)?;
        Some(if self.is_negative() { -n } else { n })
    }

    /// Emits an integer whose digits start at byte `from` of the raw text
    fn finish_int(&mut self, kind: TokenKind, from: usize, radix: u32) -> Result<Token, LexError> {
        match self.signed_int(&self.raw[from..], radix) {
            Some(n) => Ok(self.emit_value(kind, Value::Integer(n))),
            None => self.fallback(),
        }
    }

    /// Lexes the numeric family: integers of every base, rationals, decimals
    /// and durations, all with an optional sign
    fn lex_number(&mut self) -> Result<Token, LexError> {
        let flags = self.config.flags;

        if matches!(self.peek()?, Some('+' | '-')) {
            self.bump();
        }
        let body = self.raw.len();

        if !matches!(self.peek()?, Some('0'..='9')) {
            return self.lex_word();
        }

        if self.peek()? == Some('0') && flags.allows(LexerFlags::NO_BASE_INTS) {
            self.bump();
            let (radix, kind) = match self.peek()? {
                Some('x' | 'X') => (16, TokenKind::Hex),
                Some('b' | 'B') => (2, TokenKind::Binary),
                _ => (0, TokenKind::Integer),
            };
            if radix != 0 {
                self.bump();
                let digits = self.raw.len();
                let count = self.take_digits(radix)?;
                if !self.at_literal_end()? || count == 0 {
                    return self.fallback();
                }
                return self.finish_int(kind, digits, radix);
            }
        }

        self.take_digits(10)?;

        match self.peek()? {
            Some('#') if flags.allows(LexerFlags::NO_BASE_INTS) => {
                self.bump();
                self.lex_base_int(body)
            }
            Some('/') if flags.allows(LexerFlags::NO_RATIONALS) => {
                self.bump();
                self.lex_rational(body)
            }
            Some('.' | 'e' | 'E') => self.lex_decimal(body),
            Some(ch) if is_unit_start(ch) && flags.allows(LexerFlags::NO_DURATIONS) => {
                self.lex_duration(body)
            }
            _ => {
                if !self.at_literal_end()? {
                    return self.fallback();
                }
                let digits = &self.raw[body..];
                if digits.len() > 1 && digits.starts_with('0') {
                    let octal = digits.bytes().all(|b| (b'0'..=b'7').contains(&b));
                    if octal && flags.allows(LexerFlags::NO_BASE_INTS) {
                        return self.finish_int(TokenKind::Octal, body, 8);
                    }
                    return self.fallback();
                }
                self.finish_int(TokenKind::Integer, body, 10)
            }
        }
    }

    /// Lexes the digits of a `B#digits` literal; the `#` is consumed
    fn lex_base_int(&mut self, body: usize) -> Result<Token, LexError> {
        let hash = self.raw.len() - 1;
        let radix = match self.raw[body..hash].parse::<u32>() {
            Ok(radix) if (2..=36).contains(&radix) => radix,
            _ => return self.fallback(),
        };
        let digits = self.raw.len();
        let count = self.take_digits(radix)?;
        if !self.at_literal_end()? || count == 0 {
            return self.fallback();
        }
        self.finish_int(TokenKind::BaseInt, digits, radix)
    }

    /// Lexes the denominator of a rational; the `/` is consumed
    ///
    /// Once a complete denominator has been read the literal is committed, so
    /// a zero denominator is an error rather than a word.
    fn lex_rational(&mut self, body: usize) -> Result<Token, LexError> {
        let slash = self.raw.len() - 1;
        let count = self.take_digits(10)?;
        if !self.at_literal_end()? || count == 0 {
            return self.fallback();
        }

        let numer = self.signed_int(&self.raw[body..slash], 10);
        let denom = BigInt::parse_bytes(self.raw[slash + 1..].as_bytes(), 10);
        let (Some(numer), Some(denom)) = (numer, denom) else {
            return self.fallback();
        };
        if denom.is_zero() {
            return Err(LexError::ZeroDenominator {
                text: self.raw.clone(),
                location: self.start.clone(),
            });
        }
        Ok(self.emit_value(
            TokenKind::Rational,
            Value::Rational(BigRational::new(numer, denom)),
        ))
    }

    /// Lexes a fraction and/or exponent following integer digits
    ///
    /// A fraction followed by a duration unit switches to duration lexing.
    fn lex_decimal(&mut self, body: usize) -> Result<Token, LexError> {
        let flags = self.config.flags;

        if self.peek()? == Some('.') {
            self.bump();
            if self.take_digits(10)? == 0 {
                return self.fallback();
            }
            if let Some(ch) = self.peek()?
                && is_unit_start(ch)
            {
                if flags.allows(LexerFlags::NO_DURATIONS) {
                    return self.lex_duration(body);
                }
                return self.fallback();
            }
        }

        if matches!(self.peek()?, Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek()?, Some('+' | '-')) {
                self.bump();
            }
            if self.take_digits(10)? == 0 {
                return self.fallback();
            }
        }

        if !self.at_literal_end()? || !flags.allows(LexerFlags::NO_FLOATS) {
            return self.fallback();
        }

        let text = self.raw.strip_prefix('+').unwrap_or(&self.raw);
        match BigDecimal::from_str(text) {
            Ok(d) => {
                let digits = self.config.decimal_digits();
                let d = if d.digits() > digits { d.with_prec(digits) } else { d };
                Ok(self.emit_value(TokenKind::Decimal, Value::Decimal(d)))
            }
            Err(_) => self.fallback(),
        }
    }

    /// Lexes duration components; the first magnitude is consumed and the
    /// next character starts its unit
    fn lex_duration(&mut self, body: usize) -> Result<Token, LexError> {
        loop {
            let unit_start = self.raw.len();
            while !self.at_literal_end()? {
                match self.peek()? {
                    Some(ch) if ch.is_ascii_digit() || matches!(ch, '.' | '{' | '[') => break,
                    _ => {
                        self.bump();
                    }
                }
            }
            if unit_nanos(&self.raw[unit_start..]).is_none() {
                return self.fallback();
            }
            if self.at_literal_end()? {
                break;
            }

            // Next magnitude: digits with an optional fraction.
            if self.take_digits(10)? == 0 {
                return self.fallback();
            }
            if self.peek()? == Some('.') {
                self.bump();
                if self.take_digits(10)? == 0 {
                    return self.fallback();
                }
            }
        }

        match duration_nanos(&self.raw[body..], self.is_negative()) {
            Some(ns) => Ok(self.emit_value(TokenKind::Duration, Value::Duration(ns))),
            None => self.fallback(),
        }
    }

    /// Lexes a double-quoted string with escapes
    fn lex_string(&mut self) -> Result<Token, LexError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.next_or(|location| LexError::UnterminatedString { location })? {
                '"' => break,
                '\\' => value.push(self.lex_escape()?),
                ch => value.push(ch),
            }
        }
        Ok(self.emit_value(TokenKind::String, Value::String(value)))
    }

    /// Decodes one escape sequence; the backslash is consumed
    fn lex_escape(&mut self) -> Result<char, LexError> {
        let location = self.location.clone();
        let mut sequence = String::new();
        let Some(ch) = self.peek()? else {
            return Err(LexError::InvalidEscape { sequence, location });
        };
        self.bump();
        sequence.push(ch);

        let simple = match ch {
            'a' => Some('\x07'),
            'b' => Some('\x08'),
            'f' => Some('\x0C'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'v' => Some('\x0B'),
            '\\' => Some('\\'),
            '"' => Some('"'),
            _ => None,
        };
        if let Some(decoded) = simple {
            return Ok(decoded);
        }

        let code = match ch {
            '0'..='7' => {
                let rest = self.escape_digits(&mut sequence, 2, 8, &location)?;
                let code = (ch as u32 - '0' as u32) * 64 + rest;
                if code > 0o377 {
                    return Err(LexError::InvalidEscape { sequence, location });
                }
                code
            }
            'x' => self.escape_digits(&mut sequence, 2, 16, &location)?,
            'u' => self.escape_digits(&mut sequence, 4, 16, &location)?,
            'U' => self.escape_digits(&mut sequence, 8, 16, &location)?,
            _ => return Err(LexError::InvalidEscape { sequence, location }),
        };
        char::from_u32(code).ok_or(LexError::InvalidEscape { sequence, location })
    }

    /// Reads exactly `count` digits of an escape sequence
    fn escape_digits(
        &mut self,
        sequence: &mut String,
        count: usize,
        radix: u32,
        location: &Location,
    ) -> Result<u32, LexError> {
        let mut code: u32 = 0;
        for _ in 0..count {
            let digit = match self.peek()? {
                Some(ch) => {
                    sequence.push(ch);
                    ch.to_digit(radix)
                }
                None => None,
            };
            let Some(digit) = digit else {
                return Err(LexError::InvalidEscape {
                    sequence: sequence.clone(),
                    location: location.clone(),
                });
            };
            self.bump();
            code = code * radix + digit;
        }
        Ok(code)
    }

    /// Lexes a backtick raw string; a doubled backtick is a literal backtick
    fn lex_raw_string(&mut self) -> Result<Token, LexError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.next_or(|location| LexError::UnterminatedRawString { location })? {
                '`' => {
                    if self.peek()? != Some('`') {
                        break;
                    }
                    self.bump();
                    value.push('`');
                }
                ch => value.push(ch),
            }
        }
        Ok(self.emit_value(TokenKind::RawString, Value::String(value)))
    }

    /// Lexes a `#/.../` regexp; the `#/` is consumed
    fn lex_regexp(&mut self) -> Result<Token, LexError> {
        let mut pattern = String::new();
        loop {
            match self.next_or(|location| LexError::UnterminatedRegexp { location })? {
                '/' => break,
                // `\/` is a literal slash; any other pair passes through intact
                '\\' => match self.peek()? {
                    Some('/') => {
                        self.bump();
                        pattern.push('/');
                    }
                    Some(ch) => {
                        self.bump();
                        pattern.push('\\');
                        pattern.push(ch);
                    }
                    None => pattern.push('\\'),
                },
                ch => pattern.push(ch),
            }
        }
        match Regex::new(&pattern) {
            Ok(rx) => Ok(self.emit_value(TokenKind::Regexp, Value::Regexp(rx))),
            Err(err) => Err(LexError::InvalidRegexp {
                message: err.to_string(),
                location: self.start.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(input: &str) -> Vec<Token> {
        lex_all_with(input, LexerFlags::DEFAULT)
    }

    fn lex_all_with(input: &str, flags: LexerFlags) -> Vec<Token> {
        let config = LexerConfig::default().with_flags(flags);
        let mut lexer = Lexer::with_config(input.as_bytes(), config);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.read_token().expect("lexing should succeed");
            let eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if eof {
                return tokens;
            }
        }
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    fn single(input: &str) -> Token {
        let tokens = lex_all(input);
        assert_eq!(tokens.len(), 2, "expected one token for {input:?}: {tokens:?}");
        tokens.into_iter().next().unwrap()
    }

    fn lex_err(input: &str) -> LexError {
        let mut lexer = Lexer::new(input.as_bytes());
        loop {
            match lexer.read_token() {
                Ok(token) if token.kind == TokenKind::Eof => {
                    panic!("expected error for {input:?}")
                }
                Ok(_) => {}
                Err(err) => return err,
            }
        }
    }

    #[test]
    fn test_lexer_flags_bitwise_operations() {
        let flags = LexerFlags::NO_REGEXPS | LexerFlags::NO_BOOLS;
        assert!(flags.contains(LexerFlags::NO_REGEXPS));
        assert!(flags.contains(LexerFlags::NO_BOOLS));
        assert!(!flags.intersects(LexerFlags::NO_FLOATS));
        assert!(LexerFlags::NO_NUMBERS.contains(LexerFlags::NO_FLOATS));
        assert!(LexerFlags::NO_NUMBERS.contains(LexerFlags::NO_BASE_INTS));
        assert!(!LexerFlags::NO_NUMBERS.intersects(LexerFlags::NO_BOOLS));
        assert_eq!((flags - LexerFlags::NO_BOOLS), LexerFlags::NO_REGEXPS);
        assert!(LexerFlags::empty().is_empty());
    }

    #[test]
    fn test_decimal_digits_from_precision() {
        assert_eq!(LexerConfig::default().decimal_digits(), 25);
        assert_eq!(LexerConfig::default().with_precision(0).decimal_digits(), 25);
        assert_eq!(LexerConfig::default().with_precision(32).decimal_digits(), 10);
        assert_eq!(LexerConfig::default().with_precision(240).decimal_digits(), 73);
    }

    #[test]
    fn test_location_tracking_crlf() {
        let tokens = lex_all(" \n\r\n\t ");
        assert_eq!(tokens[0].kind, TokenKind::Whitespace);
        assert_eq!(tokens[0].end.line, 3);
        assert_eq!(tokens[0].end.column, 3);
        assert_eq!(tokens[0].end.offset, 6);
    }

    #[test]
    fn test_punctuation() {
        let tokens = lex_all(";{}[]#{");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Semicolon,
                TokenKind::CurlOpen,
                TokenKind::CurlClose,
                TokenKind::BracketOpen,
                TokenKind::BracketClose,
                TokenKind::MapOpen,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[5].raw, "#{");
        assert!(tokens.iter().all(|t| t.value.is_none()));
    }

    #[test]
    fn test_words_with_brackets() {
        for word in ["stmt{}", "${foo}", "#[foo]", "$[foo]", "${{foo}}", "${[foo}]"] {
            let token = single(word);
            assert_eq!(token.kind, TokenKind::Word, "{word}");
            assert_eq!(token.raw, word);
        }

        let tokens = lex_all("invalid}");
        assert_eq!(tokens[0].raw, "invalid");
        assert_eq!(tokens[1].kind, TokenKind::CurlClose);

        let tokens = lex_all("sect[]");
        assert_eq!(tokens[0].raw, "sect");
        assert_eq!(tokens[1].kind, TokenKind::BracketOpen);
    }

    #[test]
    fn test_hash_prefixes() {
        let tokens = lex_all("# #f #\"foo\"");
        assert_eq!(tokens[0].raw, "#");
        assert_eq!(tokens[2].raw, "#f");
        assert_eq!(tokens[4].raw, "#");
        assert_eq!(tokens[5].kind, TokenKind::String);
    }

    #[test]
    fn test_comment_markers() {
        let tokens = lex_all("' one\n// two\nc//three");
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].comment_text(), Some(" one"));
        assert_eq!(tokens[1].raw, "\n");
        assert_eq!(tokens[2].comment_text(), Some(" two"));
        assert_eq!(tokens[4].kind, TokenKind::Word);
        assert_eq!(tokens[4].raw, "c//three");
    }

    #[test]
    fn test_comment_at_eof() {
        let tokens = lex_all("// trailing");
        assert_eq!(kinds(&tokens), vec![TokenKind::Comment, TokenKind::Eof]);
    }

    #[test]
    fn test_duration_units() {
        let cases = [
            ("1ns", 1),
            ("1us", 1_000),
            ("1μs", 1_000),
            ("1ms", 1_000_000),
            ("1s", 1_000_000_000),
            ("1m", 60_000_000_000),
            ("1h", 3_600_000_000_000),
            ("-1h30m", -5_400_000_000_000),
            ("0.05s", 50_000_000),
            ("1h0.25m", 3_615_000_000_000),
        ];
        for (text, nanos) in cases {
            let token = single(text);
            assert_eq!(token.kind, TokenKind::Duration, "{text}");
            assert_eq!(token.value, Some(Value::Duration(nanos)), "{text}");
        }
    }

    #[test]
    fn test_duration_overflow_is_word() {
        let token = single("9999999999999999h");
        assert_eq!(token.kind, TokenKind::Word);
    }

    #[test]
    fn test_octal_requires_octal_digits() {
        assert_eq!(single("0600").kind, TokenKind::Octal);
        assert_eq!(single("0000").kind, TokenKind::Octal);
        assert_eq!(single("08").kind, TokenKind::Word);
        assert_eq!(single("0").kind, TokenKind::Integer);
    }

    #[test]
    fn test_escape_decoding() {
        let token = single(r#""\101\x42C\U00000044""#);
        assert_eq!(token.value, Some(Value::String("ABCD".to_string())));
    }

    #[test]
    fn test_octal_escape_out_of_range() {
        assert!(matches!(lex_err(r#""\400""#), LexError::InvalidEscape { .. }));
    }

    #[test]
    fn test_surrogate_escape_rejected() {
        assert!(matches!(lex_err(r#""\ud800""#), LexError::InvalidEscape { .. }));
    }

    #[test]
    fn test_regexp_escaped_backslash_before_close() {
        let tokens = lex_all(r"#/a\\/ #/\\\// ");
        assert_eq!(tokens[0].kind, TokenKind::Regexp);
        assert_eq!(tokens[0].raw, r"#/a\\/");
        assert_eq!(tokens[0].value, Some(Value::Regexp(Regex::new(r"a\\").unwrap())));
        assert_eq!(tokens[2].kind, TokenKind::Regexp);
        assert_eq!(tokens[2].value, Some(Value::Regexp(Regex::new(r"\\/").unwrap())));
        assert_eq!(tokens[3].kind, TokenKind::Whitespace);
    }

    #[test]
    fn test_invalid_regexp() {
        assert!(matches!(lex_err("#/(/"), LexError::InvalidRegexp { .. }));
    }

    #[test]
    fn test_lexer_is_poisoned_after_error() {
        let mut lexer = Lexer::new(&b"\"unterminated"[..]);
        let first = lexer.read_token().unwrap_err();
        let second = lexer.read_token().unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_eof_repeats() {
        let mut lexer = Lexer::new(&b""[..]);
        assert_eq!(lexer.read_token().unwrap().kind, TokenKind::Eof);
        assert_eq!(lexer.read_token().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_bool_retag_respects_flag() {
        assert_eq!(single("yes").value, Some(Value::Bool(true)));
        assert_eq!(single("NO").value, Some(Value::Bool(false)));
        assert_eq!(single("yeS").kind, TokenKind::Word);
        let tokens = lex_all_with("true", LexerFlags::NO_BOOLS);
        assert_eq!(tokens[0].kind, TokenKind::Word);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: LexerConfig =
            serde_json::from_str(r#"{"name": "app.conf", "flags": 17}"#).unwrap();
        assert_eq!(config.name, "app.conf");
        assert_eq!(config.flags, LexerFlags::NO_REGEXPS | LexerFlags::NO_FLOATS);
        assert_eq!(config.precision, DEFAULT_PRECISION);
    }

    #[test]
    fn test_numbers_off_bit_alone_disables_integers() {
        // Only the switch bit, without the per-family bits
        let flags: LexerFlags = serde_json::from_str("64").unwrap();
        assert!(!flags.contains(LexerFlags::NO_NUMBERS));
        let tokens = lex_all_with("7 0x1f 1.5", flags);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::Whitespace,
                TokenKind::Word,
                TokenKind::Whitespace,
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );

        // Every family bit without the switch still lexes plain integers
        let families = LexerFlags::NO_NUMBERS - LexerFlags::NUMBERS_OFF;
        let tokens = lex_all_with("7", families);
        assert_eq!(tokens[0].kind, TokenKind::Integer);
    }

    #[test]
    fn test_named_locations() {
        let config = LexerConfig::default().with_name("test.codf");
        let mut lexer = Lexer::with_config(&b"word"[..], config);
        let token = lexer.read_token().unwrap();
        assert_eq!(&*token.start.name, "test.codf");
        assert_eq!(token.start.to_string(), "test.codf:1:1");
        assert_eq!(token.end.column, 5);
    }
}
