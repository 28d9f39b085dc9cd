//! Decoding of stored `parameters` / `metadata` text.
//!
//! Values are persisted as text. Newer rows hold JSON; older rows hold the
//! Python `repr` of a dict (`{'root': '/data', 'options': None}`). Both are
//! decoded here with a plain data grammar; nothing is ever evaluated. The
//! result must be a mapping.

use serde_json::{Number, Value};
use thiserror::Error;

use super::models::Mapping;

/// Deepest container nesting accepted, the same bound `serde_json` applies.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LiteralError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("expected a mapping, found {0}")]
    NotMapping(&'static str),
}

/// Decode stored text into a mapping. Empty text is an empty mapping.
pub fn parse_mapping(text: &str) -> Result<Mapping, LiteralError> {
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => parse_literal(text)?,
    };
    match value {
        Value::Object(map) => Ok(map),
        other => Err(LiteralError::NotMapping(kind_name(&other))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Parse a restricted Python literal: dicts, lists, tuples, strings, numbers,
/// `None`, `True` and `False`.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser { src: text.as_bytes(), pos: 0, depth: 0 };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError::Syntax { offset: self.pos, message: message.into() }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.nested(Self::dict),
            Some(b'[') => self.nested(|p| p.sequence(b'[', b']')),
            Some(b'(') => self.nested(|p| p.sequence(b'(', b')')),
            Some(b'\'' | b'"') => self.string().map(Value::String),
            Some(b'u' | b'b') if matches!(self.src.get(self.pos + 1), Some(b'\'' | b'"')) => {
                self.pos += 1;
                self.string().map(Value::String)
            }
            Some(b'-' | b'+' | b'0'..=b'9' | b'.') => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.word(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Result<Value, LiteralError>) -> Result<Value, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn dict(&mut self) -> Result<Value, LiteralError> {
        self.pos += 1;
        let mut map = Mapping::new();
        loop {
            if self.eat(b'}') {
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => if b { "True".into() } else { "False".into() },
                Value::Null => "None".into(),
                _ => return Err(self.error("unhashable mapping key")),
            };
            if !self.eat(b':') {
                return Err(self.error("expected ':'"));
            }
            let value = self.value()?;
            map.insert(key, value);
            if !self.eat(b',') {
                if self.eat(b'}') {
                    return Ok(Value::Object(map));
                }
                return Err(self.error("expected ',' or '}'"));
            }
        }
    }

    fn sequence(&mut self, open: u8, close: u8) -> Result<Value, LiteralError> {
        debug_assert_eq!(self.peek(), Some(open));
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            if !self.eat(b',') {
                if self.eat(close) {
                    return Ok(Value::Array(items));
                }
                return Err(self.error("expected ',' or closing bracket"));
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.src[self.pos];
        self.pos += 1;
        let mut out: Vec<u8> = Vec::new();
        loop {
            let c = self.peek().ok_or_else(|| self.error("unterminated string"))?;
            self.pos += 1;
            match c {
                c if c == quote => break,
                b'\\' => {
                    let esc = self.peek().ok_or_else(|| self.error("unterminated escape"))?;
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'0' => out.push(0),
                        b'\\' | b'\'' | b'"' => out.push(esc),
                        b'u' | b'x' => {
                            let width = if esc == b'u' { 4 } else { 2 };
                            let digits = self
                                .src
                                .get(self.pos..self.pos + width)
                                .and_then(|d| std::str::from_utf8(d).ok())
                                .ok_or_else(|| self.error("truncated escape"))?;
                            let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("bad escape"))?;
                            let ch = char::from_u32(code).ok_or_else(|| self.error("bad code point"))?;
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                            self.pos += width;
                        }
                        other => {
                            out.push(b'\\');
                            out.push(other);
                        }
                    }
                }
                other => out.push(other),
            }
        }
        String::from_utf8(out).map_err(|_| self.error("invalid utf-8 in string"))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'-' | b'+' | b'.' | b'e' | b'E' | b'0'..=b'9')) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).map_err(|_| self.error("bad number"))?;
        // Python 2 long suffix
        if matches!(self.peek(), Some(b'L' | b'l')) {
            self.pos += 1;
        }
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError::Syntax { offset: start, message: format!("bad number '{}'", text) })
    }

    fn word(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.pos += 1;
        }
        match &self.src[start..self.pos] {
            b"None" | b"null" => Ok(Value::Null),
            b"True" | b"true" => Ok(Value::Bool(true)),
            b"False" | b"false" => Ok(Value::Bool(false)),
            _ => Err(LiteralError::Syntax { offset: start, message: "names are not allowed".into() }),
        }
    }
}
