//! Path expression parser
//!
//! Recursive descent over the `$`-rooted JSONPath subset:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `$` | the starting node |
//! | `.name` / `['name']` | object property |
//! | `[n]` / `.[n]` | array position (negative from the end) |
//! | `.*` / `[*]` | every child |
//! | `[start:stop:step]` | slice |
//! | `['a','b']` / `[0,2]` | union |
//! | `..name` / `..*` / `..[n]` | recursive descent |

use super::ast::{JsonPath, Selector};
use crate::error::{Error, Result};

/// Turns expression text into a compiled [`JsonPath`]
pub trait PathParser {
    fn parse(&self, text: &str) -> Result<JsonPath>;
}

/// The bundled parser
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardParser;

impl PathParser for StandardParser {
    fn parse(&self, text: &str) -> Result<JsonPath> {
        Parser::new(text).parse()
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Parser { text, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.text.as_bytes().get(self.pos + offset).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(Error::syntax(self.pos, format!("expected '{}'", byte as char)))
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<JsonPath> {
        self.skip_whitespace();
        self.expect(b'$')?;

        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(b'.') if self.peek_at(1) == Some(b'.') => {
                    self.pos += 2;
                    let inner = self.parse_member()?;
                    selectors.push(Selector::Descendant(Box::new(inner)));
                }
                Some(b'.') => {
                    self.pos += 1;
                    selectors.push(self.parse_member()?);
                }
                Some(b'[') => selectors.push(self.parse_bracket()?),
                Some(other) => {
                    return Err(Error::syntax(
                        self.pos,
                        format!("unexpected character '{}'", other as char),
                    ))
                }
            }
        }

        Ok(JsonPath::from_selectors(selectors))
    }

    /// What may follow `.` or `..`: a name, `*`, or a bracket
    fn parse_member(&mut self) -> Result<Selector> {
        match self.peek() {
            Some(b'*') => {
                self.pos += 1;
                Ok(Selector::Wildcard)
            }
            Some(b'[') => self.parse_bracket(),
            _ => self.parse_name().map(Selector::Child),
        }
    }

    fn parse_name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'.' | b'[' | b']' | b' ' | b'\t') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Error::syntax(start, "expected a property name"));
        }
        Ok(self.text[start..self.pos].to_string())
    }

    fn parse_bracket(&mut self) -> Result<Selector> {
        let open = self.pos;
        self.expect(b'[')?;
        self.skip_whitespace();

        if self.eat(b'*') {
            self.skip_whitespace();
            self.expect(b']')?;
            return Ok(Selector::Wildcard);
        }

        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            items.push(self.parse_bracket_item()?);
            self.skip_whitespace();
            if self.eat(b',') {
                continue;
            }
            self.expect(b']')?;
            break;
        }

        if items.len() == 1 {
            return Ok(items.remove(0));
        }
        if items.iter().any(|item| matches!(item, Selector::Slice { .. })) {
            return Err(Error::syntax(open, "slices cannot appear in a union"));
        }
        Ok(Selector::Union(items))
    }

    fn parse_bracket_item(&mut self) -> Result<Selector> {
        match self.peek() {
            Some(quote @ (b'\'' | b'"')) => self.parse_quoted(quote).map(Selector::Child),
            _ => self.parse_index_or_slice(),
        }
    }

    fn parse_quoted(&mut self, quote: u8) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut name = String::new();
        loop {
            let rest = &self.text[self.pos..];
            let Some(c) = rest.chars().next() else {
                return Err(Error::syntax(start, "unterminated string"));
            };
            self.pos += c.len_utf8();
            if c == quote as char {
                return Ok(name);
            }
            if c == '\\' {
                let Some(escaped) = self.text[self.pos..].chars().next() else {
                    return Err(Error::syntax(start, "unterminated string"));
                };
                self.pos += escaped.len_utf8();
                name.push(escaped);
            } else {
                name.push(c);
            }
        }
    }

    fn parse_index_or_slice(&mut self) -> Result<Selector> {
        let start = self.parse_optional_int()?;
        self.skip_whitespace();
        if !self.eat(b':') {
            return start
                .map(Selector::Index)
                .ok_or_else(|| Error::syntax(self.pos, "expected an index, name or slice"));
        }

        self.skip_whitespace();
        let stop = self.parse_optional_int()?;
        self.skip_whitespace();
        let step = if self.eat(b':') {
            self.skip_whitespace();
            self.parse_optional_int()?
        } else {
            None
        };

        if step == Some(0) {
            return Err(Error::syntax(self.pos, "slice step cannot be zero"));
        }
        Ok(Selector::Slice { start, stop, step })
    }

    fn parse_optional_int(&mut self) -> Result<Option<i64>> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let digits = &self.text[start..self.pos];
        if digits.is_empty() {
            return Ok(None);
        }
        digits
            .parse::<i64>()
            .map(Some)
            .map_err(|_| Error::syntax(start, format!("invalid integer '{}'", digits)))
    }
}
