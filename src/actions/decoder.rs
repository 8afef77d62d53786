//! Safe decoder for model-generated action calls.
//!
//! Model output is untrusted text. The decoder extracts the last
//! `do(...)`/`finish(...)` call and parses its arguments with a
//! recursive-descent parser that accepts literals only: strings, numbers
//! (with unary sign), booleans, null, lists, and string-keyed maps.
//! Identifier references, calls, attribute access, or any other expression
//! form are rejected outright — nothing in the input is ever evaluated.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::command::Command;

/// Decoder errors. None of these are retryable at this layer; the step
/// loop decides whether to re-prompt the model.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("no do() or finish() call found in model output")]
    NoMarker,
    #[error("unbalanced delimiters in action call")]
    UnbalancedDelimiter,
    #[error("unterminated string literal in action call")]
    UnterminatedString,
    #[error("unsafe expression rejected: {0}")]
    UnsafeExpression(String),
    #[error("invalid action syntax: {0}")]
    InvalidSyntax(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MarkerKind {
    Do,
    Finish,
}

/// Decode one model output block into a [`Command`].
///
/// The LAST `do(`/`finish(` occurrence wins, so free-form reasoning the
/// model emits before the call is skipped. Decoding is pure: the same
/// input always yields the same result and has no side effects.
pub fn decode(text: &str) -> Result<Command, DecodeError> {
    let text = text.trim();
    let (kind, args_start) = find_last_marker(text).ok_or(DecodeError::NoMarker)?;
    let args_end = find_matching_close(text, args_start)?;
    let params = ArgParser::new(&text[args_start..args_end]).parse_args()?;

    match kind {
        MarkerKind::Do => {
            let mut params = params;
            let action = match params.remove("action") {
                Some(Value::String(s)) => Some(s),
                Some(other) => {
                    return Err(DecodeError::InvalidArgument(format!(
                        "action name must be a string, got {other}"
                    )))
                }
                None => None,
            };
            Ok(Command::Do { action, params })
        }
        MarkerKind::Finish => {
            let message = match params.get("message") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => {
                    return Err(DecodeError::InvalidArgument(format!(
                        "finish message must be a string, got {other}"
                    )))
                }
                None => None,
            };
            Ok(Command::Finish { message })
        }
    }
}

/// Find the last top-level `do(` or `finish(` marker. Returns the kind and
/// the index just past the opening parenthesis. A marker only matches when
/// preceded by a non-identifier character (so `redo(` is not a `do(`), and
/// only outside the argument list of an earlier call, so a marker embedded
/// in a string argument (`text="finish(x)"`) is never selected.
fn find_last_marker(text: &str) -> Option<(MarkerKind, usize)> {
    const MARKERS: [(&str, MarkerKind); 2] =
        [("do(", MarkerKind::Do), ("finish(", MarkerKind::Finish)];

    let bytes = text.as_bytes();
    let mut best: Option<(MarkerKind, usize)> = None;
    let mut i = 0;

    while i < bytes.len() {
        let hit = MARKERS
            .iter()
            .find(|(marker, _)| bytes[i..].starts_with(marker.as_bytes()));
        let Some((marker, kind)) = hit else {
            i += 1;
            continue;
        };

        let bounded = i == 0
            || text[..i]
                .chars()
                .next_back()
                .map(|c| !c.is_alphanumeric() && c != '_')
                .unwrap_or(true);
        if !bounded {
            i += 1;
            continue;
        }

        let args_start = i + marker.len();
        best = Some((*kind, args_start));
        // Skip the argument list (string-aware) so in-string markers are
        // never candidates; if the list never closes, rescan from inside
        // it so a later call can still win.
        i = match find_matching_close(text, args_start) {
            Ok(close) => close + 1,
            Err(_) => args_start,
        };
    }

    best
}

/// Scan forward from just past the opening parenthesis to its matching
/// close. Parenthesis depth is only counted outside string literals, so
/// brackets embedded in strings never perturb the match.
fn find_matching_close(text: &str, args_start: usize) -> Result<usize, DecodeError> {
    let mut depth = 1usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[args_start..].char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(args_start + offset);
                }
            }
            _ => {}
        }
    }

    if in_string.is_some() {
        Err(DecodeError::UnterminatedString)
    } else {
        Err(DecodeError::UnbalancedDelimiter)
    }
}

/// Recursive-descent parser for the `name=literal, ...` argument list.
struct ArgParser {
    chars: Vec<char>,
    pos: usize,
}

impl ArgParser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn parse_args(mut self) -> Result<Map<String, Value>, DecodeError> {
        let mut params = Map::new();
        self.skip_ws();

        while self.peek().is_some() {
            let name = self.parse_ident()?;
            self.skip_ws();
            self.expect('=')?;
            self.skip_ws();
            let value = self.parse_value()?;

            if params.insert(name.clone(), value).is_some() {
                return Err(DecodeError::InvalidSyntax(format!(
                    "duplicate argument `{name}`"
                )));
            }

            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => {
                    self.bump();
                    self.skip_ws();
                }
                Some(c) => {
                    return Err(DecodeError::InvalidSyntax(format!(
                        "expected `,` between arguments, found `{c}`"
                    )))
                }
            }
        }

        Ok(params)
    }

    /// Parse a literal and reject expression-forming postfixes (`.`, `(`).
    fn parse_value(&mut self) -> Result<Value, DecodeError> {
        let value = self.parse_literal()?;
        self.skip_ws();
        match self.peek() {
            Some('.') => Err(DecodeError::UnsafeExpression(
                "attribute access on a literal".to_string(),
            )),
            Some('(') => Err(DecodeError::UnsafeExpression(
                "call expression".to_string(),
            )),
            _ => Ok(value),
        }
    }

    fn parse_literal(&mut self) -> Result<Value, DecodeError> {
        match self.peek() {
            Some('"') | Some('\'') => self.parse_string().map(Value::String),
            Some('[') => self.parse_list(),
            Some('{') => self.parse_map(),
            Some(c) if c.is_ascii_digit() || c == '+' || c == '-' || c == '.' => {
                self.parse_number()
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let word = self.parse_ident()?;
                match word.as_str() {
                    "true" | "True" => Ok(Value::Bool(true)),
                    "false" | "False" => Ok(Value::Bool(false)),
                    "null" | "None" => Ok(Value::Null),
                    _ => {
                        self.skip_ws();
                        if self.peek() == Some('(') {
                            Err(DecodeError::UnsafeExpression(format!(
                                "call to `{word}`"
                            )))
                        } else {
                            Err(DecodeError::UnsafeExpression(format!(
                                "identifier reference `{word}`"
                            )))
                        }
                    }
                }
            }
            Some(c) => Err(DecodeError::InvalidSyntax(format!(
                "unexpected character `{c}`"
            ))),
            None => Err(DecodeError::InvalidSyntax(
                "unexpected end of arguments".to_string(),
            )),
        }
    }

    fn parse_string(&mut self) -> Result<String, DecodeError> {
        let quote = self.bump().ok_or(DecodeError::UnterminatedString)?;
        let mut out = String::new();

        while let Some(c) = self.bump() {
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            match self.bump() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some('u') => {
                    let mut code = 0u32;
                    for _ in 0..4 {
                        let digit = self
                            .bump()
                            .and_then(|d| d.to_digit(16))
                            .ok_or(DecodeError::UnterminatedString)?;
                        code = code * 16 + digit;
                    }
                    out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                }
                // Unknown escape: keep it verbatim, the way Python does.
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(DecodeError::UnterminatedString),
            }
        }

        Err(DecodeError::UnterminatedString)
    }

    fn parse_number(&mut self) -> Result<Value, DecodeError> {
        let mut raw = String::new();

        if matches!(self.peek(), Some('+') | Some('-')) {
            // serde_json rejects a leading '+'; only keep '-'.
            if self.bump() == Some('-') {
                raw.push('-');
            }
            self.skip_ws();
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => raw.push(c),
                '.' | 'e' | 'E' => {
                    is_float = true;
                    raw.push(c);
                }
                '+' | '-' if raw.ends_with(['e', 'E']) => raw.push(c),
                _ => break,
            }
            self.bump();
        }

        if raw.is_empty() || raw == "-" {
            return Err(DecodeError::InvalidSyntax("malformed number".to_string()));
        }

        if !is_float {
            if let Ok(n) = raw.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        let f: f64 = raw
            .parse()
            .map_err(|_| DecodeError::InvalidSyntax(format!("malformed number `{raw}`")))?;
        Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| DecodeError::InvalidSyntax(format!("non-finite number `{raw}`")))
    }

    fn parse_list(&mut self) -> Result<Value, DecodeError> {
        self.expect('[')?;
        let mut items = Vec::new();
        self.skip_ws();

        loop {
            match self.peek() {
                Some(']') => {
                    self.bump();
                    return Ok(Value::Array(items));
                }
                None => return Err(DecodeError::UnbalancedDelimiter),
                _ => {
                    items.push(self.parse_value()?);
                    self.skip_ws();
                    match self.peek() {
                        Some(',') => {
                            self.bump();
                            self.skip_ws();
                        }
                        Some(']') => {}
                        Some(c) => {
                            return Err(DecodeError::InvalidSyntax(format!(
                                "expected `,` or `]` in list, found `{c}`"
                            )))
                        }
                        None => return Err(DecodeError::UnbalancedDelimiter),
                    }
                }
            }
        }
    }

    fn parse_map(&mut self) -> Result<Value, DecodeError> {
        self.expect('{')?;
        let mut map = Map::new();
        self.skip_ws();

        loop {
            match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(Value::Object(map));
                }
                Some('"') | Some('\'') => {
                    let key = self.parse_string()?;
                    self.skip_ws();
                    self.expect(':')?;
                    self.skip_ws();
                    let value = self.parse_value()?;
                    map.insert(key, value);
                    self.skip_ws();
                    match self.peek() {
                        Some(',') => {
                            self.bump();
                            self.skip_ws();
                        }
                        Some('}') => {}
                        Some(c) => {
                            return Err(DecodeError::InvalidSyntax(format!(
                                "expected `,` or `}}` in map, found `{c}`"
                            )))
                        }
                        None => return Err(DecodeError::UnbalancedDelimiter),
                    }
                }
                Some(c) => {
                    return Err(DecodeError::InvalidSyntax(format!(
                        "mapping keys must be string literals, found `{c}`"
                    )))
                }
                None => return Err(DecodeError::UnbalancedDelimiter),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String, DecodeError> {
        let mut ident = String::new();
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            Some(c) => {
                return Err(DecodeError::InvalidSyntax(format!(
                    "expected argument name, found `{c}`"
                )))
            }
            None => {
                return Err(DecodeError::InvalidSyntax(
                    "expected argument name".to_string(),
                ))
            }
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Ok(ident)
    }

    fn expect(&mut self, expected: char) -> Result<(), DecodeError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(DecodeError::InvalidSyntax(format!(
                "expected `{expected}`, found `{c}`"
            ))),
            None => Err(DecodeError::InvalidSyntax(format!(
                "expected `{expected}`, found end of arguments"
            ))),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }
}
