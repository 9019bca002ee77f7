//! Best-effort recovery of JSON from language-model output.
//!
//! Recovery runs in three passes, each tried only if the previous one failed:
//! a direct parse, a parse of the first bracketed span that is valid JSON
//! (dropping prose around it), and a recursive-descent parse that tolerates the input ending
//! early. Truncation is handled by keeping the complete leading elements of
//! the outermost array; an element that was cut off is dropped whole, never
//! patched up.

use serde_json::{Map, Value};

use super::Notice;

const MAX_DEPTH: usize = 128;

/// Why recovery gave up. Carried into `AnalysisParse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairError(pub String);

pub fn recover_json(raw: &str) -> Result<(Value, Vec<Notice>), RepairError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok((value, Vec::new()));
    }

    // Walk bracket starts left to right. A closed span that parses wins; a
    // closed span that does not is prose (e.g. "[3 total]") and is stepped
    // over. An unterminated start swallows the rest of the input, so it is
    // the truncation candidate.
    let mut cursor = 0;
    let mut first_closed: Option<(usize, usize)> = None;
    let mut unterminated: Option<usize> = None;
    while let Some(offset) = trimmed[cursor..].find(['[', '{']) {
        let start = cursor + offset;
        match matching_close(trimmed, start) {
            Some(end) => {
                if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    let mut notices = Vec::new();
                    if start > 0 || end + 1 < trimmed.len() {
                        notices.push(Notice::ProseStripped);
                    }
                    return Ok((value, notices));
                }
                first_closed.get_or_insert((start, end));
                cursor = end + 1;
            }
            None => {
                unterminated = Some(start);
                break;
            }
        }
    }

    let (start, candidate) = match (unterminated, first_closed) {
        (Some(start), _) => (start, &trimmed[start..]),
        (None, Some((start, end))) => (start, &trimmed[start..=end]),
        (None, None) => {
            return Err(RepairError("no JSON array or object in response".to_string()));
        }
    };

    let mut notices = Vec::new();
    if start > 0 || start + candidate.len() < trimmed.len() {
        notices.push(Notice::ProseStripped);
    }

    let mut parser = Parser::new(candidate);
    match parser.parse_value(0) {
        Ok(Parsed::Complete(value)) => Ok((value, notices)),
        Ok(Parsed::Cut(Some(Value::Array(kept)))) if !kept.is_empty() => {
            notices.push(Notice::TruncatedResponse { kept: kept.len() });
            Ok((Value::Array(kept), notices))
        }
        Ok(Parsed::Cut(Some(Value::Array(_)))) => Err(RepairError(
            "response was cut off before the first complete element".to_string(),
        )),
        Ok(Parsed::Cut(_)) => Err(RepairError(
            "response was cut off inside the top-level object".to_string(),
        )),
        Err(e) => Err(RepairError(format!(
            "syntax error at character {}: {}",
            e.position, e.message
        ))),
    }
}

/// Byte index of the bracket closing the one at `open`, skipping string
/// contents. `None` if the input ends first or the brackets do not nest.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[open..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ']' | '}' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// A parsed value, or the salvageable prefix of one the input cut short.
#[derive(Debug, PartialEq)]
enum Parsed {
    Complete(Value),
    /// Containers keep their complete children; scalars keep nothing.
    Cut(Option<Value>),
}

#[derive(Debug)]
struct SyntaxError {
    position: usize,
    message: String,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, SyntaxError> {
        Err(SyntaxError {
            position: self.pos,
            message: message.into(),
        })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Parsed, SyntaxError> {
        if depth > MAX_DEPTH {
            return self.error("nesting too deep");
        }
        self.skip_whitespace();
        match self.peek() {
            None => Ok(Parsed::Cut(None)),
            Some('[') => self.parse_array(depth),
            Some('{') => self.parse_object(depth),
            Some('"') => Ok(match self.parse_string()? {
                Some(s) => Parsed::Complete(Value::String(s)),
                None => Parsed::Cut(None),
            }),
            Some('t') => self.parse_literal("true", Value::Bool(true)),
            Some('f') => self.parse_literal("false", Value::Bool(false)),
            Some('n') => self.parse_literal("null", Value::Null),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) => self.error(format!("unexpected character {c:?}")),
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<Parsed, SyntaxError> {
        self.pos += 1;
        let mut items = Vec::new();

        self.skip_whitespace();
        match self.peek() {
            None => return Ok(Parsed::Cut(Some(Value::Array(items)))),
            Some(']') => {
                self.pos += 1;
                return Ok(Parsed::Complete(Value::Array(items)));
            }
            _ => {}
        }

        loop {
            match self.parse_value(depth + 1)? {
                Parsed::Complete(value) => items.push(value),
                Parsed::Cut(_) => return Ok(Parsed::Cut(Some(Value::Array(items)))),
            }

            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Parsed::Cut(Some(Value::Array(items)))),
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    return Ok(Parsed::Complete(Value::Array(items)));
                }
                Some(c) => return self.error(format!("expected ',' or ']' but found {c:?}")),
            }
        }
    }

    fn parse_object(&mut self, depth: usize) -> Result<Parsed, SyntaxError> {
        self.pos += 1;
        let mut members = Map::new();

        self.skip_whitespace();
        match self.peek() {
            None => return Ok(Parsed::Cut(Some(Value::Object(members)))),
            Some('}') => {
                self.pos += 1;
                return Ok(Parsed::Complete(Value::Object(members)));
            }
            _ => {}
        }

        loop {
            self.skip_whitespace();
            let key = match self.peek() {
                None => return Ok(Parsed::Cut(Some(Value::Object(members)))),
                Some('"') => match self.parse_string()? {
                    Some(key) => key,
                    None => return Ok(Parsed::Cut(Some(Value::Object(members)))),
                },
                Some(c) => return self.error(format!("expected object key but found {c:?}")),
            };

            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Parsed::Cut(Some(Value::Object(members)))),
                Some(':') => self.pos += 1,
                Some(c) => return self.error(format!("expected ':' but found {c:?}")),
            }

            match self.parse_value(depth + 1)? {
                Parsed::Complete(value) => {
                    members.insert(key, value);
                }
                Parsed::Cut(_) => return Ok(Parsed::Cut(Some(Value::Object(members)))),
            }

            self.skip_whitespace();
            match self.peek() {
                None => return Ok(Parsed::Cut(Some(Value::Object(members)))),
                Some(',') => self.pos += 1,
                Some('}') => {
                    self.pos += 1;
                    return Ok(Parsed::Complete(Value::Object(members)));
                }
                Some(c) => return self.error(format!("expected ',' or '}}' but found {c:?}")),
            }
        }
    }

    /// `None` when the input ends inside the string. Raw control characters
    /// are accepted; models emit literal newlines inside strings often enough.
    fn parse_string(&mut self) -> Result<Option<String>, SyntaxError> {
        self.pos += 1;
        let mut out = String::new();

        loop {
            let Some(c) = self.peek() else {
                return Ok(None);
            };
            self.pos += 1;
            match c {
                '"' => return Ok(Some(out)),
                '\\' => {
                    let Some(escape) = self.peek() else {
                        return Ok(None);
                    };
                    self.pos += 1;
                    match escape {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => match self.parse_unicode_escape()? {
                            Some(ch) => out.push(ch),
                            None => return Ok(None),
                        },
                        other => return self.error(format!("invalid escape \\{other}")),
                    }
                }
                _ => out.push(c),
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> Result<Option<char>, SyntaxError> {
        let Some(high) = self.parse_hex4()? else {
            return Ok(None);
        };
        if !(0xD800..0xDC00).contains(&high) {
            return match char::from_u32(high) {
                Some(ch) => Ok(Some(ch)),
                None => self.error("invalid unicode escape"),
            };
        }

        match (self.peek(), self.chars.get(self.pos + 1).copied()) {
            (None, _) | (Some('\\'), None) => return Ok(None),
            (Some('\\'), Some('u')) => self.pos += 2,
            _ => return self.error("unpaired surrogate in unicode escape"),
        }
        let Some(low) = self.parse_hex4()? else {
            return Ok(None);
        };
        if !(0xDC00..0xE000).contains(&low) {
            return self.error("unpaired surrogate in unicode escape");
        }
        let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        match char::from_u32(combined) {
            Some(ch) => Ok(Some(ch)),
            None => self.error("invalid unicode escape"),
        }
    }

    fn parse_hex4(&mut self) -> Result<Option<u32>, SyntaxError> {
        let mut value = 0;
        for _ in 0..4 {
            let Some(c) = self.peek() else {
                return Ok(None);
            };
            let Some(digit) = c.to_digit(16) else {
                return self.error(format!("invalid hex digit {c:?}"));
            };
            value = value * 16 + digit;
            self.pos += 1;
        }
        Ok(Some(value))
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> Result<Parsed, SyntaxError> {
        for expected in word.chars() {
            match self.peek() {
                None => return Ok(Parsed::Cut(None)),
                Some(c) if c == expected => self.pos += 1,
                Some(c) => return self.error(format!("unexpected character {c:?} in {word}")),
            }
        }
        Ok(Parsed::Complete(value))
    }

    /// A number running into the end of input is treated as cut off, since
    /// more digits may have followed.
    fn parse_number(&mut self) -> Result<Parsed, SyntaxError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        if self.peek().is_none() {
            return Ok(Parsed::Cut(None));
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        match serde_json::from_str::<serde_json::Number>(&text) {
            Ok(number) => Ok(Parsed::Complete(Value::Number(number))),
            Err(_) => {
                self.pos = start;
                self.error(format!("invalid number {text:?}"))
            }
        }
    }
}
