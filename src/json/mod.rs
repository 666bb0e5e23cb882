//! JSON reader.
//!
//! Parses raw source slices into the runtime JSON tree. Three extensions on
//! top of the standard grammar:
//!
//! 1. An optional lowercase-keys mode, used for screen specs.
//! 2. Embedded `#ns.name(args)` builtin calls found outside quoted strings
//!    (and with balanced parentheses) are evaluated before parsing begins;
//!    the scanner here finds them, the interpreter drives the substitution
//!    loop (bounded at 16 rounds).
//! 3. Errors carry the byte offset into the slice so the host can point at
//!    the right spot inside the original source.
//!
//! Two relaxations match what the surface language feeds the reader:
//! object keys may be unquoted identifiers (record literals) and strings
//! may use single quotes.

use indexmap::IndexMap;
use thiserror::Error;

use crate::interp::value::JsonValue;

/// Substitution rounds allowed for nested `#builtin` pre-evaluation.
pub const MAX_PREEVAL_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("json error at offset {offset}: {message}")]
pub struct JsonError {
    pub offset: usize,
    pub message: String,
}

impl JsonError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        JsonError {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOptions {
    /// Fold object keys to lowercase (screen specs).
    pub lowercase_keys: bool,
}

/// Parse a complete JSON document; trailing non-whitespace is an error.
pub fn parse(text: &str, options: JsonOptions) -> Result<JsonValue, JsonError> {
    let mut reader = Reader {
        bytes: text.as_bytes(),
        text,
        pos: 0,
        options,
    };
    reader.skip_ws();
    let value = reader.parse_value()?;
    reader.skip_ws();
    if reader.pos != reader.bytes.len() {
        return Err(JsonError::new(reader.pos, "unexpected trailing input"));
    }
    Ok(value)
}

/// Byte range of the first `#ns.name(args)` builtin call found outside
/// quoted strings, with balanced parentheses. `None` when the slice has no
/// embedded calls left.
pub fn find_embedded_call(text: &str) -> Option<std::ops::Range<usize>> {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'#' => {
                    if let Some(range) = match_call(bytes, i) {
                        return Some(range);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn match_call(bytes: &[u8], start: usize) -> Option<std::ops::Range<usize>> {
    let mut i = start + 1;
    let mut saw_name = false;
    while i < bytes.len()
        && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
    {
        saw_name = true;
        i += 1;
    }
    if !saw_name || i >= bytes.len() || bytes[i] != b'(' {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(start..i + 1);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

struct Reader<'a> {
    bytes: &'a [u8],
    text: &'a str,
    pos: usize,
    options: JsonOptions,
}

impl Reader<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len()
            && matches!(self.bytes[self.pos], b' ' | b'\t' | b'\r' | b'\n')
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn parse_value(&mut self) -> Result<JsonValue, JsonError> {
        match self.peek() {
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') | Some(b'\'') => Ok(JsonValue::Str(self.parse_string()?)),
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.parse_word_value(),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.parse_number(),
            Some(_) => Err(JsonError::new(self.pos, "unexpected character")),
            None => Err(JsonError::new(self.pos, "unexpected end of input")),
        }
    }

    /// `true`/`false`/`null`, or a type tag in front of an object (nested
    /// record literals: `at: pos { x: 0 }`) — the tag itself is dropped.
    fn parse_word_value(&mut self) -> Result<JsonValue, JsonError> {
        let start = self.pos;
        let word = self.parse_bare_key();
        match word.as_str() {
            "true" => Ok(JsonValue::Bool(true)),
            "false" => Ok(JsonValue::Bool(false)),
            "null" => Ok(JsonValue::Null),
            _ => {
                self.skip_ws();
                if self.peek() == Some(b'{') {
                    self.parse_object()
                } else {
                    Err(JsonError::new(start, format!("unexpected word '{word}'")))
                }
            }
        }
    }

    fn parse_object(&mut self) -> Result<JsonValue, JsonError> {
        self.pos += 1;
        let mut map = IndexMap::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(JsonValue::Obj(map));
        }
        loop {
            self.skip_ws();
            let mut key = match self.peek() {
                Some(b'"') | Some(b'\'') => self.parse_string()?,
                Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.parse_bare_key(),
                _ => return Err(JsonError::new(self.pos, "expected object key")),
            };
            if self.options.lowercase_keys {
                key = key.to_lowercase();
            }
            self.skip_ws();
            if self.peek() != Some(b':') {
                return Err(JsonError::new(self.pos, "expected ':' after key"));
            }
            self.pos += 1;
            self.skip_ws();
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(JsonValue::Obj(map));
                }
                _ => return Err(JsonError::new(self.pos, "expected ',' or '}'")),
            }
        }
    }

    fn parse_array(&mut self) -> Result<JsonValue, JsonError> {
        self.pos += 1;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(JsonValue::Seq(items));
        }
        loop {
            self.skip_ws();
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b']') => {
                    self.pos += 1;
                    return Ok(JsonValue::Seq(items));
                }
                _ => return Err(JsonError::new(self.pos, "expected ',' or ']'")),
            }
        }
    }

    fn parse_bare_key(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        self.text[start..self.pos].to_string()
    }

    fn parse_string(&mut self) -> Result<String, JsonError> {
        let quote = self.bytes[self.pos];
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(JsonError::new(start, "unterminated string")),
                Some(b) if b == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let esc = self
                        .peek()
                        .ok_or_else(|| JsonError::new(self.pos, "dangling escape"))?;
                    self.pos += 1;
                    match esc {
                        b'"' => out.push('"'),
                        b'\'' => out.push('\''),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{0008}'),
                        b'f' => out.push('\u{000C}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            if self.pos + 4 > self.bytes.len() {
                                return Err(JsonError::new(self.pos, "truncated \\u escape"));
                            }
                            let hex = &self.text[self.pos..self.pos + 4];
                            let code = u32::from_str_radix(hex, 16).map_err(|_| {
                                JsonError::new(self.pos, "invalid \\u escape")
                            })?;
                            self.pos += 4;
                            out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                        }
                        _ => return Err(JsonError::new(self.pos - 1, "unknown escape")),
                    }
                }
                Some(b) if b < 128 => {
                    out.push(b as char);
                    self.pos += 1;
                }
                Some(_) => {
                    let ch = self.text[self.pos..].chars().next().unwrap_or('\u{FFFD}');
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn parse_number(&mut self) -> Result<JsonValue, JsonError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut fractional = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' | b'+' | b'-' => {
                    fractional = fractional || b == b'.' || b == b'e' || b == b'E';
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text = &self.text[start..self.pos];
        if fractional {
            text.parse::<f64>()
                .map(JsonValue::Double)
                .map_err(|_| JsonError::new(start, format!("malformed number '{text}'")))
        } else {
            text.parse::<i64>()
                .map(JsonValue::Int)
                .map_err(|_| JsonError::new(start, format!("malformed number '{text}'")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_objects_in_order() {
        let v = parse(r#"{"a":1, "b":[true, null], "c":"x"}"#, JsonOptions::default()).unwrap();
        let JsonValue::Obj(map) = &v else {
            panic!("expected object")
        };
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(v.stringify(), r#"{"a":1, "b":[true, null], "c":"x"}"#);
    }

    #[test]
    fn unquoted_keys_and_single_quotes() {
        let v = parse(r#"{name: 'rook', at: {x: 0, y: 7}}"#, JsonOptions::default()).unwrap();
        let JsonValue::Obj(map) = &v else {
            panic!("expected object")
        };
        assert_eq!(map["name"], JsonValue::Str("rook".into()));
        let JsonValue::Obj(at) = &map["at"] else {
            panic!("expected nested object")
        };
        assert_eq!(at["y"], JsonValue::Int(7));
    }

    #[test]
    fn lowercase_key_mode() {
        let v = parse(
            r#"{"Title": "t", "Fields": []}"#,
            JsonOptions {
                lowercase_keys: true,
            },
        )
        .unwrap();
        let JsonValue::Obj(map) = &v else {
            panic!("expected object")
        };
        assert!(map.contains_key("title"));
        assert!(map.contains_key("fields"));
    }

    #[test]
    fn errors_carry_offsets() {
        let err = parse(r#"{"a" 1}"#, JsonOptions::default()).unwrap_err();
        assert_eq!(err.offset, 5);
        let err = parse("[1, 2", JsonOptions::default()).unwrap_err();
        assert!(err.message.contains("',' or ']'"));
    }

    #[test]
    fn finds_embedded_calls_outside_strings() {
        let text = r##"{"a": #date.now(), "b": "#not.a.call()"}"##;
        let range = find_embedded_call(text).unwrap();
        assert_eq!(&text[range], "#date.now()");
        assert!(find_embedded_call(r##"{"b": "#x.y()"}"##).is_none());
        let nested = r#"{"n": #math.max(1, #math.min(2, 3))}"#;
        let range = find_embedded_call(nested).unwrap();
        assert_eq!(&nested[range], "#math.max(1, #math.min(2, 3))");
    }

    #[test]
    fn reader_terminates_on_garbage() {
        for garbage in ["", "{", "[", "{\"a\":}", "tru", "-", "\"", "{]}"] {
            let _ = parse(garbage, JsonOptions::default());
        }
    }
}
