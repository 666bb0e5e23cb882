//! Single-pass scanner.
//!
//! The lexer walks the source once with one character of lookahead. The
//! first character of every token is classified through a 128-entry dispatch
//! table; two-character operators go through a second-character check.
//! Illegal input is recorded in an error collection and scanning continues,
//! so the parser can still report column-accurate messages on a best-effort
//! token stream.

pub mod token;

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::source::{ByteRange, SourceBuffer};
use token::{
    Keyword, Literal, Op, Punct, Token, TokenKind, lookup_keyword, lookup_type_keyword,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: u32 },
    #[error("line {line}: unterminated block comment")]
    UnterminatedComment { line: u32 },
    #[error("line {line}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, line: u32 },
    #[error("line {line}: malformed number '{text}'")]
    BadNumber { text: String, line: u32 },
}

impl LexError {
    pub fn line(&self) -> u32 {
        match self {
            LexError::UnterminatedString { line }
            | LexError::UnterminatedComment { line }
            | LexError::UnexpectedChar { line, .. }
            | LexError::BadNumber { line, .. } => *line,
        }
    }
}

/// First-character classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Whitespace,
    Letter,
    Digit,
    Quote,
    OpStart,
    Punct(Punct),
    Illegal,
}

const fn build_dispatch() -> [CharClass; 128] {
    let mut table = [CharClass::Illegal; 128];
    let mut i = 0usize;
    while i < 128 {
        let b = i as u8;
        table[i] = match b {
            b' ' | b'\t' | b'\r' | b'\n' => CharClass::Whitespace,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => CharClass::Letter,
            b'0'..=b'9' => CharClass::Digit,
            b'\'' | b'"' => CharClass::Quote,
            b'+' | b'-' | b'*' | b'/' | b'%' | b'^' | b'=' | b'!' | b'<' | b'>' | b'&'
            | b'|' | b'#' => CharClass::OpStart,
            b'(' => CharClass::Punct(Punct::LParen),
            b')' => CharClass::Punct(Punct::RParen),
            b'{' => CharClass::Punct(Punct::LBrace),
            b'}' => CharClass::Punct(Punct::RBrace),
            b'[' => CharClass::Punct(Punct::LBracket),
            b']' => CharClass::Punct(Punct::RBracket),
            b',' => CharClass::Punct(Punct::Comma),
            b';' => CharClass::Punct(Punct::Semicolon),
            b':' => CharClass::Punct(Punct::Colon),
            b'.' => CharClass::Punct(Punct::Dot),
            _ => CharClass::Illegal,
        };
        i += 1;
    }
    table
}

static DISPATCH: [CharClass; 128] = build_dispatch();

#[inline]
fn classify(b: u8) -> CharClass {
    if b < 128 {
        DISPATCH[b as usize]
    } else {
        // Non-ASCII bytes are only legal inside string literals.
        CharClass::Illegal
    }
}

#[inline]
fn is_ident_continue(b: u8) -> bool {
    matches!(classify(b), CharClass::Letter | CharClass::Digit)
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    emit_comments: bool,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(buffer: &'a SourceBuffer) -> Self {
        Lexer {
            src: buffer.text(),
            bytes: buffer.text().as_bytes(),
            pos: 0,
            line: 1,
            emit_comments: false,
            errors: Vec::new(),
        }
    }

    /// Emit `//` and `/* */` comments as tokens instead of skipping them.
    pub fn with_comments(mut self) -> Self {
        self.emit_comments = true;
        self
    }

    /// Scan the whole buffer. Always ends with an EOF token; collected
    /// errors come back alongside the best-effort stream.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = Vec::new();
        while let Some(tok) = self.next_token() {
            tokens.push(tok);
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: ByteRange::new(self.src.len(), self.src.len()),
            line: self.line,
        });
        (tokens, self.errors)
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    #[inline]
    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            let start = self.pos;
            let line = self.line;
            let b = self.peek()?;
            match classify(b) {
                CharClass::Whitespace => {
                    self.bump();
                }
                CharClass::Letter => return Some(self.scan_word(start, line)),
                CharClass::Digit => return Some(self.scan_number(start, line)),
                CharClass::Quote => return Some(self.scan_quoted(start, line)),
                CharClass::Punct(p) => {
                    self.bump();
                    return Some(Token {
                        kind: TokenKind::Punct(p),
                        span: ByteRange::new(start, self.pos),
                        line,
                    });
                }
                CharClass::OpStart => {
                    if b == b'/' && matches!(self.peek_at(1), Some(b'/')) {
                        if let Some(tok) = self.scan_line_comment(start, line) {
                            return Some(tok);
                        }
                    } else if b == b'/' && matches!(self.peek_at(1), Some(b'*')) {
                        if let Some(tok) = self.scan_block_comment(start, line) {
                            return Some(tok);
                        }
                    } else {
                        return Some(self.scan_operator(start, line));
                    }
                }
                CharClass::Illegal => {
                    self.bump();
                    let ch = self.src[start..]
                        .chars()
                        .next()
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    // Multi-byte scalars were only half-consumed by bump.
                    self.pos = start + ch.len_utf8();
                    self.errors.push(LexError::UnexpectedChar { ch, line });
                }
            }
        }
    }

    /// Identifier, keyword, type name or word literal. Dotted identifiers
    /// (`ns.name`, `rec.field.sub`) are one token; the parser splits them.
    fn scan_word(&mut self, start: usize, line: u32) -> Token {
        self.bump();
        let mut dotted = false;
        loop {
            match self.peek() {
                Some(b) if is_ident_continue(b) => {
                    self.bump();
                }
                Some(b'.') if self.peek_at(1).map(classify) == Some(CharClass::Letter) => {
                    dotted = true;
                    self.bump();
                    self.bump();
                }
                _ => break,
            }
        }
        let span = ByteRange::new(start, self.pos);
        let word = span.slice(self.src);
        let kind = if dotted {
            TokenKind::Identifier
        } else if word == "true" {
            TokenKind::Literal(Literal::Bool(true))
        } else if word == "false" {
            TokenKind::Literal(Literal::Bool(false))
        } else if word == "null" {
            TokenKind::Literal(Literal::Null)
        } else if let Some(kw) = lookup_keyword(word) {
            TokenKind::Keyword(kw)
        } else if let Some(ty) = lookup_type_keyword(word) {
            TokenKind::TypeKeyword(ty)
        } else {
            TokenKind::Identifier
        };
        Token { kind, span, line }
    }

    /// Numeric literal with suffix-aware typing: a decimal point or exponent
    /// yields Double unless an `f` suffix is present; plain integers become
    /// Integer unless the value exceeds 32-bit signed, then Long.
    fn scan_number(&mut self, start: usize, line: u32) -> Token {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        let mut fractional = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            fractional = true;
            self.bump();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E'))
            && matches!(
                (self.peek_at(1), self.peek_at(2)),
                (Some(b'0'..=b'9'), _) | (Some(b'+' | b'-'), Some(b'0'..=b'9'))
            )
        {
            fractional = true;
            self.bump();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.bump();
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        let digits_end = self.pos;
        let suffix = match self.peek() {
            Some(s @ (b'f' | b'F' | b'd' | b'D' | b'l' | b'L'))
                if !matches!(self.peek_at(1), Some(b) if is_ident_continue(b)) =>
            {
                self.bump();
                Some(s.to_ascii_lowercase())
            }
            _ => None,
        };
        let span = ByteRange::new(start, self.pos);
        let text = &self.src[start..digits_end];
        let literal = match (suffix, fractional) {
            (Some(b'f'), _) => text.parse::<f32>().ok().map(Literal::Float),
            (Some(b'd'), _) | (None, true) => text.parse::<f64>().ok().map(Literal::Double),
            (Some(b'l'), false) => text.parse::<i64>().ok().map(Literal::Long),
            (Some(b'l'), true) => None,
            (None, false) => text.parse::<i64>().ok().map(|v| {
                if let Ok(small) = i32::try_from(v) {
                    Literal::Int(small)
                } else {
                    Literal::Long(v)
                }
            }),
            _ => None,
        };
        let kind = match literal {
            Some(lit) => TokenKind::Literal(lit),
            None => {
                self.errors.push(LexError::BadNumber {
                    text: span.slice(self.src).to_string(),
                    line,
                });
                TokenKind::Literal(Literal::Int(0))
            }
        };
        Token { kind, span, line }
    }

    /// Quoted literal. Content matching the strict date grammar
    /// (`YYYY-MM-DD` with optional ` HH:MM[:SS]`) becomes a Date token.
    fn scan_quoted(&mut self, start: usize, line: u32) -> Token {
        let quote = self.bump().unwrap_or(b'"');
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    self.errors.push(LexError::UnterminatedString { line });
                    break;
                }
                Some(b) if b == quote => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    let esc = self.bump();
                    value.push(match esc {
                        Some(b'n') => '\n',
                        Some(b't') => '\t',
                        Some(b'r') => '\r',
                        Some(b'\\') => '\\',
                        Some(b'\'') => '\'',
                        Some(b'"') => '"',
                        Some(b'0') => '\0',
                        Some(other) => other as char,
                        None => break,
                    });
                }
                Some(b) if b < 128 => {
                    self.bump();
                    value.push(b as char);
                }
                Some(_) => {
                    // Multi-byte UTF-8 scalar; copy it whole.
                    let ch = self.src[self.pos..].chars().next().unwrap_or('\u{FFFD}');
                    self.pos += ch.len_utf8();
                    value.push(ch);
                }
            }
        }
        let span = ByteRange::new(start, self.pos);
        let kind = match parse_date_literal(&value) {
            Some((date, time)) => TokenKind::Literal(Literal::Date(date, time)),
            None => TokenKind::Literal(Literal::Str(value)),
        };
        Token { kind, span, line }
    }

    fn scan_line_comment(&mut self, start: usize, line: u32) -> Option<Token> {
        while !matches!(self.peek(), None | Some(b'\n')) {
            self.bump();
        }
        self.emit_comments.then(|| Token {
            kind: TokenKind::Comment,
            span: ByteRange::new(start, self.pos),
            line,
        })
    }

    /// `/* … */` with nesting; an unterminated comment is an error.
    fn scan_block_comment(&mut self, start: usize, line: u32) -> Option<Token> {
        self.bump();
        self.bump();
        let mut depth = 1u32;
        loop {
            match self.peek() {
                None => {
                    self.errors.push(LexError::UnterminatedComment { line });
                    break;
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    depth += 1;
                    self.bump();
                    self.bump();
                }
                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                    self.bump();
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
        self.emit_comments.then(|| Token {
            kind: TokenKind::Comment,
            span: ByteRange::new(start, self.pos),
            line,
        })
    }

    fn scan_operator(&mut self, start: usize, line: u32) -> Token {
        let first = self.bump().unwrap_or(0);
        let second = self.peek();
        let two = |lexer: &mut Lexer<'a>, op: Op| {
            lexer.bump();
            op
        };
        let op = match (first, second) {
            (b'+', Some(b'+')) => two(self, Op::PlusPlus),
            (b'+', Some(b'=')) => two(self, Op::PlusAssign),
            (b'+', _) => Op::Plus,
            (b'-', Some(b'-')) => two(self, Op::MinusMinus),
            (b'-', Some(b'=')) => two(self, Op::MinusAssign),
            (b'-', _) => Op::Minus,
            (b'*', Some(b'=')) => two(self, Op::StarAssign),
            (b'*', _) => Op::Star,
            (b'/', Some(b'=')) => two(self, Op::SlashAssign),
            (b'/', _) => Op::Slash,
            (b'%', _) => Op::Percent,
            (b'^', _) => Op::Caret,
            (b'=', Some(b'=')) => two(self, Op::Eq),
            (b'=', _) => Op::Assign,
            (b'!', Some(b'=')) => two(self, Op::Ne),
            (b'!', _) => Op::Not,
            (b'<', Some(b'=')) => two(self, Op::Le),
            (b'<', _) => Op::Lt,
            (b'>', Some(b'=')) => two(self, Op::Ge),
            (b'>', _) => Op::Gt,
            (b'&', Some(b'&')) => two(self, Op::AndAnd),
            (b'|', Some(b'|')) => two(self, Op::OrOr),
            (b'#', _) => Op::Hash,
            (other, _) => {
                self.errors.push(LexError::UnexpectedChar {
                    ch: other as char,
                    line,
                });
                Op::Plus
            }
        };
        Token {
            kind: TokenKind::Op(op),
            span: ByteRange::new(start, self.pos),
            line,
        }
    }
}

/// Strict date grammar used inside quotes: `YYYY-MM-DD` optionally followed
/// by ` HH:MM` or ` HH:MM:SS`. Anything else stays a string.
pub fn parse_date_literal(text: &str) -> Option<(NaiveDate, Option<NaiveTime>)> {
    let bytes = text.as_bytes();
    if bytes.len() != 10 && bytes.len() != 16 && bytes.len() != 19 {
        return None;
    }
    let digits_at = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    if !(digits_at(0..4) && bytes[4] == b'-' && digits_at(5..7) && bytes[7] == b'-' && digits_at(8..10))
    {
        return None;
    }
    let num = |range: std::ops::Range<usize>| text[range].parse::<u32>().ok();
    let date = NaiveDate::from_ymd_opt(num(0..4)? as i32, num(5..7)?, num(8..10)?)?;
    if bytes.len() == 10 {
        return Some((date, None));
    }
    if bytes[10] != b' ' || !digits_at(11..13) || bytes[13] != b':' || !digits_at(14..16) {
        return None;
    }
    let (hour, min) = (num(11..13)?, num(14..16)?);
    let sec = if bytes.len() == 19 {
        if bytes[16] != b':' || !digits_at(17..19) {
            return None;
        }
        num(17..19)?
    } else {
        0
    };
    let time = NaiveTime::from_hms_opt(hour, min, sec)?;
    Some((date, Some(time)))
}

#[cfg(test)]
mod tests {
    use super::token::*;
    use super::*;

    fn lex(src: &str) -> (Vec<Token>, Vec<LexError>) {
        let buf = SourceBuffer::new(src);
        Lexer::new(&buf).tokenize()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, errors) = lex(src);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_declaration() {
        let ks = kinds("var i: integer = 5;");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Identifier,
                TokenKind::Punct(Punct::Colon),
                TokenKind::TypeKeyword(TypeKeyword::Integer),
                TokenKind::Op(Op::Assign),
                TokenKind::Literal(Literal::Int(5)),
                TokenKind::Punct(Punct::Semicolon),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn dotted_identifier_is_one_token() {
        let (tokens, _) = lex("string.upper(name)");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text("string.upper(name)"), "string.upper");
    }

    #[test]
    fn numeric_suffix_inference() {
        assert_eq!(kinds("42")[0], TokenKind::Literal(Literal::Int(42)));
        assert_eq!(
            kinds("4200000000")[0],
            TokenKind::Literal(Literal::Long(4_200_000_000))
        );
        assert_eq!(kinds("7l")[0], TokenKind::Literal(Literal::Long(7)));
        assert_eq!(kinds("1.5")[0], TokenKind::Literal(Literal::Double(1.5)));
        assert_eq!(kinds("1.5f")[0], TokenKind::Literal(Literal::Float(1.5)));
        assert_eq!(kinds("2d")[0], TokenKind::Literal(Literal::Double(2.0)));
        assert_eq!(kinds("1e3")[0], TokenKind::Literal(Literal::Double(1000.0)));
    }

    #[test]
    fn date_inside_quotes() {
        let ks = kinds("'2024-03-01'");
        match &ks[0] {
            TokenKind::Literal(Literal::Date(d, None)) => {
                assert_eq!(d.to_string(), "2024-03-01");
            }
            other => panic!("expected date, got {other:?}"),
        }
        let ks = kinds("'2024-03-01 10:30:15'");
        assert!(matches!(
            &ks[0],
            TokenKind::Literal(Literal::Date(_, Some(_)))
        ));
        // Near-miss stays a string.
        assert!(matches!(
            &kinds("'2024-13-01'")[0],
            TokenKind::Literal(Literal::Str(_))
        ));
    }

    #[test]
    fn two_char_operators() {
        let ks = kinds("a += 1; b == c; d != e; f <= g; h && i || !j");
        assert!(ks.contains(&TokenKind::Op(Op::PlusAssign)));
        assert!(ks.contains(&TokenKind::Op(Op::Eq)));
        assert!(ks.contains(&TokenKind::Op(Op::Ne)));
        assert!(ks.contains(&TokenKind::Op(Op::Le)));
        assert!(ks.contains(&TokenKind::Op(Op::AndAnd)));
        assert!(ks.contains(&TokenKind::Op(Op::OrOr)));
        assert!(ks.contains(&TokenKind::Op(Op::Not)));
    }

    #[test]
    fn comments_skipped_and_balanced() {
        let ks = kinds("1 // trailing\n/* a /* nested */ b */ 2");
        assert_eq!(
            ks,
            vec![
                TokenKind::Literal(Literal::Int(1)),
                TokenKind::Literal(Literal::Int(2)),
                TokenKind::Eof,
            ]
        );
        let (_, errors) = lex("/* open");
        assert!(matches!(errors[0], LexError::UnterminatedComment { .. }));
    }

    #[test]
    fn errors_do_not_abort() {
        let (tokens, errors) = lex("var a = 1 @ var b = 2;");
        assert_eq!(errors.len(), 1);
        // Both declarations still lex around the bad character.
        let idents = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .count();
        assert_eq!(idents, 2);
    }

    #[test]
    fn lexing_is_deterministic() {
        let src = "var x: long = 9; print x + 1;";
        assert_eq!(lex(src).0, lex(src).0);
    }

    #[test]
    fn token_slices_reproduce_the_input() {
        let src = "var x: integer = 5;\nwhile (x > 0) { x--; } // tail\n";
        let (tokens, errors) = lex(src);
        assert!(errors.is_empty());
        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        let joined: String = tokens
            .iter()
            .filter(|t| !t.is_eof())
            .map(|t| t.text(src))
            .collect();
        assert_eq!(strip(&joined), strip("var x: integer = 5; while (x > 0) { x--; }"));
    }
}
