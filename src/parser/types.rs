//! Type syntax:
//!
//! ```text
//! type := primitive | "record" "{" field ("," field)* "}"
//!       | "bitmap" "{" bitField ("," bitField)* "}"
//!       | "intmap" "{" bitField ("," bitField)* "}"
//!       | "array" "." elementType ("[" (expr|"*") ("," (expr|"*"))* "]")?
//!       | "queue" "." elementType | "sorted" "map" | aliasName
//! bitField := ident ":" int ("-" int)?
//! ```
//!
//! Because the lexer folds dots into identifiers, `array.integer` usually
//! arrives as one dotted identifier; both that and the spaced-out
//! keyword-dot form are accepted.

use crate::lexer::token::{Literal, Op, Punct, TokenKind, TypeKeyword};
use crate::syntax::types::{ArrayDim, BitField, PackedType, RecordField, RecordType, TypeSpec};

use super::{ParseResult, Parser};

impl Parser<'_> {
    pub(crate) fn parse_type(&mut self) -> ParseResult<TypeSpec> {
        match self.peek().kind.clone() {
            TokenKind::TypeKeyword(tk) => {
                self.advance();
                self.type_from_keyword(tk)
            }
            TokenKind::Identifier => {
                let line = self.line();
                let name = self.expect_identifier("type name")?;
                if name.contains('.') {
                    let segments: Vec<String> =
                        name.split('.').map(str::to_string).collect();
                    self.type_from_segments(&segments, line)
                } else if self.types.contains(&name) {
                    Ok(TypeSpec::Alias(name))
                } else {
                    Err(super::ParseError::new(line, format!("unknown type '{name}'")))
                }
            }
            _ => Err(self.unexpected("type")),
        }
    }

    fn type_from_keyword(&mut self, tk: TypeKeyword) -> ParseResult<TypeSpec> {
        use crate::syntax::types::DataType as D;
        Ok(match tk {
            TypeKeyword::Byte => TypeSpec::Data(D::Byte),
            TypeKeyword::Int | TypeKeyword::Integer => TypeSpec::Data(D::Integer),
            TypeKeyword::Long => TypeSpec::Data(D::Long),
            TypeKeyword::Float => TypeSpec::Data(D::Float),
            TypeKeyword::Double => TypeSpec::Data(D::Double),
            TypeKeyword::String => TypeSpec::Data(D::String),
            TypeKeyword::Bool | TypeKeyword::Boolean => TypeSpec::Data(D::Boolean),
            TypeKeyword::Date => TypeSpec::Data(D::Date),
            TypeKeyword::Json => TypeSpec::Data(D::Json),
            TypeKeyword::Map => TypeSpec::Data(D::Map),
            TypeKeyword::Image => TypeSpec::Data(D::Image),
            TypeKeyword::Sorted => {
                if !matches!(self.peek().kind, TokenKind::TypeKeyword(TypeKeyword::Map)) {
                    return Err(self.unexpected("'map' after 'sorted'"));
                }
                self.advance();
                TypeSpec::SortedMap
            }
            TypeKeyword::Record => TypeSpec::Record(self.parse_record_body()?),
            TypeKeyword::Bitmap => TypeSpec::Bitmap(self.parse_packed_body(7)?),
            TypeKeyword::Intmap => TypeSpec::Intmap(self.parse_packed_body(31)?),
            TypeKeyword::Array => {
                // Spaced form: `array . elem [dims]`.
                self.expect_punct(Punct::Dot)?;
                let elem = self.parse_type()?;
                let dims = self.parse_array_dims()?;
                TypeSpec::Array {
                    elem: Box::new(elem),
                    dims,
                }
            }
            TypeKeyword::Queue => {
                self.expect_punct(Punct::Dot)?;
                let elem = self.parse_type()?;
                TypeSpec::Queue(Box::new(elem))
            }
        })
    }

    /// Type from the segments of a dotted identifier (`array.integer`,
    /// `queue.byte`, `array.record`, `array.array.integer`, …).
    pub(crate) fn type_from_segments(
        &mut self,
        segments: &[String],
        line: u32,
    ) -> ParseResult<TypeSpec> {
        let first = segments[0].as_str();
        if segments.len() == 1 {
            return match crate::lexer::token::lookup_type_keyword(first) {
                Some(TypeKeyword::Array) | Some(TypeKeyword::Queue) => {
                    Err(super::ParseError::new(
                        line,
                        format!("'{first}' needs an element type"),
                    ))
                }
                Some(tk) => self.type_from_keyword(tk),
                None if self.types.contains(first) => Ok(TypeSpec::Alias(first.to_string())),
                None => Err(super::ParseError::new(
                    line,
                    format!("unknown type '{first}'"),
                )),
            };
        }
        match first {
            "array" => {
                let elem = self.type_from_segments(&segments[1..], line)?;
                let dims = self.parse_array_dims()?;
                Ok(TypeSpec::Array {
                    elem: Box::new(elem),
                    dims,
                })
            }
            "queue" => {
                let elem = self.type_from_segments(&segments[1..], line)?;
                Ok(TypeSpec::Queue(Box::new(elem)))
            }
            other => Err(super::ParseError::new(
                line,
                format!("unknown type '{other}'"),
            )),
        }
    }

    /// `{ name: type, … }`
    pub(crate) fn parse_record_body(&mut self) -> ParseResult<RecordType> {
        self.expect_punct(Punct::LBrace)?;
        let mut fields = Vec::new();
        loop {
            let name = self.expect_name("field name")?;
            self.expect_punct(Punct::Colon)?;
            let ty = self.parse_type()?;
            if fields.iter().any(|f: &RecordField| f.name == name) {
                return Err(self.error(format!("duplicate field '{name}'")));
            }
            fields.push(RecordField { name, ty });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(RecordType { fields })
    }

    /// `{ name: start ("-" end)?, … }` — validated against the backing
    /// width; overlapping ranges are rejected here.
    pub(crate) fn parse_packed_body(&mut self, max_bit: u8) -> ParseResult<PackedType> {
        let line = self.line();
        self.expect_punct(Punct::LBrace)?;
        let mut fields = Vec::new();
        loop {
            let name = self.expect_name("bit field name")?;
            self.expect_punct(Punct::Colon)?;
            let start_bit = self.expect_bit_index()?;
            let end_bit = if self.eat_op(Op::Minus) {
                self.expect_bit_index()?
            } else {
                start_bit
            };
            fields.push(BitField {
                name,
                start_bit,
                end_bit,
            });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)?;
        let packed = PackedType { fields, max_bit };
        packed
            .validate()
            .map_err(|msg| super::ParseError::new(line, msg))?;
        Ok(packed)
    }

    fn expect_bit_index(&mut self) -> ParseResult<u8> {
        match &self.peek().kind {
            TokenKind::Literal(Literal::Int(v)) if (0..=31).contains(v) => {
                let bit = *v as u8;
                self.advance();
                Ok(bit)
            }
            _ => Err(self.unexpected("bit index")),
        }
    }

    /// Optional `[dim, …]` suffix; `*` marks a dynamic dimension.
    pub(crate) fn parse_array_dims(&mut self) -> ParseResult<Vec<ArrayDim>> {
        if !self.eat_punct(Punct::LBracket) {
            return Ok(Vec::new());
        }
        let mut dims = Vec::new();
        loop {
            if self.eat_op(Op::Star) {
                dims.push(ArrayDim::Dynamic);
            } else {
                dims.push(ArrayDim::Fixed(self.parse_expression()?));
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBracket)?;
        Ok(dims)
    }
}
