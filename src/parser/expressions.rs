//! Expression parsing.
//!
//! Precedence, high to low: primary; indexing/property; `^` (right-assoc,
//! unary allowed on the right); unary `- + ! typeof`; `* / %`; `+ -`;
//! chained comparisons; `&&`; `||`.

use crate::lexer::token::{Keyword, Literal, Op, Punct, Token, TokenKind};
use crate::syntax::expressions::{
    Argument, BinaryOp, CallExpr, CompareOp, Expression, Lit, UnaryOp,
};
use crate::syntax::types::TypeSpec;

use super::{ParseResult, Parser};

impl Parser<'_> {
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_and()?;
        while self.peek().is_op(Op::OrOr) {
            let line = self.line();
            self.advance();
            let right = self.parse_and()?;
            left = Expression::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_comparison()?;
        while self.peek().is_op(Op::AndAnd) {
            let line = self.line();
            self.advance();
            let right = self.parse_comparison()?;
            left = Expression::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    /// `a < b <= c` builds one chained node; every middle operand is
    /// evaluated once at run time.
    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let first = self.parse_additive()?;
        let mut ops = Vec::new();
        let mut operands = vec![first];
        let line = self.line();
        while let Some(op) = compare_op(self.peek()) {
            self.advance();
            ops.push(op);
            operands.push(self.parse_additive()?);
        }
        if ops.is_empty() {
            Ok(operands.pop().unwrap_or(Expression::Literal {
                value: Lit::Null,
                line,
            }))
        } else {
            Ok(Expression::Chained {
                operands,
                ops,
                line,
            })
        }
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.peek().is_op(Op::Plus) {
                BinaryOp::Add
            } else if self.peek().is_op(Op::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let line = self.line();
            self.advance();
            let right = self.parse_term()?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.peek().is_op(Op::Star) {
                BinaryOp::Mul
            } else if self.peek().is_op(Op::Slash) {
                BinaryOp::Div
            } else if self.peek().is_op(Op::Percent) {
                BinaryOp::Rem
            } else {
                break;
            };
            let line = self.line();
            self.advance();
            let right = self.parse_unary()?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                line,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let line = self.line();
        let op = if self.peek().is_op(Op::Minus) {
            Some(UnaryOp::Neg)
        } else if self.peek().is_op(Op::Plus) {
            Some(UnaryOp::Plus)
        } else if self.peek().is_op(Op::Not) {
            Some(UnaryOp::Not)
        } else if self.peek().is_keyword(Keyword::Typeof) {
            Some(UnaryOp::TypeOf)
        } else {
            None
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::Unary {
                op,
                operand: Box::new(operand),
                line,
            });
        }
        self.parse_power()
    }

    /// `^` binds tighter than unary on the left and is right-associative;
    /// the right-hand side may itself carry a unary sign (`a ^ -b`).
    fn parse_power(&mut self) -> ParseResult<Expression> {
        let base = self.parse_postfix()?;
        if self.peek().is_op(Op::Caret) {
            let line = self.line();
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expression::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
                line,
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.peek().is_punct(Punct::LBracket) {
                let line = self.line();
                self.advance();
                let mut indices = Vec::new();
                loop {
                    indices.push(self.parse_expression()?);
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punct::RBracket)?;
                expr = Expression::Index {
                    base: Box::new(expr),
                    indices,
                    line,
                };
            } else if self.peek().is_punct(Punct::Dot) {
                let line = self.line();
                self.advance();
                // The field may itself lex dotted (`.f.g`).
                let name = self.expect_identifier("field name")?;
                for field in name.split('.') {
                    expr = Expression::Property {
                        base: Box::new(expr),
                        field: field.to_string(),
                        line,
                    };
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let line = self.line();
        match self.peek().kind.clone() {
            TokenKind::Literal(lit) => {
                self.advance();
                Ok(Expression::Literal {
                    value: lit_of(lit),
                    line,
                })
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                Ok(inner)
            }
            // `#ns.name(args)` — forced builtin call, bypassing the block
            // table; the same syntax works embedded in JSON slices.
            TokenKind::Op(Op::Hash) => {
                self.advance();
                let name = self.expect_identifier("builtin name")?;
                let args = self.parse_call_arguments()?;
                let mut call = CallExpr::new(name, args, line);
                call.forced_builtin = true;
                Ok(Expression::Call(call))
            }
            TokenKind::Punct(Punct::LBrace) => {
                let (raw, offset) = self.slice_balanced()?;
                Ok(Expression::JsonLiteral { raw, offset, line })
            }
            TokenKind::Punct(Punct::LBracket) => {
                self.advance();
                let mut elements = Vec::new();
                if !self.peek().is_punct(Punct::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.eat_punct(Punct::Comma) {
                            break;
                        }
                    }
                }
                self.expect_punct(Punct::RBracket)?;
                Ok(Expression::ArrayLiteral { elements, line })
            }
            TokenKind::Keyword(Keyword::Select) => {
                let raw = self.slice_select()?;
                Ok(Expression::SqlSelect { raw, line })
            }
            TokenKind::TypeKeyword(tk) => {
                // `long(x)`, `string(x)`, `date(x)` … — primitive casts.
                use crate::lexer::token::TypeKeyword as TK;
                use crate::syntax::types::DataType as D;
                let target = match tk {
                    TK::Byte => Some(D::Byte),
                    TK::Int | TK::Integer => Some(D::Integer),
                    TK::Long => Some(D::Long),
                    TK::Float => Some(D::Float),
                    TK::Double => Some(D::Double),
                    TK::String => Some(D::String),
                    TK::Bool | TK::Boolean => Some(D::Boolean),
                    TK::Date => Some(D::Date),
                    TK::Json => Some(D::Json),
                    _ => None,
                };
                match target {
                    Some(tag) if self.peek_at(1).is_punct(Punct::LParen) => {
                        self.advance();
                        self.advance();
                        let value = self.parse_expression()?;
                        self.expect_punct(Punct::RParen)?;
                        Ok(Expression::Cast {
                            ty: TypeSpec::Data(tag),
                            value: Box::new(value),
                            line,
                        })
                    }
                    _ => Err(self.unexpected("expression")),
                }
            }
            TokenKind::Identifier => self.parse_identifier_expression(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_identifier_expression(&mut self) -> ParseResult<Expression> {
        let line = self.line();
        let name = self.expect_identifier("expression")?;
        let segments: Vec<String> = name.split('.').map(str::to_string).collect();
        let first = segments[0].as_str();

        // `array.T[dims]` / `queue.T` allocations. Only when the tail
        // names a type — `array.sort(a)` is a builtin call, not a type.
        if segments.len() > 1
            && (first == "array" || first == "queue")
            && (crate::lexer::token::lookup_type_keyword(&segments[1]).is_some()
                || self.types.contains(&segments[1]))
        {
            let spec = self.type_from_segments(&segments, line)?;
            return Ok(match &spec {
                TypeSpec::Queue(_) => Expression::QueueAlloc {
                    spec: Box::new(spec),
                    line,
                },
                _ => Expression::ArrayAlloc {
                    spec: Box::new(spec),
                    line,
                },
            });
        }

        // `Alias { field: value, … }` — record literal with unquoted keys.
        if segments.len() == 1
            && self.types.contains(&name)
            && self.peek().is_punct(Punct::LBrace)
        {
            let (raw, offset) = self.slice_balanced()?;
            return Ok(Expression::RecordLiteral {
                alias: name,
                raw,
                offset,
                line,
            });
        }

        if self.peek().is_punct(Punct::LParen) {
            // Alias cast beats a call of the same name.
            if segments.len() == 1 && self.types.contains(&name) {
                self.advance();
                let value = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                return Ok(Expression::Cast {
                    ty: TypeSpec::Alias(name),
                    value: Box::new(value),
                    line,
                });
            }
            // `length(e)` / `size(e)`.
            if segments.len() == 1 && (name == "length" || name == "size") {
                self.advance();
                let value = self.parse_expression()?;
                self.expect_punct(Punct::RParen)?;
                return Ok(Expression::Length {
                    value: Box::new(value),
                    line,
                });
            }
            // Cursor iteration methods.
            if segments.len() == 2 && self.cursors.contains(&segments[0]) {
                let cursor = segments[0].clone();
                match segments[1].as_str() {
                    "hasNext" => {
                        self.advance();
                        self.expect_punct(Punct::RParen)?;
                        return Ok(Expression::CursorHasNext { cursor, line });
                    }
                    "next" => {
                        self.advance();
                        self.expect_punct(Punct::RParen)?;
                        return Ok(Expression::CursorNext { cursor, line });
                    }
                    _ => {}
                }
            }
            let args = self.parse_call_arguments()?;
            return Ok(Expression::Call(CallExpr::new(name, args, line)));
        }

        Ok(Expression::Variable {
            path: segments,
            line,
        })
    }

    /// `( arg, … )` where each arg is positional or `name = expr`.
    pub(crate) fn parse_call_arguments(&mut self) -> ParseResult<Vec<Argument>> {
        self.expect_punct(Punct::LParen)?;
        let mut args = Vec::new();
        if !self.peek().is_punct(Punct::RParen) {
            loop {
                if self.peek().kind == TokenKind::Identifier
                    && self.peek_at(1).is_op(Op::Assign)
                {
                    let name = self.expect_identifier("parameter name")?;
                    self.advance();
                    let value = self.parse_expression()?;
                    args.push(Argument::Named { name, value });
                } else {
                    args.push(Argument::Positional(self.parse_expression()?));
                }
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok(args)
    }

    /// Capture a balanced `{…}` / `[…]` region verbatim from the source.
    /// Matching runs over the token stream, so braces inside string
    /// literals cannot confuse it. Returns the raw slice and its byte
    /// offset for inner error reporting.
    pub(crate) fn slice_balanced(&mut self) -> ParseResult<(String, usize)> {
        let open_line = self.line();
        let first = self.peek().clone();
        let start = first.span.start;
        let mut end = first.span.end;
        let mut stack: Vec<Punct> = Vec::new();
        loop {
            if self.at_eof() {
                return Err(super::ParseError::new(
                    open_line,
                    "unbalanced braces in literal",
                ));
            }
            let tok = self.advance();
            end = tok.span.end;
            match tok.kind {
                TokenKind::Punct(p @ (Punct::LBrace | Punct::LBracket)) => stack.push(p),
                TokenKind::Punct(Punct::RBrace) => {
                    if stack.pop() != Some(Punct::LBrace) {
                        return Err(super::ParseError::new(open_line, "mismatched '}'"));
                    }
                }
                TokenKind::Punct(Punct::RBracket) => {
                    if stack.pop() != Some(Punct::LBracket) {
                        return Err(super::ParseError::new(open_line, "mismatched ']'"));
                    }
                }
                _ => {}
            }
            if stack.is_empty() {
                break;
            }
        }
        Ok((self.src.text()[start..end].to_string(), start))
    }

    /// Capture `select …` verbatim up to (not including) the terminating
    /// semicolon.
    pub(crate) fn slice_select(&mut self) -> ParseResult<String> {
        let first = self.expect_keyword(Keyword::Select)?;
        let start = first.span.start;
        let mut end = first.span.end;
        while !self.peek().is_punct(Punct::Semicolon) {
            if self.at_eof() {
                return Err(super::ParseError::new(
                    first.line,
                    "expected ';' after select",
                ));
            }
            let tok = self.advance();
            end = tok.span.end;
        }
        Ok(self.src.text()[start..end].to_string())
    }
}

fn compare_op(tok: &Token) -> Option<CompareOp> {
    Some(match tok.kind {
        TokenKind::Op(Op::Eq) => CompareOp::Eq,
        TokenKind::Op(Op::Ne) => CompareOp::Ne,
        TokenKind::Op(Op::Lt) => CompareOp::Lt,
        TokenKind::Op(Op::Le) => CompareOp::Le,
        TokenKind::Op(Op::Gt) => CompareOp::Gt,
        TokenKind::Op(Op::Ge) => CompareOp::Ge,
        _ => return None,
    })
}

fn lit_of(lit: Literal) -> Lit {
    match lit {
        Literal::Int(v) => Lit::Int(v),
        Literal::Long(v) => Lit::Long(v),
        Literal::Float(v) => Lit::Float(v),
        Literal::Double(v) => Lit::Double(v),
        Literal::Str(s) => Lit::Str(s),
        Literal::Date(d, t) => Lit::Date(d, t),
        Literal::Bool(b) => Lit::Bool(b),
        Literal::Null => Lit::Null,
    }
}
