//! Statement parsing.

use crate::lexer::token::{Keyword, Literal, Op, Punct, TokenKind};
use crate::syntax::expressions::{BinaryOp, CallExpr, Expression, Lit};
use crate::syntax::statements::{BlockStatement, Handler, ParamDecl, Statement};
use crate::syntax::types::TypeAlias;

use super::{ParseResult, Parser};

impl Parser<'_> {
    pub(crate) fn parse_statement(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        match self.peek().kind.clone() {
            TokenKind::Keyword(Keyword::Var) => {
                self.advance();
                self.parse_var_decl(false, line)
            }
            TokenKind::Keyword(Keyword::Const) => {
                self.advance();
                self.parse_var_decl(true, line)
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Foreach) => self.parse_foreach(),
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(super::ParseError::new(line, "'break' outside a loop"));
                }
                self.expect_semicolon()?;
                Ok(Statement::Break { line })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(super::ParseError::new(line, "'continue' outside a loop"));
                }
                self.expect_semicolon()?;
                Ok(Statement::Continue { line })
            }
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::Raise) => self.parse_raise(),
            TokenKind::Keyword(Keyword::Call) => {
                self.advance();
                let name = self.expect_identifier("block or builtin name")?;
                let args = self.parse_call_arguments()?;
                self.expect_semicolon()?;
                Ok(Statement::Call(CallExpr::new(name, args, line)))
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                if self.fn_depth == 0 {
                    return Err(super::ParseError::new(line, "'return' outside a function"));
                }
                let value = if self.peek().is_punct(Punct::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_semicolon()?;
                Ok(Statement::Return { value, line })
            }
            TokenKind::Keyword(Keyword::Print) => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect_semicolon()?;
                Ok(Statement::Print { value, line })
            }
            TokenKind::Keyword(Keyword::Import) => {
                self.advance();
                let name = match self.peek().kind.clone() {
                    TokenKind::Literal(Literal::Str(s)) => {
                        self.advance();
                        s
                    }
                    _ => return Err(self.unexpected("quoted file name")),
                };
                self.expect_semicolon()?;
                Ok(Statement::Import { name, line })
            }
            TokenKind::Keyword(Keyword::Connect) => {
                self.advance();
                let name = self.expect_name("connection name")?;
                self.expect_op_token(Op::Assign)?;
                let (spec_raw, offset) = self.slice_balanced()?;
                self.expect_semicolon()?;
                Ok(Statement::Connect {
                    name,
                    spec_raw,
                    offset,
                    line,
                })
            }
            TokenKind::Keyword(Keyword::Use) => {
                self.advance();
                let name = self.expect_name("connection name")?;
                let body = self.parse_braced_statements()?;
                Ok(Statement::UseConnection { name, body, line })
            }
            TokenKind::Keyword(Keyword::Close) => {
                self.advance();
                if self.eat_keyword(Keyword::Screen) {
                    let name = self.optional_name()?;
                    self.expect_semicolon()?;
                    return Ok(Statement::CloseScreen { name, line });
                }
                let name = self.expect_name("cursor or connection name")?;
                self.expect_semicolon()?;
                if self.cursors.contains(&name) {
                    Ok(Statement::CloseCursor { name, line })
                } else {
                    Ok(Statement::CloseConnection { name, line })
                }
            }
            TokenKind::Keyword(Keyword::Cursor) => {
                self.advance();
                let name = self.expect_name("cursor name")?;
                self.expect_op_token(Op::Assign)?;
                let sql = self.slice_select()?;
                self.expect_semicolon()?;
                if self.cursors.contains(&name) {
                    return Err(super::ParseError::new(
                        line,
                        format!("cursor '{name}' already declared"),
                    ));
                }
                self.cursors.push(name.clone());
                Ok(Statement::CursorDecl { name, sql, line })
            }
            TokenKind::Keyword(Keyword::Open) => {
                self.advance();
                let name = self.expect_name("cursor name")?;
                let args = if self.peek().is_punct(Punct::LParen) {
                    self.parse_call_arguments()?
                } else {
                    Vec::new()
                };
                self.expect_semicolon()?;
                Ok(Statement::OpenCursor { name, args, line })
            }
            TokenKind::Keyword(Keyword::Screen) => {
                self.advance();
                let name = self.expect_name("screen name")?;
                self.expect_op_token(Op::Assign)?;
                let (spec_raw, offset) = self.slice_balanced()?;
                self.expect_semicolon()?;
                let replace = self.screens.contains(&name);
                if !replace {
                    self.screens.push(name.clone());
                }
                Ok(Statement::ScreenDecl {
                    name,
                    spec_raw,
                    offset,
                    replace,
                    line,
                })
            }
            TokenKind::Keyword(Keyword::Show) => {
                self.advance();
                self.expect_keyword(Keyword::Screen)?;
                let name = self.expect_name("screen name")?;
                let mut args = Vec::new();
                if self.peek().is_punct(Punct::LParen) {
                    self.advance();
                    if !self.peek().is_punct(Punct::RParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.eat_punct(Punct::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect_punct(Punct::RParen)?;
                }
                self.expect_semicolon()?;
                Ok(Statement::ShowScreen { name, args, line })
            }
            TokenKind::Keyword(Keyword::Hide) => {
                self.advance();
                self.expect_keyword(Keyword::Screen)?;
                let name = self.optional_name()?;
                self.expect_semicolon()?;
                Ok(Statement::HideScreen { name, line })
            }
            TokenKind::Keyword(Keyword::Submit) => {
                self.advance();
                self.expect_keyword(Keyword::Screen)?;
                let name = self.optional_name()?;
                self.expect_semicolon()?;
                Ok(Statement::SubmitScreen { name, line })
            }
            TokenKind::Punct(Punct::LBrace) => {
                let body = self.parse_braced_statements()?;
                Ok(Statement::Block(BlockStatement {
                    name: None,
                    params: Vec::new(),
                    return_type: None,
                    handlers: Vec::new(),
                    body,
                    line,
                }))
            }
            TokenKind::Identifier => self.parse_identifier_statement(),
            _ => Err(self.unexpected("statement")),
        }
    }

    fn expect_op_token(&mut self, op: Op) -> ParseResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", op.as_str())))
        }
    }

    fn optional_name(&mut self) -> ParseResult<Option<String>> {
        if self.peek().kind == TokenKind::Identifier {
            Ok(Some(self.expect_name("name")?))
        } else {
            Ok(None)
        }
    }

    /// `var name (: type)? (= init)? ;`
    fn parse_var_decl(&mut self, constant: bool, line: u32) -> ParseResult<Statement> {
        let name = self.expect_name("variable name")?;
        let ty = if self.eat_punct(Punct::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat_op(Op::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        if constant && init.is_none() {
            return Err(super::ParseError::new(
                line,
                format!("const '{name}' needs an initializer"),
            ));
        }
        self.expect_semicolon()?;
        Ok(Statement::VarDecl {
            name,
            ty,
            init,
            constant,
            line,
        })
    }

    /// `if ( cond ) then stmt (else stmt)?`
    fn parse_if(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        self.expect_keyword(Keyword::If)?;
        self.expect_punct(Punct::LParen)?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::RParen)?;
        self.expect_keyword(Keyword::Then)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat_keyword(Keyword::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            cond,
            then_branch,
            else_branch,
            line,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        self.expect_keyword(Keyword::While)?;
        self.expect_punct(Punct::LParen)?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::RParen)?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(Statement::While { cond, body, line })
    }

    fn parse_do_while(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        self.expect_keyword(Keyword::Do)?;
        let body = Box::new(self.parse_loop_body()?);
        self.expect_keyword(Keyword::While)?;
        self.expect_punct(Punct::LParen)?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::RParen)?;
        self.expect_semicolon()?;
        Ok(Statement::DoWhile { body, cond, line })
    }

    /// `for ( init? ; cond? ; step? ) body` — init is a full statement
    /// (with its own semicolon), step is a semicolon-free assignment.
    fn parse_for(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        self.expect_keyword(Keyword::For)?;
        self.expect_punct(Punct::LParen)?;
        let init = if self.eat_punct(Punct::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_statement()?))
        };
        let cond = if self.peek().is_punct(Punct::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_semicolon()?;
        let step = if self.peek().is_punct(Punct::RParen) {
            None
        } else {
            Some(Box::new(self.parse_assignment(false)?))
        };
        self.expect_punct(Punct::RParen)?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(Statement::For {
            init,
            cond,
            step,
            body,
            line,
        })
    }

    fn parse_foreach(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        self.expect_keyword(Keyword::Foreach)?;
        let var = self.expect_name("loop variable")?;
        self.expect_keyword(Keyword::In)?;
        let iterable = self.parse_expression()?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(Statement::ForEach {
            var,
            iterable,
            body,
            line,
        })
    }

    fn parse_loop_body(&mut self) -> ParseResult<Statement> {
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        body
    }

    /// `try { … } exceptions { when KIND(v) { … } … }`
    fn parse_try(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        self.expect_keyword(Keyword::Try)?;
        let body = self.parse_braced_statements()?;
        self.expect_keyword(Keyword::Exceptions)?;
        let handlers = self.parse_handlers()?;
        Ok(Statement::Try {
            body,
            handlers,
            line,
        })
    }

    /// `raise exception KIND(args);` — standard kinds take at most one
    /// message argument; custom kinds take any positional params.
    fn parse_raise(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        self.expect_keyword(Keyword::Raise)?;
        self.expect_keyword(Keyword::Exception)?;
        let kind = self.expect_name("exception name")?;
        let mut args = Vec::new();
        if self.peek().is_punct(Punct::LParen) {
            self.advance();
            if !self.peek().is_punct(Punct::RParen) {
                loop {
                    args.push(self.parse_expression()?);
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
            }
            self.expect_punct(Punct::RParen)?;
        }
        let standard = crate::interp::exception::ErrorKind::from_name(&kind).is_standard();
        if standard && args.len() > 1 {
            return Err(super::ParseError::new(
                line,
                format!("'{kind}' accepts at most one message parameter"),
            ));
        }
        self.expect_semicolon()?;
        Ok(Statement::Raise { kind, args, line })
    }

    fn parse_handlers(&mut self) -> ParseResult<Vec<Handler>> {
        self.expect_punct(Punct::LBrace)?;
        let mut handlers = Vec::new();
        while self.peek().is_keyword(Keyword::When) {
            let line = self.line();
            self.advance();
            let kind = self.expect_name("exception kind")?;
            self.expect_punct(Punct::LParen)?;
            let var = self.expect_name("handler variable")?;
            self.expect_punct(Punct::RParen)?;
            let body = self.parse_braced_statements()?;
            handlers.push(Handler {
                kind,
                var,
                body,
                line,
            });
        }
        if handlers.is_empty() {
            return Err(self.unexpected("'when' handler"));
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(handlers)
    }

    pub(crate) fn parse_braced_statements(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect_punct(Punct::LBrace)?;
        let mut body = Vec::new();
        while !self.peek().is_punct(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.parse_statement()?);
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(body)
    }

    /// Statements that start with an identifier: `name typeof TYPE;`
    /// (typedef, registered immediately), a block declaration, a bare call,
    /// or an assignment.
    fn parse_identifier_statement(&mut self) -> ParseResult<Statement> {
        let line = self.line();

        // typedef: `name typeof TYPE ;`
        if self.peek_at(1).is_keyword(Keyword::Typeof) {
            let name = self.expect_name("type alias name")?;
            self.advance();
            let spec = self.parse_type()?;
            self.expect_semicolon()?;
            self.types.register(TypeAlias {
                name: name.clone(),
                spec: spec.clone(),
            });
            return Ok(Statement::TypedefDecl { name, spec, line });
        }

        // Block declaration: `name(params) (return T)? { body } (exceptions {…})?`
        if self.peek_at(1).is_punct(Punct::LParen) && self.looks_like_block_decl() {
            return self.parse_block_decl();
        }

        self.parse_assignment(true)
    }

    /// Distinguish `name(…) { …` / `name(…) return …` declarations from
    /// plain call statements by scanning past the matching ')'.
    fn looks_like_block_decl(&self) -> bool {
        let mut depth = 0usize;
        let mut ahead = 1;
        loop {
            let tok = self.peek_at(ahead);
            match tok.kind {
                TokenKind::Punct(Punct::LParen) => depth += 1,
                TokenKind::Punct(Punct::RParen) => {
                    depth -= 1;
                    if depth == 0 {
                        let next = self.peek_at(ahead + 1);
                        return next.is_punct(Punct::LBrace)
                            || next.is_keyword(Keyword::Return)
                            || next.is_keyword(Keyword::Exceptions);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            ahead += 1;
        }
    }

    /// `name(p: type (= default)?, …) (return TYPE)? { body }
    ///  (exceptions { handlers })?`
    fn parse_block_decl(&mut self) -> ParseResult<Statement> {
        let line = self.line();
        let name = self.expect_name("block name")?;
        self.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        if !self.peek().is_punct(Punct::RParen) {
            loop {
                let p_line = self.line();
                let p_name = self.expect_name("parameter name")?;
                self.expect_punct(Punct::Colon)?;
                let ty = self.parse_type()?;
                let default = if self.eat_op(Op::Assign) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                let mandatory = default.is_none();
                params.push(ParamDecl {
                    name: p_name,
                    ty,
                    default,
                    mandatory,
                    line: p_line,
                });
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen)?;
        let return_type = if self.eat_keyword(Keyword::Return) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let saved_loop = self.loop_depth;
        self.loop_depth = 0;
        self.fn_depth += 1;
        let body = self.parse_braced_statements();
        self.fn_depth -= 1;
        self.loop_depth = saved_loop;
        let body = body?;

        let handlers = if self.eat_keyword(Keyword::Exceptions) {
            self.parse_handlers()?
        } else {
            Vec::new()
        };
        Ok(Statement::Block(BlockStatement {
            name: Some(name),
            params,
            return_type,
            handlers,
            body,
            line,
        }))
    }

    /// Assignment forms: `lvalue = e;`, compound `+= -= *= /=`, postfix
    /// `++`/`--`, or a bare call statement.
    fn parse_assignment(&mut self, with_semicolon: bool) -> ParseResult<Statement> {
        let line = self.line();
        let target = self.parse_expression()?;

        // A call standing alone is a call statement.
        if let Expression::Call(call) = &target {
            if !matches!(
                self.peek().kind,
                TokenKind::Op(
                    Op::Assign
                        | Op::PlusAssign
                        | Op::MinusAssign
                        | Op::StarAssign
                        | Op::SlashAssign
                        | Op::PlusPlus
                        | Op::MinusMinus
                )
            ) {
                if with_semicolon {
                    self.expect_semicolon()?;
                }
                return Ok(Statement::Call(call.clone()));
            }
        }

        if !target.is_lvalue() {
            return Err(super::ParseError::new(line, "expected an assignable target"));
        }

        let compound = |op: BinaryOp, target: Expression, value: Expression| Statement::Assign {
            value: Expression::Binary {
                op,
                left: Box::new(target.clone()),
                right: Box::new(value),
                line,
            },
            target,
            line,
        };

        let stmt = if self.eat_op(Op::Assign) {
            let value = self.parse_expression()?;
            Statement::Assign {
                target,
                value,
                line,
            }
        } else if self.eat_op(Op::PlusAssign) {
            compound(BinaryOp::Add, target, self.parse_expression()?)
        } else if self.eat_op(Op::MinusAssign) {
            compound(BinaryOp::Sub, target, self.parse_expression()?)
        } else if self.eat_op(Op::StarAssign) {
            compound(BinaryOp::Mul, target, self.parse_expression()?)
        } else if self.eat_op(Op::SlashAssign) {
            compound(BinaryOp::Div, target, self.parse_expression()?)
        } else if self.eat_op(Op::PlusPlus) {
            compound(BinaryOp::Add, target, one(line))
        } else if self.eat_op(Op::MinusMinus) {
            compound(BinaryOp::Sub, target, one(line))
        } else {
            return Err(self.unexpected("assignment operator"));
        };
        if with_semicolon {
            self.expect_semicolon()?;
        }
        Ok(stmt)
    }
}

fn one(line: u32) -> Expression {
    Expression::Literal {
        value: Lit::Int(1),
        line,
    }
}
