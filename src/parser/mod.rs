//! Recursive-descent parser.
//!
//! The parser consumes the token stream and produces statements and a block
//! table; it never evaluates. Two post-parse passes (see `binder`) resolve
//! call targets against the block table and the builtin registry and
//! normalize every call's parameter list to its callee's signature.
//! `typedef` statements register aliases while parsing runs, so later
//! declarations can name them.

pub mod binder;
mod expressions;
mod statements;
mod types;

use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::builtins::BuiltinRegistry;
use crate::lexer::token::{Keyword, Op, Punct, Token, TokenKind};
use crate::lexer::{LexError, Lexer};
use crate::source::SourceBuffer;
use crate::syntax::{BlockStatement, Statement, TypeRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

impl ParseError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

/// Structured front-end diagnostic handed to the embedder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: String,
    pub line: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Diagnostic {
    pub fn parse(line: u32, message: impl Into<String>) -> Self {
        Diagnostic {
            kind: "PARSE_ERROR".to_string(),
            line,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl From<&LexError> for Diagnostic {
    fn from(err: &LexError) -> Self {
        Diagnostic::parse(err.line(), err.to_string())
    }
}

impl From<ParseError> for Diagnostic {
    fn from(err: ParseError) -> Self {
        Diagnostic::parse(err.line, err.message)
    }
}

/// Parse result: the block table, the ordered top-level statements, the
/// type aliases registered along the way, and the declared cursor/screen
/// names.
#[derive(Debug)]
pub struct Program {
    pub source: Rc<SourceBuffer>,
    pub statements: Vec<Statement>,
    pub blocks: IndexMap<String, Rc<BlockStatement>>,
    pub types: TypeRegistry,
    pub cursors: Vec<String>,
    pub screens: Vec<String>,
}

impl Program {
    /// Lex, parse and bind `source` against `builtins`. Lex errors and the
    /// first parse error come back as diagnostics; they always precede any
    /// execution.
    pub fn parse(source: &str, builtins: &BuiltinRegistry) -> Result<Program, Vec<Diagnostic>> {
        let buffer = Rc::new(SourceBuffer::new(source));
        let (tokens, lex_errors) = Lexer::new(&buffer).tokenize();
        let mut diagnostics: Vec<Diagnostic> = lex_errors.iter().map(Diagnostic::from).collect();

        let mut parser = Parser::new(&buffer, tokens);
        match parser.parse_program() {
            Ok((mut statements, mut blocks)) => {
                if let Err(err) = binder::bind(&mut statements, &mut blocks, builtins) {
                    diagnostics.push(err.into());
                }
                if !diagnostics.is_empty() {
                    return Err(diagnostics);
                }
                Ok(Program {
                    source: buffer.clone(),
                    statements,
                    blocks: blocks
                        .into_iter()
                        .map(|(name, block)| (name, Rc::new(block)))
                        .collect(),
                    types: parser.types,
                    cursors: parser.cursors,
                    screens: parser.screens,
                })
            }
            Err(err) => {
                diagnostics.push(err.into());
                Err(diagnostics)
            }
        }
    }
}

pub(crate) type ParseResult<T> = Result<T, ParseError>;

/// Token cursor plus the parse-time side tables.
pub(crate) struct Parser<'a> {
    pub(crate) src: &'a SourceBuffer,
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) types: TypeRegistry,
    pub(crate) cursors: Vec<String>,
    pub(crate) screens: Vec<String>,
    /// Current loop nesting; break/continue outside a loop are parse errors.
    pub(crate) loop_depth: u32,
    /// Current named-block nesting; return outside one is a parse error.
    pub(crate) fn_depth: u32,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(src: &'a SourceBuffer, tokens: Vec<Token>) -> Self {
        Parser {
            src,
            tokens,
            pos: 0,
            types: TypeRegistry::new(),
            cursors: Vec::new(),
            screens: Vec::new(),
            loop_depth: 0,
            fn_depth: 0,
        }
    }

    pub(crate) fn parse_program(
        &mut self,
    ) -> ParseResult<(Vec<Statement>, IndexMap<String, BlockStatement>)> {
        let mut statements = Vec::new();
        let mut blocks: IndexMap<String, BlockStatement> = IndexMap::new();
        while !self.at_eof() {
            let stmt = self.parse_statement()?;
            match stmt {
                Statement::Block(block) if block.name.is_some() => {
                    let name = block.name.clone().unwrap_or_default();
                    blocks.insert(name, block);
                }
                other => statements.push(other),
            }
        }
        Ok((statements, blocks))
    }

    // ----- cursor primitives ------------------------------------------------

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_at(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    pub(crate) fn line(&self) -> u32 {
        self.peek().line
    }

    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn text_of(&self, tok: &Token) -> &'a str {
        tok.span.slice(self.src.text())
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line(), message)
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        let found = self.peek().describe(self.src.text());
        self.error(format!("expected {expected}, found {found}"))
    }

    pub(crate) fn eat_punct(&mut self, p: Punct) -> bool {
        if self.peek().is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_punct(&mut self, p: Punct) -> ParseResult<Token> {
        if self.peek().is_punct(p) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{}'", p.as_char())))
        }
    }

    pub(crate) fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.peek().is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, kw: Keyword) -> ParseResult<Token> {
        if self.peek().is_keyword(kw) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{}'", kw.as_str())))
        }
    }

    pub(crate) fn eat_op(&mut self, op: Op) -> bool {
        if self.peek().is_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect an identifier token and return its text (possibly dotted).
    pub(crate) fn expect_identifier(&mut self, what: &str) -> ParseResult<String> {
        if self.peek().kind == TokenKind::Identifier {
            let tok = self.advance();
            Ok(self.text_of(&tok).to_string())
        } else {
            Err(self.unexpected(what))
        }
    }

    /// Expect a plain (undotted) identifier.
    pub(crate) fn expect_name(&mut self, what: &str) -> ParseResult<String> {
        let name = self.expect_identifier(what)?;
        if name.contains('.') {
            return Err(self.error(format!("expected {what}, found qualified name '{name}'")));
        }
        Ok(name)
    }

    pub(crate) fn expect_semicolon(&mut self) -> ParseResult<()> {
        self.expect_punct(Punct::Semicolon)?;
        Ok(())
    }
}
