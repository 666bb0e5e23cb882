//! Statement nodes. Every node carries its 1-based source line.

use serde::{Deserialize, Serialize};

use crate::syntax::expressions::{CallExpr, Expression};
use crate::syntax::types::TypeSpec;

/// Formal parameter of a block declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeSpec,
    pub default: Option<Expression>,
    pub mandatory: bool,
    pub line: u32,
}

/// One `when KIND(var) { … }` handler arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    pub kind: String,
    pub var: String,
    pub body: Vec<Statement>,
    pub line: u32,
}

/// A named (callable) or anonymous compound statement. With a return type
/// it behaves as a function; an `exceptions` clause wraps the body the same
/// way a `try` would.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockStatement {
    pub name: Option<String>,
    pub params: Vec<ParamDecl>,
    pub return_type: Option<TypeSpec>,
    pub handlers: Vec<Handler>,
    pub body: Vec<Statement>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    VarDecl {
        name: String,
        ty: Option<TypeSpec>,
        init: Option<Expression>,
        constant: bool,
        line: u32,
    },
    /// `name typeof TYPE;` — the alias is registered during parsing; the
    /// node is kept so AST dumps reproduce the program.
    TypedefDecl {
        name: String,
        spec: TypeSpec,
        line: u32,
    },
    Assign {
        target: Expression,
        value: Expression,
        line: u32,
    },
    If {
        cond: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
        line: u32,
    },
    While {
        cond: Expression,
        body: Box<Statement>,
        line: u32,
    },
    DoWhile {
        body: Box<Statement>,
        cond: Expression,
        line: u32,
    },
    For {
        init: Option<Box<Statement>>,
        cond: Option<Expression>,
        step: Option<Box<Statement>>,
        body: Box<Statement>,
        line: u32,
    },
    ForEach {
        var: String,
        iterable: Expression,
        body: Box<Statement>,
        line: u32,
    },
    Break {
        line: u32,
    },
    Continue {
        line: u32,
    },
    Block(BlockStatement),
    Call(CallExpr),
    Return {
        value: Option<Expression>,
        line: u32,
    },
    Print {
        value: Expression,
        line: u32,
    },
    Import {
        name: String,
        line: u32,
    },
    Connect {
        name: String,
        spec_raw: String,
        offset: usize,
        line: u32,
    },
    UseConnection {
        name: String,
        body: Vec<Statement>,
        line: u32,
    },
    CloseConnection {
        name: String,
        line: u32,
    },
    /// `cursor name = SELECT …;` — stores the raw SELECT text.
    CursorDecl {
        name: String,
        sql: String,
        line: u32,
    },
    OpenCursor {
        name: String,
        args: Vec<crate::syntax::expressions::Argument>,
        line: u32,
    },
    CloseCursor {
        name: String,
        line: u32,
    },
    ScreenDecl {
        name: String,
        spec_raw: String,
        offset: usize,
        replace: bool,
        line: u32,
    },
    ShowScreen {
        name: String,
        args: Vec<Expression>,
        line: u32,
    },
    HideScreen {
        name: Option<String>,
        line: u32,
    },
    CloseScreen {
        name: Option<String>,
        line: u32,
    },
    SubmitScreen {
        name: Option<String>,
        line: u32,
    },
    Try {
        body: Vec<Statement>,
        handlers: Vec<Handler>,
        line: u32,
    },
    Raise {
        kind: String,
        args: Vec<Expression>,
        line: u32,
    },
}

impl Statement {
    pub fn line(&self) -> u32 {
        match self {
            Statement::VarDecl { line, .. }
            | Statement::TypedefDecl { line, .. }
            | Statement::Assign { line, .. }
            | Statement::If { line, .. }
            | Statement::While { line, .. }
            | Statement::DoWhile { line, .. }
            | Statement::For { line, .. }
            | Statement::ForEach { line, .. }
            | Statement::Break { line }
            | Statement::Continue { line }
            | Statement::Return { line, .. }
            | Statement::Print { line, .. }
            | Statement::Import { line, .. }
            | Statement::Connect { line, .. }
            | Statement::UseConnection { line, .. }
            | Statement::CloseConnection { line, .. }
            | Statement::CursorDecl { line, .. }
            | Statement::OpenCursor { line, .. }
            | Statement::CloseCursor { line, .. }
            | Statement::ScreenDecl { line, .. }
            | Statement::ShowScreen { line, .. }
            | Statement::HideScreen { line, .. }
            | Statement::CloseScreen { line, .. }
            | Statement::SubmitScreen { line, .. }
            | Statement::Try { line, .. }
            | Statement::Raise { line, .. } => *line,
            Statement::Block(b) => b.line,
            Statement::Call(c) => c.line,
        }
    }
}
