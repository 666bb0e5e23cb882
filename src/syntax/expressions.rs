//! Expression nodes. Every node carries its 1-based source line.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::syntax::types::TypeSpec;

/// Typed literal payload of a `Literal` expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lit {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Date(NaiveDate, Option<NaiveTime>),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    /// `typeof e` — runtime type name as a string.
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// One actual parameter at a call site: positional, or named (`name = expr`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    Positional(Expression),
    Named { name: String, value: Expression },
}

impl Argument {
    pub fn value(&self) -> &Expression {
        match self {
            Argument::Positional(e) => e,
            Argument::Named { value, .. } => value,
        }
    }
}

/// Where the post-parse binder resolved a call to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallTarget {
    /// Not resolved yet; the interpreter retries at call time (this is what
    /// makes runtime `import` work).
    #[default]
    Unresolved,
    /// A user block from the program's block table.
    Block,
    /// A registered builtin.
    Builtin,
}

/// Call site, shared by call statements and call expressions. `normalized`
/// is filled by the binder: one slot per formal, in formals order; `None`
/// means "use the formal's default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    pub name: String,
    pub args: Vec<Argument>,
    /// `#name(args)` syntax bypasses the block table.
    pub forced_builtin: bool,
    pub target: CallTarget,
    pub normalized: Option<Vec<Option<Expression>>>,
    pub line: u32,
}

impl CallExpr {
    pub fn new(name: String, args: Vec<Argument>, line: u32) -> Self {
        CallExpr {
            name,
            args,
            forced_builtin: false,
            target: CallTarget::Unresolved,
            normalized: None,
            line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal {
        value: Lit,
        line: u32,
    },
    /// A (possibly dotted) name. The first segment is the base variable;
    /// the rest are field / screen-variable steps.
    Variable {
        path: Vec<String>,
        line: u32,
    },
    /// `base.field` where the base is itself an expression (e.g. `a[i].f`).
    Property {
        base: Box<Expression>,
        field: String,
        line: u32,
    },
    /// `base[i, j, …]` — multi-dimensional indexes in one bracket pair.
    Index {
        base: Box<Expression>,
        indices: Vec<Expression>,
        line: u32,
    },
    /// `length(e)` / `size(e)`.
    Length {
        value: Box<Expression>,
        line: u32,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
        line: u32,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        line: u32,
    },
    /// `a < b <= c …` — n operands, n−1 comparators, every middle operand
    /// evaluated exactly once, short-circuiting on the first false one.
    Chained {
        operands: Vec<Expression>,
        ops: Vec<CompareOp>,
        line: u32,
    },
    Call(CallExpr),
    /// `type(e)` — includes alias casts (`myBits(byteVal)`), which project
    /// a byte/integer into a bit-packed view over its storage.
    Cast {
        ty: TypeSpec,
        value: Box<Expression>,
        line: u32,
    },
    ArrayLiteral {
        elements: Vec<Expression>,
        line: u32,
    },
    /// `array.T[d1, d2]` in expression position: allocate a zero-filled
    /// array of the given shape.
    ArrayAlloc {
        spec: Box<TypeSpec>,
        line: u32,
    },
    /// `queue.T` in expression position: a fresh empty queue.
    QueueAlloc {
        spec: Box<TypeSpec>,
        line: u32,
    },
    /// `{…}` / `[…]` captured verbatim; parsed by the JSON reader on
    /// evaluation. `offset` is the slice's byte offset in the source so
    /// inner errors can point at the right spot.
    JsonLiteral {
        raw: String,
        offset: usize,
        line: u32,
    },
    /// `Alias { field: value, … }` — unquoted keys, typed by the alias.
    RecordLiteral {
        alias: String,
        raw: String,
        offset: usize,
        line: u32,
    },
    /// `select …` in expression position; eagerly materializes an array of
    /// records when evaluated.
    SqlSelect {
        raw: String,
        line: u32,
    },
    CursorHasNext {
        cursor: String,
        line: u32,
    },
    CursorNext {
        cursor: String,
        line: u32,
    },
}

impl Expression {
    pub fn line(&self) -> u32 {
        match self {
            Expression::Literal { line, .. }
            | Expression::Variable { line, .. }
            | Expression::Property { line, .. }
            | Expression::Index { line, .. }
            | Expression::Length { line, .. }
            | Expression::Unary { line, .. }
            | Expression::Binary { line, .. }
            | Expression::Chained { line, .. }
            | Expression::Cast { line, .. }
            | Expression::ArrayLiteral { line, .. }
            | Expression::ArrayAlloc { line, .. }
            | Expression::QueueAlloc { line, .. }
            | Expression::JsonLiteral { line, .. }
            | Expression::RecordLiteral { line, .. }
            | Expression::SqlSelect { line, .. }
            | Expression::CursorHasNext { line, .. }
            | Expression::CursorNext { line, .. } => *line,
            Expression::Call(call) => call.line,
        }
    }

    /// Whether this expression can stand on the left of an assignment.
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            Expression::Variable { .. } | Expression::Property { .. } | Expression::Index { .. }
        )
    }
}
