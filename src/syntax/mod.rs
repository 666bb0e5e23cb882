//! AST node types and the type-alias registry.

pub mod expressions;
pub mod statements;
pub mod types;

pub use expressions::{
    Argument, BinaryOp, CallExpr, CallTarget, CompareOp, Expression, Lit, UnaryOp,
};
pub use statements::{BlockStatement, Handler, ParamDecl, Statement};
pub use types::{
    ArrayDim, BitField, DataType, PackedType, RecordField, RecordType, TypeAlias, TypeRegistry,
    TypeSpec,
};
