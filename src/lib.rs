//! EBS scripting language core: lexer, parser, two-phase binder and
//! tree-walking interpreter, plus the host/connection capabilities the
//! embedder implements.

pub mod builtins;
pub mod cli;
pub mod host;
pub mod interp;
pub mod json;
pub mod lexer;
pub mod parser;
pub mod source;
pub mod sql;
pub mod syntax;

pub use interp::Interpreter;
pub use interp::exception::{ErrorKind, ScriptError};
pub use interp::value::Value;
pub use parser::{Diagnostic, ParseError, Program};
