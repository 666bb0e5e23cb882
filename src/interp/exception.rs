//! Script-level exceptions and the standard error taxonomy.

use core::fmt;

use thiserror::Error;

use crate::interp::value::Value;

/// Standard exception kinds plus user-named custom kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Name,
    Type,
    Index,
    Num,
    Io,
    Db,
    Cancelled,
    Any,
    Custom(String),
}

impl ErrorKind {
    pub fn name(&self) -> &str {
        match self {
            ErrorKind::Parse => "PARSE_ERROR",
            ErrorKind::Name => "NAME_ERROR",
            ErrorKind::Type => "TYPE_ERROR",
            ErrorKind::Index => "INDEX_ERROR",
            ErrorKind::Num => "NUM_ERROR",
            ErrorKind::Io => "IO_ERROR",
            ErrorKind::Db => "DB_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Any => "ANY_ERROR",
            ErrorKind::Custom(name) => name,
        }
    }

    /// Map a `raise exception KIND(…)` / `when KIND(v)` name. Unknown names
    /// are custom kinds.
    pub fn from_name(name: &str) -> ErrorKind {
        match name {
            "PARSE_ERROR" => ErrorKind::Parse,
            "NAME_ERROR" => ErrorKind::Name,
            "TYPE_ERROR" => ErrorKind::Type,
            "INDEX_ERROR" => ErrorKind::Index,
            "NUM_ERROR" => ErrorKind::Num,
            "IO_ERROR" => ErrorKind::Io,
            "DB_ERROR" => ErrorKind::Db,
            "CANCELLED" => ErrorKind::Cancelled,
            "ANY_ERROR" => ErrorKind::Any,
            other => ErrorKind::Custom(other.to_string()),
        }
    }

    pub fn is_standard(&self) -> bool {
        !matches!(self, ErrorKind::Custom(_))
    }

    /// Handler matching: standard kinds match exactly, `ANY_ERROR` matches
    /// any standard kind but never a custom one, custom kinds match by
    /// exact name only.
    pub fn caught_by(&self, handler: &ErrorKind) -> bool {
        match handler {
            ErrorKind::Any => self.is_standard(),
            other => self == other,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the compact backtrace reported for unhandled exceptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub block: String,
    pub line: u32,
}

/// A raised exception travelling up the interpreter's call stack.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message} (line {line})")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    /// Positional params of a custom `raise`; empty for standard kinds.
    pub params: Vec<Value>,
    pub line: u32,
    /// Frames crossed while unwinding, innermost first.
    pub trace: Vec<TraceFrame>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, line: u32) -> Self {
        ScriptError {
            kind,
            message: message.into(),
            params: Vec::new(),
            line,
            trace: Vec::new(),
        }
    }

    pub fn name(message: impl Into<String>, line: u32) -> Self {
        Self::new(ErrorKind::Name, message, line)
    }

    pub fn type_err(message: impl Into<String>, line: u32) -> Self {
        Self::new(ErrorKind::Type, message, line)
    }

    pub fn index(message: impl Into<String>, line: u32) -> Self {
        Self::new(ErrorKind::Index, message, line)
    }

    pub fn num(message: impl Into<String>, line: u32) -> Self {
        Self::new(ErrorKind::Num, message, line)
    }

    pub fn io(message: impl Into<String>, line: u32) -> Self {
        Self::new(ErrorKind::Io, message, line)
    }

    pub fn db(message: impl Into<String>, line: u32) -> Self {
        Self::new(ErrorKind::Db, message, line)
    }

    pub fn cancelled(line: u32) -> Self {
        Self::new(ErrorKind::Cancelled, "execution cancelled", line)
    }

    pub fn pushed(mut self, block: &str, line: u32) -> Self {
        self.trace.push(TraceFrame {
            block: block.to_string(),
            line,
        });
        self
    }

    /// `error`-stream report: one line with kind, line and message followed
    /// by the frame trace.
    pub fn report(&self) -> String {
        let mut out = format!("{}: {} (line {})", self.kind, self.message, self.line);
        for frame in &self.trace {
            out.push_str(&format!("\n  at {}({})", frame.block, frame.line));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_catches_standard_not_custom() {
        assert!(ErrorKind::Io.caught_by(&ErrorKind::Any));
        assert!(ErrorKind::Cancelled.caught_by(&ErrorKind::Any));
        assert!(!ErrorKind::Custom("BOOM".into()).caught_by(&ErrorKind::Any));
        assert!(ErrorKind::Custom("BOOM".into()).caught_by(&ErrorKind::Custom("BOOM".into())));
        assert!(!ErrorKind::Io.caught_by(&ErrorKind::Db));
    }

    #[test]
    fn report_includes_trace() {
        let err = ScriptError::io("boom", 3)
            .pushed("inner", 3)
            .pushed("outer", 9);
        let report = err.report();
        assert!(report.starts_with("IO_ERROR: boom (line 3)"));
        assert!(report.contains("at inner(3)"));
        assert!(report.contains("at outer(9)"));
    }
}
