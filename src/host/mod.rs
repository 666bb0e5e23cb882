//! Host capability.
//!
//! The embedder provides I/O, screens, connections, the wall clock and the
//! cancellation flag through this trait; the core never embeds the host.
//! Screen event callbacks are plain calls back into the interpreter
//! (`Interpreter::call_block`) made on the interpreter's thread.

pub mod console;
pub mod recording;

use crate::interp::value::{DateValue, JsonValue, Value};
use crate::sql::Connection;

/// Output streams the host renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Info,
    Warn,
    Error,
    Ok,
}

impl Stream {
    pub fn name(self) -> &'static str {
        match self {
            Stream::Info => "info",
            Stream::Warn => "warn",
            Stream::Error => "error",
            Stream::Ok => "ok",
        }
    }
}

/// Host operations are fallible with plain messages; the interpreter wraps
/// them into script exceptions with the failing statement's line.
pub type HostResult<T> = Result<T, String>;

pub trait Host {
    fn print(&self, stream: Stream, text: &str);

    /// Idempotent unless `replace` is set.
    fn define_screen(&self, name: &str, spec: &JsonValue, replace: bool) -> HostResult<()>;
    fn show_screen(&self, name: &str, args: &[Value]) -> HostResult<()>;
    /// A `None` name targets the currently active screen.
    fn hide_screen(&self, name: Option<&str>) -> HostResult<()>;
    fn close_screen(&self, name: Option<&str>) -> HostResult<()>;
    fn submit_screen(&self, name: Option<&str>) -> HostResult<()>;
    fn get_screen_var(&self, screen: &str, var: &str) -> HostResult<Value>;
    fn set_screen_var(&self, screen: &str, var: &str, value: Value) -> HostResult<()>;

    fn open_connection(&self, name: &str, spec: &JsonValue) -> HostResult<Box<dyn Connection>>;
    fn close_connection(&self, name: &str);

    fn now(&self) -> DateValue;

    /// Checked at every statement boundary, loop iteration and builtin
    /// call; a true answer unwinds as a CANCELLED exception.
    fn is_cancelled(&self) -> bool {
        false
    }
}
