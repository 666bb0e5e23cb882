//! Console host used by the CLI runner.
//!
//! Prints `info`/`ok` to stdout and `warn`/`error` to stderr, keeps screens
//! and their variables in in-memory tables, and hands out connections the
//! embedder registered up front (a `{"provider": "memory"}` spec gets a
//! fresh empty in-memory connection).

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::Local;
use log::debug;

use crate::interp::value::{DateValue, JsonValue, Value};
use crate::sql::Connection;
use crate::sql::memory::MemoryConnection;

use super::{Host, HostResult, Stream};

struct ScreenState {
    spec: JsonValue,
    vars: HashMap<String, Value>,
    visible: bool,
}

impl ScreenState {
    fn new(spec: JsonValue) -> Self {
        ScreenState {
            spec,
            vars: HashMap::new(),
            visible: false,
        }
    }
}

#[derive(Default)]
pub struct ConsoleHost {
    screens: RefCell<HashMap<String, ScreenState>>,
    active: RefCell<Option<String>>,
    connections: RefCell<HashMap<String, Box<dyn Connection>>>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a connection the script can `connect` to by name.
    pub fn register_connection(&self, name: &str, conn: Box<dyn Connection>) {
        self.connections.borrow_mut().insert(name.to_string(), conn);
    }

    fn target<'a>(&self, name: Option<&'a str>) -> HostResult<String> {
        match name {
            Some(n) => Ok(n.to_string()),
            None => self
                .active
                .borrow()
                .clone()
                .ok_or_else(|| "no active screen".to_string()),
        }
    }
}

impl Host for ConsoleHost {
    fn print(&self, stream: Stream, text: &str) {
        match stream {
            Stream::Info | Stream::Ok => println!("{text}"),
            Stream::Warn => eprintln!("warning: {text}"),
            Stream::Error => eprintln!("error: {text}"),
        }
    }

    fn define_screen(&self, name: &str, spec: &JsonValue, replace: bool) -> HostResult<()> {
        let mut screens = self.screens.borrow_mut();
        if screens.contains_key(name) && !replace {
            debug!("screen '{name}' already defined; keeping existing spec");
            return Ok(());
        }
        screens.insert(name.to_string(), ScreenState::new(spec.clone()));
        Ok(())
    }

    fn show_screen(&self, name: &str, args: &[Value]) -> HostResult<()> {
        let mut screens = self.screens.borrow_mut();
        let screen = screens
            .get_mut(name)
            .ok_or_else(|| format!("unknown screen '{name}'"))?;
        screen.visible = true;
        *self.active.borrow_mut() = Some(name.to_string());
        debug!(
            "show screen '{name}' ({} args, spec {})",
            args.len(),
            screen.spec.stringify()
        );
        Ok(())
    }

    fn hide_screen(&self, name: Option<&str>) -> HostResult<()> {
        let target = self.target(name)?;
        if let Some(screen) = self.screens.borrow_mut().get_mut(&target) {
            screen.visible = false;
        }
        Ok(())
    }

    fn close_screen(&self, name: Option<&str>) -> HostResult<()> {
        let target = self.target(name)?;
        self.screens.borrow_mut().remove(&target);
        let mut active = self.active.borrow_mut();
        if active.as_deref() == Some(target.as_str()) {
            *active = None;
        }
        Ok(())
    }

    fn submit_screen(&self, name: Option<&str>) -> HostResult<()> {
        let target = self.target(name)?;
        debug!("submit screen '{target}'");
        Ok(())
    }

    fn get_screen_var(&self, screen: &str, var: &str) -> HostResult<Value> {
        let screens = self.screens.borrow();
        let state = screens
            .get(screen)
            .ok_or_else(|| format!("unknown screen '{screen}'"))?;
        Ok(state.vars.get(var).cloned().unwrap_or(Value::Null))
    }

    fn set_screen_var(&self, screen: &str, var: &str, value: Value) -> HostResult<()> {
        let mut screens = self.screens.borrow_mut();
        let state = screens
            .get_mut(screen)
            .ok_or_else(|| format!("unknown screen '{screen}'"))?;
        state.vars.insert(var.to_string(), value);
        Ok(())
    }

    fn open_connection(&self, name: &str, spec: &JsonValue) -> HostResult<Box<dyn Connection>> {
        if let Some(conn) = self.connections.borrow_mut().remove(name) {
            return Ok(conn);
        }
        let provider = match spec {
            JsonValue::Obj(map) => match map.get("provider") {
                Some(JsonValue::Str(p)) => p.clone(),
                _ => String::new(),
            },
            _ => String::new(),
        };
        if provider == "memory" {
            return Ok(Box::new(MemoryConnection::new()));
        }
        Err(format!("no connection registered under '{name}'"))
    }

    fn close_connection(&self, name: &str) {
        debug!("connection '{name}' closed");
    }

    fn now(&self) -> DateValue {
        DateValue::from_datetime(Local::now().naive_local())
    }
}
