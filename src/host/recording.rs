//! Recording host for embedder tests: captures every printed line and
//! keeps screens/variables inspectable. The clock is fixed so scripts
//! using `date.now` stay deterministic.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::interp::value::{DateValue, JsonValue, Value};
use crate::sql::Connection;

use super::{Host, HostResult, Stream};

#[derive(Default)]
pub struct RecordingHost {
    pub output: RefCell<Vec<(Stream, String)>>,
    screens: RefCell<HashMap<String, JsonValue>>,
    screen_vars: RefCell<HashMap<(String, String), Value>>,
    active: RefCell<Option<String>>,
    connections: RefCell<HashMap<String, Box<dyn Connection>>>,
    cancelled: Cell<bool>,
    cancel_after: Cell<Option<usize>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written to the `info` stream, in order.
    pub fn printed(&self) -> Vec<String> {
        self.output
            .borrow()
            .iter()
            .filter(|(stream, _)| *stream == Stream::Info)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.output
            .borrow()
            .iter()
            .filter(|(stream, _)| *stream == Stream::Error)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn register_connection(&self, name: &str, conn: Box<dyn Connection>) {
        self.connections.borrow_mut().insert(name.to_string(), conn);
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Answer one cancellation request once `n` lines have been printed;
    /// lets a test cancel from inside a running script and still observe
    /// the handler that catches it.
    pub fn cancel_after(&self, n: usize) {
        self.cancel_after.set(Some(n));
    }

    pub fn screen_defined(&self, name: &str) -> bool {
        self.screens.borrow().contains_key(name)
    }

    pub fn screen_var(&self, screen: &str, var: &str) -> Option<Value> {
        self.screen_vars
            .borrow()
            .get(&(screen.to_string(), var.to_string()))
            .cloned()
    }

    pub fn set_var(&self, screen: &str, var: &str, value: Value) {
        self.screen_vars
            .borrow_mut()
            .insert((screen.to_string(), var.to_string()), value);
    }
}

impl Host for RecordingHost {
    fn print(&self, stream: Stream, text: &str) {
        self.output.borrow_mut().push((stream, text.to_string()));
    }

    fn define_screen(&self, name: &str, spec: &JsonValue, replace: bool) -> HostResult<()> {
        let mut screens = self.screens.borrow_mut();
        if !screens.contains_key(name) || replace {
            screens.insert(name.to_string(), spec.clone());
        }
        Ok(())
    }

    fn show_screen(&self, name: &str, _args: &[Value]) -> HostResult<()> {
        if !self.screens.borrow().contains_key(name) {
            return Err(format!("unknown screen '{name}'"));
        }
        *self.active.borrow_mut() = Some(name.to_string());
        Ok(())
    }

    fn hide_screen(&self, _name: Option<&str>) -> HostResult<()> {
        Ok(())
    }

    fn close_screen(&self, name: Option<&str>) -> HostResult<()> {
        let target = match name {
            Some(n) => n.to_string(),
            None => self.active.borrow().clone().unwrap_or_default(),
        };
        self.screens.borrow_mut().remove(&target);
        Ok(())
    }

    fn submit_screen(&self, _name: Option<&str>) -> HostResult<()> {
        Ok(())
    }

    fn get_screen_var(&self, screen: &str, var: &str) -> HostResult<Value> {
        Ok(self.screen_var(screen, var).unwrap_or(Value::Null))
    }

    fn set_screen_var(&self, screen: &str, var: &str, value: Value) -> HostResult<()> {
        self.set_var(screen, var, value);
        Ok(())
    }

    fn open_connection(&self, name: &str, _spec: &JsonValue) -> HostResult<Box<dyn Connection>> {
        self.connections
            .borrow_mut()
            .remove(name)
            .ok_or_else(|| format!("no connection registered under '{name}'"))
    }

    fn close_connection(&self, _name: &str) {}

    fn now(&self) -> DateValue {
        DateValue::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid fixed date"),
            None,
        )
    }

    fn is_cancelled(&self) -> bool {
        if let Some(limit) = self.cancel_after.get() {
            if self.output.borrow().len() >= limit {
                self.cancel_after.set(None);
                return true;
            }
        }
        self.cancelled.get()
    }
}
