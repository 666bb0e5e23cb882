//! Builtin registry.
//!
//! Builtins are host-level functions identified by dotted names. Each entry
//! carries an optional signature (name, type, default, mandatory flag per
//! parameter) used by the binder to normalize call sites, an advisory
//! return type for expression contexts, and the function itself. The
//! registry is initialized once per interpreter and read-only afterwards;
//! the `custom.*` family is the embedder extension point and accepts
//! positional arguments only (no signature).

mod arrays;
mod dates;
mod jsonfns;
mod maps;
mod math;
mod queues;
mod strings;
mod sys;

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::interp::Interpreter;
use crate::interp::exception::ScriptError;
use crate::interp::value::{ArrayValue, DateValue, MapValue, QueueValue, Value};
use crate::syntax::types::DataType;

pub type BuiltinFn =
    fn(&mut Interpreter, Vec<Value>, u32) -> Result<Option<Value>, ScriptError>;

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: DataType,
    pub default: Option<Value>,
    pub mandatory: bool,
}

pub struct BuiltinInfo {
    pub name: &'static str,
    pub signature: Option<Vec<Parameter>>,
    pub return_type: Option<DataType>,
    pub invoke: BuiltinFn,
}

#[derive(Default)]
pub struct BuiltinRegistry {
    entries: IndexMap<String, BuiltinInfo>,
}

impl BuiltinRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard library: string, array, queue, map, json, date, math
    /// and sys families.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        strings::register(&mut registry);
        arrays::register(&mut registry);
        queues::register(&mut registry);
        maps::register(&mut registry);
        jsonfns::register(&mut registry);
        dates::register(&mut registry);
        math::register(&mut registry);
        sys::register(&mut registry);
        registry
    }

    pub fn register(&mut self, info: BuiltinInfo) {
        self.entries.insert(info.name.to_string(), info);
    }

    /// Register an embedder function under the dynamic `custom.` family.
    /// No signature: calls pass positional arguments through untouched.
    pub fn register_dynamic(&mut self, name: &str, invoke: BuiltinFn) {
        let full = if name.starts_with("custom.") {
            name.to_string()
        } else {
            format!("custom.{name}")
        };
        self.entries.insert(
            full,
            BuiltinInfo {
                name: "custom.*",
                signature: None,
                return_type: None,
                invoke,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinInfo> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

// ----- signature construction helpers ----------------------------------------

pub(crate) fn param(name: &str, ty: DataType) -> Parameter {
    Parameter {
        name: name.to_string(),
        ty,
        default: None,
        mandatory: true,
    }
}

pub(crate) fn opt(name: &str, ty: DataType, default: Value) -> Parameter {
    Parameter {
        name: name.to_string(),
        ty,
        default: Some(default),
        mandatory: false,
    }
}

// ----- argument extraction helpers -------------------------------------------

pub(crate) fn want_str(args: &[Value], idx: usize, what: &str, line: u32) -> Result<String, ScriptError> {
    match args.get(idx) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(ScriptError::type_err(
            format!("{what} must be a string, got {}", other.data_type()),
            line,
        )),
        None => Err(ScriptError::type_err(format!("missing {what}"), line)),
    }
}

pub(crate) fn want_int(args: &[Value], idx: usize, what: &str, line: u32) -> Result<i64, ScriptError> {
    args.get(idx)
        .and_then(Value::as_i64)
        .ok_or_else(|| ScriptError::type_err(format!("{what} must be an integer"), line))
}

pub(crate) fn want_any(args: &[Value], idx: usize, what: &str, line: u32) -> Result<Value, ScriptError> {
    args.get(idx)
        .cloned()
        .ok_or_else(|| ScriptError::type_err(format!("missing {what}"), line))
}

pub(crate) fn want_array(
    args: &[Value],
    idx: usize,
    what: &str,
    line: u32,
) -> Result<Rc<RefCell<ArrayValue>>, ScriptError> {
    match args.get(idx) {
        Some(Value::Array(a)) => Ok(Rc::clone(a)),
        Some(other) => Err(ScriptError::type_err(
            format!("{what} must be an array, got {}", other.data_type()),
            line,
        )),
        None => Err(ScriptError::type_err(format!("missing {what}"), line)),
    }
}

pub(crate) fn want_map(
    args: &[Value],
    idx: usize,
    what: &str,
    line: u32,
) -> Result<Rc<RefCell<MapValue>>, ScriptError> {
    match args.get(idx) {
        Some(Value::Map(m)) => Ok(Rc::clone(m)),
        Some(other) => Err(ScriptError::type_err(
            format!("{what} must be a map, got {}", other.data_type()),
            line,
        )),
        None => Err(ScriptError::type_err(format!("missing {what}"), line)),
    }
}

pub(crate) fn want_queue(
    args: &[Value],
    idx: usize,
    what: &str,
    line: u32,
) -> Result<Rc<RefCell<QueueValue>>, ScriptError> {
    match args.get(idx) {
        Some(Value::Queue(q)) => Ok(Rc::clone(q)),
        Some(other) => Err(ScriptError::type_err(
            format!("{what} must be a queue, got {}", other.data_type()),
            line,
        )),
        None => Err(ScriptError::type_err(format!("missing {what}"), line)),
    }
}

pub(crate) fn want_date(
    args: &[Value],
    idx: usize,
    what: &str,
    line: u32,
) -> Result<DateValue, ScriptError> {
    match args.get(idx) {
        Some(Value::Date(d)) => Ok(*d),
        Some(other) => Err(ScriptError::type_err(
            format!("{what} must be a date, got {}", other.data_type()),
            line,
        )),
        None => Err(ScriptError::type_err(format!("missing {what}"), line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_the_families() {
        let registry = BuiltinRegistry::standard();
        for name in [
            "string.concat",
            "string.substring",
            "array.sort",
            "array.push",
            "queue.enqueue",
            "map.keys",
            "json.parse",
            "json.stringify",
            "date.now",
            "math.abs",
            "sys.copy",
        ] {
            assert!(registry.get(name).is_some(), "missing builtin {name}");
        }
        assert!(registry.get("string.nope").is_none());
    }

    #[test]
    fn dynamic_family_has_no_signature() {
        let mut registry = BuiltinRegistry::standard();
        registry.register_dynamic("double", |_interp, args, _line| {
            let n = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(Some(Value::Long(n * 2)))
        });
        let info = registry.get("custom.double").unwrap();
        assert!(info.signature.is_none());
    }

    #[test]
    fn signatures_carry_defaults() {
        let registry = BuiltinRegistry::standard();
        let info = registry.get("string.substring").unwrap();
        let params = info.signature.as_ref().unwrap();
        assert_eq!(params[0].name, "text");
        assert!(params[0].mandatory);
        assert!(params[2].default.is_some());
        assert!(!params[2].mandatory);
    }
}
