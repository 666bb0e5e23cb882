//! `map.*` builtins.

use crate::interp::Interpreter;
use crate::interp::exception::ScriptError;
use crate::interp::value::{ArrayValue, Value};
use crate::syntax::types::{DataType, TypeSpec};

use super::{BuiltinInfo, BuiltinRegistry, param, want_map, want_str};

pub(super) fn register(registry: &mut BuiltinRegistry) {
    registry.register(BuiltinInfo {
        name: "map.keys",
        signature: Some(vec![param("map", DataType::Map)]),
        return_type: Some(DataType::Array),
        invoke: keys,
    });
    registry.register(BuiltinInfo {
        name: "map.values",
        signature: Some(vec![param("map", DataType::Map)]),
        return_type: Some(DataType::Array),
        invoke: values,
    });
    registry.register(BuiltinInfo {
        name: "map.contains",
        signature: Some(vec![
            param("map", DataType::Map),
            param("key", DataType::String),
        ]),
        return_type: Some(DataType::Boolean),
        invoke: contains,
    });
    registry.register(BuiltinInfo {
        name: "map.remove",
        signature: Some(vec![
            param("map", DataType::Map),
            param("key", DataType::String),
        ]),
        return_type: None,
        invoke: remove,
    });
}

fn keys(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let map = want_map(&args, 0, "map", line)?;
    let data = map
        .borrow()
        .entries
        .keys()
        .map(|k| Value::Str(k.clone()))
        .collect();
    Ok(Some(Value::array(ArrayValue {
        elem: TypeSpec::Data(DataType::String),
        dims: Vec::new(),
        data,
    })))
}

fn values(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let map = want_map(&args, 0, "map", line)?;
    let data = map.borrow().entries.values().cloned().collect();
    Ok(Some(Value::array(ArrayValue {
        elem: TypeSpec::Data(DataType::Null),
        dims: Vec::new(),
        data,
    })))
}

fn contains(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let map = want_map(&args, 0, "map", line)?;
    let key = want_str(&args, 1, "key", line)?;
    let found = map.borrow().entries.contains_key(&key);
    Ok(Some(Value::Bool(found)))
}

/// Remove an entry; the removed value comes back (null when absent).
/// `shift_remove` keeps the remaining insertion order intact.
fn remove(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let map = want_map(&args, 0, "map", line)?;
    let key = want_str(&args, 1, "key", line)?;
    let removed = map.borrow_mut().entries.shift_remove(&key);
    Ok(Some(removed.unwrap_or(Value::Null)))
}
