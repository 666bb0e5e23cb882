//! `sys.*` builtins: deep copy, runtime type inspection, cursor state.

use crate::interp::Interpreter;
use crate::interp::exception::ScriptError;
use crate::interp::value::Value;
use crate::syntax::types::DataType;

use super::{BuiltinInfo, BuiltinRegistry, param, want_any};

pub(super) fn register(registry: &mut BuiltinRegistry) {
    registry.register(BuiltinInfo {
        name: "sys.copy",
        signature: Some(vec![param("value", DataType::Null)]),
        return_type: None,
        invoke: copy,
    });
    registry.register(BuiltinInfo {
        name: "sys.typeOf",
        signature: Some(vec![param("value", DataType::Null)]),
        return_type: Some(DataType::String),
        invoke: type_of,
    });
    registry.register(BuiltinInfo {
        name: "sys.isOpen",
        signature: Some(vec![param("cursor", DataType::Cursor)]),
        return_type: Some(DataType::Boolean),
        invoke: is_open,
    });
}

/// Deep duplication; shared substructure and cycles are reproduced in the
/// copy.
fn copy(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let value = want_any(&args, 0, "value", line)?;
    Ok(Some(value.deep_copy()))
}

fn type_of(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let value = want_any(&args, 0, "value", line)?;
    Ok(Some(Value::Str(value.data_type().name().to_string())))
}

fn is_open(
    interp: &mut Interpreter,
    args: Vec<Value>,
    line: u32,
) -> Result<Option<Value>, ScriptError> {
    let name = match args.first() {
        Some(Value::Cursor(name)) => name.to_string(),
        Some(Value::Str(name)) => name.clone(),
        _ => {
            return Err(ScriptError::type_err(
                "sys.isOpen needs a cursor",
                line,
            ));
        }
    };
    Ok(Some(Value::Bool(interp.cursor_is_open(&name))))
}
