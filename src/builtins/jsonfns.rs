//! `json.*` builtins bridging the value model and the JSON reader.

use crate::interp::Interpreter;
use crate::interp::exception::ScriptError;
use crate::interp::value::Value;
use crate::json::{self, JsonOptions};
use crate::syntax::types::DataType;

use super::{BuiltinInfo, BuiltinRegistry, param, want_any, want_str};

pub(super) fn register(registry: &mut BuiltinRegistry) {
    registry.register(BuiltinInfo {
        name: "json.parse",
        signature: Some(vec![param("text", DataType::String)]),
        return_type: Some(DataType::Json),
        invoke: parse,
    });
    registry.register(BuiltinInfo {
        name: "json.stringify",
        signature: Some(vec![param("value", DataType::Null)]),
        return_type: Some(DataType::String),
        invoke: stringify,
    });
}

fn parse(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    let tree = json::parse(&text, JsonOptions::default())
        .map_err(|err| ScriptError::type_err(err.to_string(), line))?;
    Ok(Some(Value::json(tree)))
}

fn stringify(
    _: &mut Interpreter,
    args: Vec<Value>,
    line: u32,
) -> Result<Option<Value>, ScriptError> {
    let value = want_any(&args, 0, "value", line)?;
    Ok(Some(Value::Str(value.to_json_tree().stringify())))
}
