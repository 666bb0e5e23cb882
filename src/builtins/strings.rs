//! `string.*` builtins. Positions and lengths are in code points.

use crate::interp::Interpreter;
use crate::interp::exception::ScriptError;
use crate::interp::value::Value;
use crate::syntax::types::DataType;

use super::{BuiltinInfo, BuiltinRegistry, opt, param, want_any, want_str};

pub(super) fn register(registry: &mut BuiltinRegistry) {
    registry.register(BuiltinInfo {
        name: "string.concat",
        signature: Some(vec![
            param("a", DataType::String),
            param("b", DataType::String),
        ]),
        return_type: Some(DataType::String),
        invoke: concat,
    });
    registry.register(BuiltinInfo {
        name: "string.length",
        signature: Some(vec![param("text", DataType::String)]),
        return_type: Some(DataType::Integer),
        invoke: length,
    });
    registry.register(BuiltinInfo {
        name: "string.substring",
        signature: Some(vec![
            param("text", DataType::String),
            param("start", DataType::Integer),
            opt("end", DataType::Integer, Value::Int(-1)),
        ]),
        return_type: Some(DataType::String),
        invoke: substring,
    });
    registry.register(BuiltinInfo {
        name: "string.split",
        signature: Some(vec![
            param("text", DataType::String),
            param("separator", DataType::String),
        ]),
        return_type: Some(DataType::Array),
        invoke: split,
    });
    registry.register(BuiltinInfo {
        name: "string.trim",
        signature: Some(vec![param("text", DataType::String)]),
        return_type: Some(DataType::String),
        invoke: trim,
    });
    registry.register(BuiltinInfo {
        name: "string.upper",
        signature: Some(vec![param("text", DataType::String)]),
        return_type: Some(DataType::String),
        invoke: upper,
    });
    registry.register(BuiltinInfo {
        name: "string.lower",
        signature: Some(vec![param("text", DataType::String)]),
        return_type: Some(DataType::String),
        invoke: lower,
    });
    registry.register(BuiltinInfo {
        name: "string.replace",
        signature: Some(vec![
            param("text", DataType::String),
            param("from", DataType::String),
            param("to", DataType::String),
        ]),
        return_type: Some(DataType::String),
        invoke: replace,
    });
    registry.register(BuiltinInfo {
        name: "string.indexOf",
        signature: Some(vec![
            param("text", DataType::String),
            param("search", DataType::String),
        ]),
        return_type: Some(DataType::Integer),
        invoke: index_of,
    });
    registry.register(BuiltinInfo {
        name: "string.contains",
        signature: Some(vec![
            param("text", DataType::String),
            param("search", DataType::String),
        ]),
        return_type: Some(DataType::Boolean),
        invoke: contains,
    });
    registry.register(BuiltinInfo {
        name: "string.startsWith",
        signature: Some(vec![
            param("text", DataType::String),
            param("prefix", DataType::String),
        ]),
        return_type: Some(DataType::Boolean),
        invoke: starts_with,
    });
    registry.register(BuiltinInfo {
        name: "string.endsWith",
        signature: Some(vec![
            param("text", DataType::String),
            param("suffix", DataType::String),
        ]),
        return_type: Some(DataType::Boolean),
        invoke: ends_with,
    });
}

fn concat(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let a = want_any(&args, 0, "a", line)?;
    let b = want_any(&args, 1, "b", line)?;
    Ok(Some(Value::Str(format!(
        "{}{}",
        a.print_string(),
        b.print_string()
    ))))
}

fn length(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    Ok(Some(Value::Int(text.chars().count() as i32)))
}

/// Code-point slice `[start, end)`; a negative end means "to the end".
fn substring(
    _: &mut Interpreter,
    args: Vec<Value>,
    line: u32,
) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    let start = super::want_int(&args, 1, "start", line)?;
    let end = super::want_int(&args, 2, "end", line)?;
    let count = text.chars().count() as i64;
    if start < 0 || start > count {
        return Err(ScriptError::index(
            format!("substring start {start} out of range for length {count}"),
            line,
        ));
    }
    let end = if end < 0 { count } else { end.min(count) };
    if end < start {
        return Err(ScriptError::index(
            format!("substring end {end} before start {start}"),
            line,
        ));
    }
    let out: String = text
        .chars()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect();
    Ok(Some(Value::Str(out)))
}

fn split(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    let separator = want_str(&args, 1, "separator", line)?;
    let parts: Vec<Value> = if separator.is_empty() {
        text.chars().map(|c| Value::Str(c.to_string())).collect()
    } else {
        text.split(&separator)
            .map(|p| Value::Str(p.to_string()))
            .collect()
    };
    Ok(Some(Value::array(
        crate::interp::value::ArrayValue {
            elem: crate::syntax::types::TypeSpec::Data(DataType::String),
            dims: Vec::new(),
            data: parts,
        },
    )))
}

fn trim(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    Ok(Some(Value::Str(text.trim().to_string())))
}

fn upper(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    Ok(Some(Value::Str(text.to_uppercase())))
}

fn lower(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    Ok(Some(Value::Str(text.to_lowercase())))
}

fn replace(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    let from = want_str(&args, 1, "from", line)?;
    let to = want_str(&args, 2, "to", line)?;
    if from.is_empty() {
        return Ok(Some(Value::Str(text)));
    }
    Ok(Some(Value::Str(text.replace(&from, &to))))
}

fn index_of(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    let search = want_str(&args, 1, "search", line)?;
    let found = match text.find(&search) {
        None => -1i32,
        Some(byte_pos) => text[..byte_pos].chars().count() as i32,
    };
    Ok(Some(Value::Int(found)))
}

fn contains(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    let search = want_str(&args, 1, "search", line)?;
    Ok(Some(Value::Bool(text.contains(&search))))
}

fn starts_with(
    _: &mut Interpreter,
    args: Vec<Value>,
    line: u32,
) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    let prefix = want_str(&args, 1, "prefix", line)?;
    Ok(Some(Value::Bool(text.starts_with(&prefix))))
}

fn ends_with(
    _: &mut Interpreter,
    args: Vec<Value>,
    line: u32,
) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    let suffix = want_str(&args, 1, "suffix", line)?;
    Ok(Some(Value::Bool(text.ends_with(&suffix))))
}
