//! `array.*` builtins. Mutating operations work in place on the shared
//! handle and return it, so calls chain.

use std::cmp::Ordering;

use crate::interp::Interpreter;
use crate::interp::exception::ScriptError;
use crate::interp::value::{ArrayValue, Value};
use crate::syntax::types::{DataType, TypeSpec};

use super::{BuiltinInfo, BuiltinRegistry, opt, param, want_any, want_array};

pub(super) fn register(registry: &mut BuiltinRegistry) {
    registry.register(BuiltinInfo {
        name: "array.sort",
        signature: Some(vec![param("value", DataType::Array)]),
        return_type: Some(DataType::Array),
        invoke: sort,
    });
    registry.register(BuiltinInfo {
        name: "array.push",
        signature: Some(vec![
            param("value", DataType::Array),
            param("item", DataType::Null),
        ]),
        return_type: Some(DataType::Array),
        invoke: push,
    });
    registry.register(BuiltinInfo {
        name: "array.pop",
        signature: Some(vec![param("value", DataType::Array)]),
        return_type: None,
        invoke: pop,
    });
    registry.register(BuiltinInfo {
        name: "array.indexOf",
        signature: Some(vec![
            param("value", DataType::Array),
            param("item", DataType::Null),
        ]),
        return_type: Some(DataType::Integer),
        invoke: index_of,
    });
    registry.register(BuiltinInfo {
        name: "array.contains",
        signature: Some(vec![
            param("value", DataType::Array),
            param("item", DataType::Null),
        ]),
        return_type: Some(DataType::Boolean),
        invoke: contains,
    });
    registry.register(BuiltinInfo {
        name: "array.slice",
        signature: Some(vec![
            param("value", DataType::Array),
            param("start", DataType::Integer),
            opt("end", DataType::Integer, Value::Int(-1)),
        ]),
        return_type: Some(DataType::Array),
        invoke: slice,
    });
    registry.register(BuiltinInfo {
        name: "array.join",
        signature: Some(vec![
            param("value", DataType::Array),
            opt("separator", DataType::String, Value::Str(",".into())),
        ]),
        return_type: Some(DataType::String),
        invoke: join,
    });
    registry.register(BuiltinInfo {
        name: "array.reverse",
        signature: Some(vec![param("value", DataType::Array)]),
        return_type: Some(DataType::Array),
        invoke: reverse,
    });
    registry.register(BuiltinInfo {
        name: "array.asByte",
        signature: Some(vec![param("bits", DataType::Array)]),
        return_type: Some(DataType::Byte),
        invoke: as_byte,
    });
    registry.register(BuiltinInfo {
        name: "array.asBitmap",
        signature: Some(vec![param("value", DataType::Byte)]),
        return_type: Some(DataType::Array),
        invoke: as_bitmap,
    });
}

/// In-place stable sort; incomparable pairs keep their relative order, so
/// sorting twice equals sorting once.
fn sort(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let array = want_array(&args, 0, "value", line)?;
    array
        .borrow_mut()
        .data
        .sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
    Ok(Some(Value::Array(array)))
}

/// Append to a dynamic array and hand the array back.
fn push(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let array = want_array(&args, 0, "value", line)?;
    let item = want_any(&args, 1, "item", line)?;
    {
        let mut array = array.borrow_mut();
        if !array.is_dynamic() {
            return Err(ScriptError::type_err(
                "cannot push into a fixed-size array",
                line,
            ));
        }
        array.data.push(item);
    }
    Ok(Some(Value::Array(array)))
}

fn pop(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let array = want_array(&args, 0, "value", line)?;
    let mut array = array.borrow_mut();
    if !array.is_dynamic() {
        return Err(ScriptError::type_err(
            "cannot pop from a fixed-size array",
            line,
        ));
    }
    array
        .data
        .pop()
        .map(Some)
        .ok_or_else(|| ScriptError::index("pop from an empty array", line))
}

fn index_of(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let array = want_array(&args, 0, "value", line)?;
    let item = want_any(&args, 1, "item", line)?;
    let found = array
        .borrow()
        .data
        .iter()
        .position(|v| v.equals(&item))
        .map(|i| i as i32)
        .unwrap_or(-1);
    Ok(Some(Value::Int(found)))
}

fn contains(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let array = want_array(&args, 0, "value", line)?;
    let item = want_any(&args, 1, "item", line)?;
    let found = array.borrow().data.iter().any(|v| v.equals(&item));
    Ok(Some(Value::Bool(found)))
}

/// New dynamic array over `[start, end)`; a negative end means "to the
/// end".
fn slice(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let array = want_array(&args, 0, "value", line)?;
    let start = super::want_int(&args, 1, "start", line)?;
    let end = super::want_int(&args, 2, "end", line)?;
    let array = array.borrow();
    let len = array.data.len() as i64;
    if start < 0 || start > len {
        return Err(ScriptError::index(
            format!("slice start {start} out of range for length {len}"),
            line,
        ));
    }
    let end = if end < 0 { len } else { end.min(len) };
    if end < start {
        return Err(ScriptError::index(
            format!("slice end {end} before start {start}"),
            line,
        ));
    }
    Ok(Some(Value::array(ArrayValue {
        elem: array.elem.clone(),
        dims: Vec::new(),
        data: array.data[start as usize..end as usize].to_vec(),
    })))
}

fn join(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let array = want_array(&args, 0, "value", line)?;
    let separator = super::want_str(&args, 1, "separator", line)?;
    let joined = array
        .borrow()
        .data
        .iter()
        .map(Value::print_string)
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(Some(Value::Str(joined)))
}

fn reverse(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let array = want_array(&args, 0, "value", line)?;
    array.borrow_mut().data.reverse();
    Ok(Some(Value::Array(array)))
}

/// Pack an array of booleans (or 0/1 integers) into a byte, bit 0 first.
fn as_byte(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let array = want_array(&args, 0, "bits", line)?;
    let array = array.borrow();
    if array.data.len() > 8 {
        return Err(ScriptError::type_err(
            format!("byte packing takes at most 8 bits, got {}", array.data.len()),
            line,
        ));
    }
    let mut out = 0u8;
    for (i, bit) in array.data.iter().enumerate() {
        if bit.truthy() {
            out |= 1 << i;
        }
    }
    Ok(Some(Value::Byte(out)))
}

/// Unpack a byte into an array of 8 booleans, bit 0 first.
fn as_bitmap(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let value = super::want_int(&args, 0, "value", line)?;
    if !(0..=255).contains(&value) {
        return Err(ScriptError::type_err(
            format!("{value} is not a byte value"),
            line,
        ));
    }
    let data = (0..8)
        .map(|i| Value::Bool(value & (1 << i) != 0))
        .collect();
    Ok(Some(Value::array(ArrayValue {
        elem: TypeSpec::Data(DataType::Boolean),
        dims: Vec::new(),
        data,
    })))
}
