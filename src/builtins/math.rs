//! `math.*` builtins. Integer inputs keep integer results where the
//! operation allows it; the float functions work in double.

use crate::interp::Interpreter;
use crate::interp::exception::ScriptError;
use crate::interp::value::Value;
use crate::syntax::types::DataType;

use super::{BuiltinInfo, BuiltinRegistry, param, want_any};

pub(super) fn register(registry: &mut BuiltinRegistry) {
    registry.register(BuiltinInfo {
        name: "math.abs",
        signature: Some(vec![param("value", DataType::Double)]),
        return_type: Some(DataType::Double),
        invoke: abs,
    });
    registry.register(BuiltinInfo {
        name: "math.min",
        signature: Some(vec![
            param("a", DataType::Double),
            param("b", DataType::Double),
        ]),
        return_type: Some(DataType::Double),
        invoke: min,
    });
    registry.register(BuiltinInfo {
        name: "math.max",
        signature: Some(vec![
            param("a", DataType::Double),
            param("b", DataType::Double),
        ]),
        return_type: Some(DataType::Double),
        invoke: max,
    });
    registry.register(BuiltinInfo {
        name: "math.floor",
        signature: Some(vec![param("value", DataType::Double)]),
        return_type: Some(DataType::Double),
        invoke: floor,
    });
    registry.register(BuiltinInfo {
        name: "math.ceil",
        signature: Some(vec![param("value", DataType::Double)]),
        return_type: Some(DataType::Double),
        invoke: ceil,
    });
    registry.register(BuiltinInfo {
        name: "math.round",
        signature: Some(vec![param("value", DataType::Double)]),
        return_type: Some(DataType::Long),
        invoke: round,
    });
    registry.register(BuiltinInfo {
        name: "math.sqrt",
        signature: Some(vec![param("value", DataType::Double)]),
        return_type: Some(DataType::Double),
        invoke: sqrt,
    });
    registry.register(BuiltinInfo {
        name: "math.pow",
        signature: Some(vec![
            param("base", DataType::Double),
            param("exponent", DataType::Double),
        ]),
        return_type: Some(DataType::Double),
        invoke: pow,
    });
}

fn number(args: &[Value], idx: usize, what: &str, line: u32) -> Result<f64, ScriptError> {
    args.get(idx).and_then(Value::as_f64).ok_or_else(|| {
        ScriptError::type_err(format!("{what} must be a number"), line)
    })
}

fn abs(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let value = want_any(&args, 0, "value", line)?;
    Ok(Some(match value {
        Value::Int(i) => Value::Int(i.checked_abs().ok_or_else(|| {
            ScriptError::num("integer overflow in math.abs", line)
        })?),
        Value::Long(l) => Value::Long(l.checked_abs().ok_or_else(|| {
            ScriptError::num("integer overflow in math.abs", line)
        })?),
        Value::Byte(b) => Value::Byte(b),
        Value::Float(f) => Value::Float(f.abs()),
        Value::Double(d) => Value::Double(d.abs()),
        other => {
            return Err(ScriptError::type_err(
                format!("math.abs needs a number, got {}", other.data_type()),
                line,
            ));
        }
    }))
}

fn min(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let a = want_any(&args, 0, "a", line)?;
    let b = want_any(&args, 1, "b", line)?;
    match a.compare(&b) {
        Some(std::cmp::Ordering::Greater) => Ok(Some(b)),
        Some(_) => Ok(Some(a)),
        None => Err(ScriptError::type_err("math.min needs comparable values", line)),
    }
}

fn max(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let a = want_any(&args, 0, "a", line)?;
    let b = want_any(&args, 1, "b", line)?;
    match a.compare(&b) {
        Some(std::cmp::Ordering::Less) => Ok(Some(b)),
        Some(_) => Ok(Some(a)),
        None => Err(ScriptError::type_err("math.max needs comparable values", line)),
    }
}

fn floor(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    Ok(Some(Value::Double(number(&args, 0, "value", line)?.floor())))
}

fn ceil(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    Ok(Some(Value::Double(number(&args, 0, "value", line)?.ceil())))
}

/// Round half away from zero into a long; NaN is a numeric error.
fn round(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let value = number(&args, 0, "value", line)?;
    if value.is_nan() {
        return Err(ScriptError::num("math.round of NaN", line));
    }
    let rounded = value.round();
    if rounded <= i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return Err(ScriptError::num("math.round out of range", line));
    }
    Ok(Some(Value::Long(rounded as i64)))
}

fn sqrt(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    Ok(Some(Value::Double(number(&args, 0, "value", line)?.sqrt())))
}

fn pow(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let base = number(&args, 0, "base", line)?;
    let exponent = number(&args, 1, "exponent", line)?;
    Ok(Some(Value::Double(base.powf(exponent))))
}
