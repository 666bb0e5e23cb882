//! `date.*` builtins. The clock comes from the host so embedders control
//! time in tests.

use chrono::Datelike;

use crate::interp::Interpreter;
use crate::interp::exception::ScriptError;
use crate::interp::value::{DateValue, Value};
use crate::syntax::types::DataType;

use super::{BuiltinInfo, BuiltinRegistry, opt, param, want_date, want_str};

pub(super) fn register(registry: &mut BuiltinRegistry) {
    registry.register(BuiltinInfo {
        name: "date.now",
        signature: Some(vec![]),
        return_type: Some(DataType::Date),
        invoke: now,
    });
    registry.register(BuiltinInfo {
        name: "date.format",
        signature: Some(vec![
            param("value", DataType::Date),
            opt(
                "pattern",
                DataType::String,
                Value::Str("%Y-%m-%d %H:%M:%S".into()),
            ),
        ]),
        return_type: Some(DataType::String),
        invoke: format,
    });
    registry.register(BuiltinInfo {
        name: "date.parse",
        signature: Some(vec![param("text", DataType::String)]),
        return_type: Some(DataType::Date),
        invoke: parse,
    });
    registry.register(BuiltinInfo {
        name: "date.year",
        signature: Some(vec![param("value", DataType::Date)]),
        return_type: Some(DataType::Integer),
        invoke: year,
    });
    registry.register(BuiltinInfo {
        name: "date.month",
        signature: Some(vec![param("value", DataType::Date)]),
        return_type: Some(DataType::Integer),
        invoke: month,
    });
    registry.register(BuiltinInfo {
        name: "date.day",
        signature: Some(vec![param("value", DataType::Date)]),
        return_type: Some(DataType::Integer),
        invoke: day,
    });
    registry.register(BuiltinInfo {
        name: "date.addDays",
        signature: Some(vec![
            param("value", DataType::Date),
            param("days", DataType::Integer),
        ]),
        return_type: Some(DataType::Date),
        invoke: add_days,
    });
    registry.register(BuiltinInfo {
        name: "date.diffDays",
        signature: Some(vec![
            param("a", DataType::Date),
            param("b", DataType::Date),
        ]),
        return_type: Some(DataType::Long),
        invoke: diff_days,
    });
}

fn now(interp: &mut Interpreter, _: Vec<Value>, _: u32) -> Result<Option<Value>, ScriptError> {
    Ok(Some(Value::Date(interp.host.now())))
}

fn format(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let date = want_date(&args, 0, "value", line)?;
    let pattern = want_str(&args, 1, "pattern", line)?;
    Ok(Some(Value::Str(
        date.to_datetime().format(&pattern).to_string(),
    )))
}

fn parse(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let text = want_str(&args, 0, "text", line)?;
    DateValue::parse_iso(&text)
        .map(|d| Some(Value::Date(d)))
        .ok_or_else(|| ScriptError::type_err(format!("'{text}' is not an ISO date"), line))
}

fn year(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let date = want_date(&args, 0, "value", line)?;
    Ok(Some(Value::Int(date.date.year())))
}

fn month(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let date = want_date(&args, 0, "value", line)?;
    Ok(Some(Value::Int(date.date.month() as i32)))
}

fn day(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let date = want_date(&args, 0, "value", line)?;
    Ok(Some(Value::Int(date.date.day() as i32)))
}

fn add_days(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let date = want_date(&args, 0, "value", line)?;
    let days = super::want_int(&args, 1, "days", line)?;
    let shifted = date
        .date
        .checked_add_signed(chrono::Duration::days(days))
        .ok_or_else(|| ScriptError::num("date out of range", line))?;
    Ok(Some(Value::Date(DateValue::new(shifted, date.time))))
}

fn diff_days(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let a = want_date(&args, 0, "a", line)?;
    let b = want_date(&args, 1, "b", line)?;
    Ok(Some(Value::Long(
        a.date.signed_duration_since(b.date).num_days(),
    )))
}
