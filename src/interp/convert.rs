//! Conversion rules: store-time coercion, explicit casts, numeric
//! promotion.
//!
//! Numeric widening follows `byte ⊂ integer ⊂ long ⊂ float ⊂ double`.
//! Narrowing on store only succeeds when the value fits the target range.
//! String⇄Date goes through the ISO form. Boolean never converts
//! implicitly from a number; `bool(x)` is the explicit route.

use crate::interp::exception::ScriptError;
use crate::interp::value::{DateValue, JsonValue, Value};
use crate::syntax::types::{DataType, TypeRegistry, TypeSpec};

/// Coerce `value` for storage into a slot declared as `declared`.
pub fn coerce_for_store(
    value: Value,
    declared: &TypeSpec,
    types: &TypeRegistry,
    line: u32,
) -> Result<Value, ScriptError> {
    // Null stores into anything.
    if matches!(value, Value::Null) {
        return Ok(value);
    }
    let resolved = types
        .resolve(declared)
        .ok_or_else(|| ScriptError::type_err("unknown type alias", line))?;
    let target = resolved.data_type();
    let actual = value.data_type();
    if target == actual {
        if let (TypeSpec::Record(want), Value::Record(have)) = (&resolved, &value) {
            let have = have.borrow();
            let matches = want.fields.len() == have.ty.fields.len()
                && want
                    .fields
                    .iter()
                    .zip(&have.ty.fields)
                    .all(|(a, b)| a.name == b.name);
            if !matches {
                return Err(ScriptError::type_err(
                    "record value does not match the declared field set",
                    line,
                ));
            }
        }
        if let (TypeSpec::Bitmap(want) | TypeSpec::Intmap(want), Value::Bitmap(have) | Value::Intmap(have)) =
            (&resolved, &value)
        {
            if want.fields != have.ty.fields {
                return Err(ScriptError::type_err(
                    "bit-packed value does not match the declared field layout",
                    line,
                ));
            }
        }
        return Ok(value);
    }

    match (target, &value) {
        // Numeric widening, plus range-checked narrowing so literals like
        // `var b: byte = 10;` store cleanly.
        (t, v) if t.is_numeric() && v.data_type().is_numeric() => {
            numeric_convert(v, t, line, false)
        }
        (DataType::Date, Value::Str(s)) => DateValue::parse_iso(s)
            .map(Value::Date)
            .ok_or_else(|| ScriptError::type_err(format!("'{s}' is not an ISO date"), line)),
        (DataType::String, Value::Date(d)) => Ok(Value::Str(d.to_string())),
        (DataType::Json, _) => Ok(Value::json(value.to_json_tree())),
        _ => Err(ScriptError::type_err(
            format!("cannot store {actual} into {target}"),
            line,
        )),
    }
}

/// Explicit `type(expr)` casts over primitives.
pub fn cast(value: &Value, target: DataType, line: u32) -> Result<Value, ScriptError> {
    let actual = value.data_type();
    if actual == target {
        return Ok(value.clone());
    }
    match target {
        t if t.is_numeric() => match value {
            v if v.data_type().is_numeric() => numeric_convert(v, t, line, true),
            Value::Str(s) => {
                let parsed = parse_numeric(s, t);
                parsed.ok_or_else(|| {
                    ScriptError::type_err(format!("cannot parse '{s}' as {t}"), line)
                })
            }
            Value::Bool(b) => numeric_convert(&Value::Int(*b as i32), t, line, true),
            _ => Err(cast_error(actual, target, line)),
        },
        DataType::String => Ok(Value::Str(value.print_string())),
        DataType::Boolean => Ok(Value::Bool(value.truthy())),
        DataType::Date => match value {
            Value::Str(s) => DateValue::parse_iso(s)
                .map(Value::Date)
                .ok_or_else(|| ScriptError::type_err(format!("'{s}' is not an ISO date"), line)),
            _ => Err(cast_error(actual, target, line)),
        },
        DataType::Json => Ok(Value::json(value.to_json_tree())),
        _ => Err(cast_error(actual, target, line)),
    }
}

fn cast_error(from: DataType, to: DataType, line: u32) -> ScriptError {
    ScriptError::type_err(format!("cannot cast {from} to {to}"), line)
}

fn parse_numeric(s: &str, target: DataType) -> Option<Value> {
    let s = s.trim();
    Some(match target {
        DataType::Byte => Value::Byte(s.parse().ok()?),
        DataType::Integer => Value::Int(s.parse().ok()?),
        DataType::Long => Value::Long(s.parse().ok()?),
        DataType::Float => Value::Float(s.parse().ok()?),
        DataType::Double => Value::Double(s.parse().ok()?),
        _ => return None,
    })
}

/// Numeric conversion. `truncate` is the explicit-cast path: float kinds
/// truncate toward zero into integer kinds. On the implicit store path a
/// float source into an integer target is a type error.
fn numeric_convert(
    value: &Value,
    target: DataType,
    line: u32,
    truncate: bool,
) -> Result<Value, ScriptError> {
    let from_float = value.is_float_kind();
    if from_float && !matches!(target, DataType::Float | DataType::Double) && !truncate {
        return Err(ScriptError::type_err(
            format!("cannot implicitly narrow {} to {target}", value.data_type()),
            line,
        ));
    }
    match target {
        DataType::Float => Ok(Value::Float(value.as_f64().unwrap_or(0.0) as f32)),
        DataType::Double => Ok(Value::Double(value.as_f64().unwrap_or(0.0))),
        DataType::Byte | DataType::Integer | DataType::Long => {
            let wide: i64 = if from_float {
                let d = value.as_f64().unwrap_or(0.0);
                if !d.is_finite() || d <= i64::MIN as f64 || d >= i64::MAX as f64 {
                    return Err(ScriptError::num(
                        format!("{d} does not fit in {target}"),
                        line,
                    ));
                }
                d.trunc() as i64
            } else {
                value.as_i64().unwrap_or(0)
            };
            match target {
                DataType::Byte => u8::try_from(wide).map(Value::Byte).map_err(|_| {
                    ScriptError::num(format!("{wide} does not fit in byte"), line)
                }),
                DataType::Integer => i32::try_from(wide).map(Value::Int).map_err(|_| {
                    ScriptError::num(format!("{wide} does not fit in integer"), line)
                }),
                _ => Ok(Value::Long(wide)),
            }
        }
        _ => Err(cast_error(value.data_type(), target, line)),
    }
}

/// Zero value for a resolved type spec, used when a declaration has no
/// initializer. Fixed-size arrays and records are built by the interpreter
/// (dimensions may be expressions); everything else is a plain type-zero.
pub fn primitive_zero(spec: &TypeSpec) -> Value {
    match spec {
        TypeSpec::Data(tag) => Value::zero_for(*tag),
        TypeSpec::SortedMap => Value::map(crate::interp::value::MapValue::new(true)),
        _ => Value::Null,
    }
}

/// Stringify a value the way `print` and string concatenation see it.
pub fn stringify(value: &Value) -> String {
    value.print_string()
}

/// JSON tree → runtime value: objects become JSON-typed values, so field
/// writes keep JSON semantics; numbers keep their integer/double split.
pub fn json_to_value(tree: &JsonValue) -> Value {
    match tree {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Int(v) => {
            if let Ok(small) = i32::try_from(*v) {
                Value::Int(small)
            } else {
                Value::Long(*v)
            }
        }
        JsonValue::Double(d) => Value::Double(*d),
        JsonValue::Str(s) => Value::Str(s.clone()),
        other => Value::json(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_and_checked_narrowing() {
        let reg = TypeRegistry::new();
        let long = TypeSpec::Data(DataType::Long);
        let byte = TypeSpec::Data(DataType::Byte);
        let stored = coerce_for_store(Value::Int(7), &long, &reg, 1).unwrap();
        assert!(matches!(stored, Value::Long(7)));
        let stored = coerce_for_store(Value::Int(10), &byte, &reg, 1).unwrap();
        assert!(matches!(stored, Value::Byte(10)));
        assert!(coerce_for_store(Value::Int(300), &byte, &reg, 1).is_err());
        // Implicit float → integer narrowing is refused.
        let int = TypeSpec::Data(DataType::Integer);
        assert!(coerce_for_store(Value::Double(1.5), &int, &reg, 1).is_err());
    }

    #[test]
    fn explicit_cast_truncates() {
        let v = cast(&Value::Double(3.9), DataType::Integer, 1).unwrap();
        assert!(matches!(v, Value::Int(3)));
        let v = cast(&Value::Double(-3.9), DataType::Integer, 1).unwrap();
        assert!(matches!(v, Value::Int(-3)));
        assert!(cast(&Value::Double(1e20), DataType::Integer, 1).is_err());
    }

    #[test]
    fn string_date_round_trip() {
        let reg = TypeRegistry::new();
        let date_ty = TypeSpec::Data(DataType::Date);
        let stored =
            coerce_for_store(Value::Str("2024-03-01".into()), &date_ty, &reg, 1).unwrap();
        assert!(matches!(stored, Value::Date(_)));
        let text = cast(&stored, DataType::String, 1).unwrap();
        assert!(matches!(&text, Value::Str(s) if s == "2024-03-01"));
    }

    #[test]
    fn boolean_needs_explicit_cast() {
        let reg = TypeRegistry::new();
        let bool_ty = TypeSpec::Data(DataType::Boolean);
        assert!(coerce_for_store(Value::Int(1), &bool_ty, &reg, 1).is_err());
        let v = cast(&Value::Int(1), DataType::Boolean, 1).unwrap();
        assert!(matches!(v, Value::Bool(true)));
    }
}
