//! Embedded SQL support: the connection capability, parameter binding and
//! the row-to-record mapping used by cursors and SELECT expressions.
//!
//! Database drivers stay outside the core; anything that can hand out a
//! `Connection` works. Parameter binding substitutes named `:name` markers
//! (or positional `?` markers) with literal values before the statement is
//! prepared, skipping quoted regions.

pub mod memory;

use std::rc::Rc;

use indexmap::IndexMap;

use crate::interp::value::{RecordValue, Value};
use crate::syntax::types::{DataType, RecordField, RecordType, TypeSpec};

/// One result column: name and value.
pub type Row = Vec<(String, Value)>;

pub type SqlResult<T> = Result<T, String>;

/// Driver-side capability handed out by the host.
pub trait Connection {
    /// Prepare a SELECT and materialize a row iterator.
    fn prepare(&mut self, sql: &str) -> SqlResult<Box<dyn RowCursor>>;
    /// Execute a non-query statement; returns the affected-row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64>;
    fn close(&mut self);
}

/// Lazy row iterator exposed to scripts as `cur.hasNext()` / `cur.next()`.
/// Iteration order is whatever the connection yields.
pub trait RowCursor {
    fn has_next(&mut self) -> SqlResult<bool>;
    fn next(&mut self) -> SqlResult<Row>;
}

/// Substitute `:name` and `?` placeholders with rendered literals. Named
/// and positional markers may not be mixed; unknown names and missing
/// positionals fail.
pub fn bind_sql(
    sql: &str,
    positional: &[Value],
    named: &[(String, Value)],
) -> SqlResult<String> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    // Start of the pending verbatim run; flushed before each substitution.
    let mut copied = 0usize;
    let mut i = 0;
    let mut next_positional = 0usize;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
                i += 1;
            }
            None => match b {
                b'\'' | b'"' => {
                    quote = Some(b);
                    i += 1;
                }
                b'?' => {
                    let value = positional.get(next_positional).ok_or_else(|| {
                        format!("missing value for positional parameter {}", next_positional + 1)
                    })?;
                    next_positional += 1;
                    out.push_str(&sql[copied..i]);
                    out.push_str(&render_literal(value)?);
                    i += 1;
                    copied = i;
                }
                b':' if i + 1 < bytes.len()
                    && (bytes[i + 1].is_ascii_alphabetic() || bytes[i + 1] == b'_') =>
                {
                    let start = i + 1;
                    let mut end = start;
                    while end < bytes.len()
                        && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                    {
                        end += 1;
                    }
                    let name = &sql[start..end];
                    let value = named
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v)
                        .or_else(|| {
                            // A single positional argv also satisfies a lone
                            // named marker, matching `open cur(1)` usage.
                            if named.is_empty() && positional.len() == 1 {
                                positional.first()
                            } else {
                                None
                            }
                        })
                        .ok_or_else(|| format!("missing value for parameter ':{name}'"))?;
                    out.push_str(&sql[copied..i]);
                    out.push_str(&render_literal(value)?);
                    i = end;
                    copied = end;
                }
                _ => {
                    i += 1;
                }
            },
        }
    }
    out.push_str(&sql[copied..]);
    Ok(out)
}

/// Render a value as a SQL literal.
fn render_literal(value: &Value) -> SqlResult<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Byte(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Str(s) => quote_str(s),
        Value::Date(d) => quote_str(&d.to_string()),
        other => return Err(format!("cannot bind {} as a SQL parameter", other.data_type())),
    })
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Build a record from a result row: column names become field names, the
/// value tags become the nearest declared types.
pub fn row_to_record(row: Row) -> Value {
    let fields: Vec<RecordField> = row
        .iter()
        .map(|(name, value)| RecordField {
            name: name.clone(),
            ty: TypeSpec::Data(match value.data_type() {
                DataType::Null => DataType::String,
                tag => tag,
            }),
        })
        .collect();
    let ty = Rc::new(RecordType { fields });
    let fields: IndexMap<String, Value> = row.into_iter().collect();
    Value::record(RecordValue { ty, fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_named_parameters() {
        let sql = bind_sql(
            "select * from t where id = :id and name = :name",
            &[],
            &[
                ("id".to_string(), Value::Int(7)),
                ("name".to_string(), Value::Str("o'neil".into())),
            ],
        )
        .unwrap();
        assert_eq!(sql, "select * from t where id = 7 and name = 'o''neil'");
    }

    #[test]
    fn binds_positional_parameters() {
        let sql = bind_sql("select * from t where a = ? and b = ?", &[Value::Int(1), Value::Int(2)], &[]).unwrap();
        assert_eq!(sql, "select * from t where a = 1 and b = 2");
        assert!(bind_sql("select ?", &[], &[]).is_err());
    }

    #[test]
    fn skips_markers_inside_strings() {
        let sql = bind_sql("select ':id' from t where x = :id", &[], &[("id".into(), Value::Int(3))])
            .unwrap();
        assert_eq!(sql, "select ':id' from t where x = 3");
    }

    #[test]
    fn single_positional_satisfies_named_marker() {
        let sql = bind_sql("select * from t where id = :id", &[Value::Int(5)], &[]).unwrap();
        assert_eq!(sql, "select * from t where id = 5");
    }

    #[test]
    fn rows_become_records() {
        let value = row_to_record(vec![
            ("id".to_string(), Value::Int(1)),
            ("name".to_string(), Value::Str("a".into())),
        ]);
        let Value::Record(rec) = &value else {
            panic!("expected record")
        };
        let rec = rec.borrow();
        assert_eq!(rec.ty.fields[0].name, "id");
        assert!(rec.fields["name"].equals(&Value::Str("a".into())));
    }
}
