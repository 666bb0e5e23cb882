//! In-memory connection.
//!
//! A toy table store satisfying the `Connection` capability, enough to
//! exercise cursor semantics without a driver: `SELECT col, … FROM table
//! [WHERE col = literal [AND …]]`, case-insensitive keywords. Rows are
//! loaded by the embedder.

use std::collections::HashMap;

use crate::interp::value::Value;

use super::{Connection, Row, RowCursor, SqlResult};

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Default)]
pub struct MemoryConnection {
    tables: HashMap<String, Table>,
    closed: bool,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.tables.insert(
            name.to_lowercase(),
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        self
    }
}

impl Connection for MemoryConnection {
    fn prepare(&mut self, sql: &str) -> SqlResult<Box<dyn RowCursor>> {
        if self.closed {
            return Err("connection is closed".to_string());
        }
        let query = SelectQuery::parse(sql)?;
        let table = self
            .tables
            .get(&query.table)
            .ok_or_else(|| format!("unknown table '{}'", query.table))?;
        let col_index = |name: &str| -> SqlResult<usize> {
            table
                .columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
                .ok_or_else(|| format!("unknown column '{name}'"))
        };
        let selected: Vec<(String, usize)> = match &query.columns {
            None => table
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), i))
                .collect(),
            Some(cols) => cols
                .iter()
                .map(|c| Ok((c.clone(), col_index(c)?)))
                .collect::<SqlResult<_>>()?,
        };
        let filters: Vec<(usize, Value)> = query
            .filters
            .iter()
            .map(|(col, val)| Ok((col_index(col)?, val.clone())))
            .collect::<SqlResult<_>>()?;

        let rows: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| filters.iter().all(|(idx, want)| row[*idx].equals(want)))
            .map(|row| {
                selected
                    .iter()
                    .map(|(name, idx)| (name.clone(), row[*idx].clone()))
                    .collect()
            })
            .collect();
        Ok(Box::new(MemoryCursor { rows, pos: 0 }))
    }

    fn execute(&mut self, sql: &str, _params: &[Value]) -> SqlResult<u64> {
        if self.closed {
            return Err("connection is closed".to_string());
        }
        Err(format!("unsupported statement: {sql}"))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

struct MemoryCursor {
    rows: Vec<Row>,
    pos: usize,
}

impl RowCursor for MemoryCursor {
    fn has_next(&mut self) -> SqlResult<bool> {
        Ok(self.pos < self.rows.len())
    }

    fn next(&mut self) -> SqlResult<Row> {
        if self.pos >= self.rows.len() {
            return Err("cursor is exhausted".to_string());
        }
        let row = self.rows[self.pos].clone();
        self.pos += 1;
        Ok(row)
    }
}

struct SelectQuery {
    columns: Option<Vec<String>>,
    table: String,
    filters: Vec<(String, Value)>,
}

impl SelectQuery {
    fn parse(sql: &str) -> SqlResult<SelectQuery> {
        let mut words = Words::new(sql);
        words.expect_keyword("select")?;
        let mut columns = Vec::new();
        let all = if words.eat("*") {
            true
        } else {
            loop {
                columns.push(words.ident()?);
                if !words.eat(",") {
                    break;
                }
            }
            false
        };
        words.expect_keyword("from")?;
        let table = words.ident()?.to_lowercase();
        let mut filters = Vec::new();
        if words.eat_keyword("where") {
            loop {
                let col = words.ident()?;
                if !words.eat("=") {
                    return Err("only equality filters are supported".to_string());
                }
                filters.push((col, words.literal()?));
                if !words.eat_keyword("and") {
                    break;
                }
            }
        }
        if let Some(rest) = words.remainder() {
            return Err(format!("unsupported SQL tail: {rest}"));
        }
        Ok(SelectQuery {
            columns: if all { None } else { Some(columns) },
            table,
            filters,
        })
    }
}

/// Minimal SQL word scanner.
struct Words<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Words<'a> {
    fn new(text: &'a str) -> Self {
        Words { text, pos: 0 }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.text.len()
            && self.text.as_bytes()[self.pos].is_ascii_whitespace()
        {
            self.pos += 1;
        }
    }

    fn peek_word(&mut self) -> Option<&'a str> {
        self.skip_ws();
        if self.pos >= self.text.len() {
            return None;
        }
        let bytes = self.text.as_bytes();
        let start = self.pos;
        let b = bytes[start];
        let end = if b.is_ascii_alphanumeric() || b == b'_' {
            let mut end = start;
            while end < self.text.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_' || bytes[end] == b'.')
            {
                end += 1;
            }
            end
        } else {
            start + 1
        };
        Some(&self.text[start..end])
    }

    fn bump(&mut self, word: &str) {
        self.pos += word.len();
    }

    fn eat(&mut self, symbol: &str) -> bool {
        match self.peek_word() {
            Some(w) if w == symbol => {
                self.bump(w);
                true
            }
            _ => false,
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek_word() {
            Some(w) if w.eq_ignore_ascii_case(keyword) => {
                self.bump(w);
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> SqlResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(format!("expected '{keyword}'"))
        }
    }

    fn ident(&mut self) -> SqlResult<String> {
        match self.peek_word() {
            Some(w)
                if w.as_bytes()[0].is_ascii_alphabetic() || w.as_bytes()[0] == b'_' =>
            {
                self.bump(w);
                Ok(w.to_string())
            }
            _ => Err("expected identifier".to_string()),
        }
    }

    fn literal(&mut self) -> SqlResult<Value> {
        self.skip_ws();
        let bytes = self.text.as_bytes();
        if self.pos >= self.text.len() {
            return Err("expected literal".to_string());
        }
        if bytes[self.pos] == b'\'' {
            let mut out = String::new();
            let mut i = self.pos + 1;
            while i < self.text.len() {
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        out.push('\'');
                        i += 2;
                        continue;
                    }
                    self.pos = i + 1;
                    return Ok(Value::Str(out));
                }
                out.push(bytes[i] as char);
                i += 1;
            }
            return Err("unterminated string literal".to_string());
        }
        let word = self.peek_word().ok_or("expected literal")?;
        self.bump(word);
        if word.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }
        if word.eq_ignore_ascii_case("true") {
            return Ok(Value::Bool(true));
        }
        if word.eq_ignore_ascii_case("false") {
            return Ok(Value::Bool(false));
        }
        if word == "-" {
            let next = self.peek_word().ok_or("expected number")?;
            self.bump(next);
            return parse_number(&format!("-{next}"));
        }
        parse_number(word)
    }

    fn remainder(&mut self) -> Option<&'a str> {
        self.skip_ws();
        if self.pos < self.text.len() {
            Some(self.text[self.pos..].trim())
        } else {
            None
        }
    }
}

fn parse_number(word: &str) -> SqlResult<Value> {
    if word.contains('.') {
        word.parse::<f64>()
            .map(Value::Double)
            .map_err(|_| format!("malformed number '{word}'"))
    } else {
        word.parse::<i64>()
            .map(|v| {
                i32::try_from(v)
                    .map(Value::Int)
                    .unwrap_or(Value::Long(v))
            })
            .map_err(|_| format!("malformed number '{word}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryConnection {
        MemoryConnection::new().with_table(
            "users",
            &["id", "name"],
            vec![
                vec![Value::Int(1), Value::Str("ada".into())],
                vec![Value::Int(2), Value::Str("grace".into())],
            ],
        )
    }

    #[test]
    fn select_star() {
        let mut conn = sample();
        let mut cur = conn.prepare("select * from users").unwrap();
        let mut count = 0;
        while cur.has_next().unwrap() {
            let row = cur.next().unwrap();
            assert_eq!(row.len(), 2);
            count += 1;
        }
        assert_eq!(count, 2);
        assert!(cur.next().is_err());
    }

    #[test]
    fn select_with_filter_and_projection() {
        let mut conn = sample();
        let mut cur = conn
            .prepare("SELECT name FROM users WHERE id = 2")
            .unwrap();
        assert!(cur.has_next().unwrap());
        let row = cur.next().unwrap();
        assert_eq!(row[0].0, "name");
        assert!(row[0].1.equals(&Value::Str("grace".into())));
        assert!(!cur.has_next().unwrap());
    }

    #[test]
    fn errors_surface() {
        let mut conn = sample();
        assert!(conn.prepare("select * from missing").is_err());
        assert!(conn.prepare("select nope from users").is_err());
        conn.close();
        assert!(conn.prepare("select * from users").is_err());
    }
}
