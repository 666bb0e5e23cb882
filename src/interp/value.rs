//! Runtime values.
//!
//! Primitives have value semantics. Records, arrays, maps, queues and JSON
//! trees are shared handles (`Rc<RefCell<…>>`): passing one as a parameter
//! or assigning it copies the reference, and `sys.copy` performs the deep
//! duplication. Bit-packed views hold the originating storage cell so field
//! writes propagate back to the variable they were cast from.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use core::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;

use crate::interp::exception::ScriptError;
use crate::syntax::types::{DataType, PackedType, RecordType, TypeSpec};

/// Wall-clock date with optional time of day; no timezone.
#[derive(Debug, Clone, Copy)]
pub struct DateValue {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl DateValue {
    pub fn new(date: NaiveDate, time: Option<NaiveTime>) -> Self {
        DateValue { date, time }
    }

    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        DateValue {
            date: dt.date(),
            time: Some(dt.time()),
        }
    }

    pub fn to_datetime(self) -> NaiveDateTime {
        self.date.and_time(self.time.unwrap_or(NaiveTime::MIN))
    }

    /// ISO form, the same grammar the lexer accepts inside quotes.
    pub fn parse_iso(text: &str) -> Option<DateValue> {
        let (date, time) = crate::lexer::parse_date_literal(text)?;
        Some(DateValue { date, time })
    }
}

impl PartialEq for DateValue {
    fn eq(&self, other: &Self) -> bool {
        self.to_datetime() == other.to_datetime()
    }
}

impl Eq for DateValue {}

impl PartialOrd for DateValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DateValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_datetime().cmp(&other.to_datetime())
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            Some(t) => write!(f, "{} {}", self.date.format("%Y-%m-%d"), t.format("%H:%M:%S")),
            None => write!(f, "{}", self.date.format("%Y-%m-%d")),
        }
    }
}

/// Generic JSON tree. Objects keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Seq(Vec<JsonValue>),
    Obj(IndexMap<String, JsonValue>),
}

impl JsonValue {
    pub fn stringify(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, None, 0);
        out
    }

    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, Some(2), 0);
        out
    }

    fn write(&self, out: &mut String, indent: Option<usize>, depth: usize) {
        let pad = |out: &mut String, depth: usize| {
            if let Some(width) = indent {
                out.push('\n');
                out.push_str(&" ".repeat(width * depth));
            }
        };
        match self {
            JsonValue::Null => out.push_str("null"),
            JsonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            JsonValue::Int(v) => out.push_str(&v.to_string()),
            JsonValue::Double(v) => {
                if v.is_finite() {
                    out.push_str(&v.to_string());
                } else {
                    out.push_str("null");
                }
            }
            JsonValue::Str(s) => write_json_string(out, s),
            JsonValue::Seq(items) => {
                if items.is_empty() {
                    out.push_str("[]");
                    return;
                }
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                        if indent.is_none() {
                            out.push(' ');
                        }
                    }
                    pad(out, depth + 1);
                    item.write(out, indent, depth + 1);
                }
                pad(out, depth);
                out.push(']');
            }
            JsonValue::Obj(map) => {
                if map.is_empty() {
                    out.push_str("{}");
                    return;
                }
                out.push('{');
                for (i, (key, val)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                        if indent.is_none() {
                            out.push(' ');
                        }
                    }
                    pad(out, depth + 1);
                    write_json_string(out, key);
                    out.push(':');
                    if indent.is_some() {
                        out.push(' ');
                    }
                    val.write(out, indent, depth + 1);
                }
                pad(out, depth);
                out.push('}');
            }
        }
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Array storage: row-major data with the declared dimensions. An empty
/// `dims` means a dynamic, growable one-dimensional array.
#[derive(Debug)]
pub struct ArrayValue {
    pub elem: TypeSpec,
    pub dims: Vec<usize>,
    pub data: Vec<Value>,
}

impl ArrayValue {
    pub fn dynamic(elem: TypeSpec) -> Self {
        ArrayValue {
            elem,
            dims: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn rank(&self) -> usize {
        if self.is_dynamic() { 1 } else { self.dims.len() }
    }

    /// Row-major strides for the declared dimensions.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Flat offset of a (possibly multi-dimensional) index vector.
    /// Negative, non-covering and out-of-bounds indexes are INDEX_ERROR.
    pub fn offset(&self, indices: &[i64], line: u32) -> Result<usize, ScriptError> {
        if self.is_dynamic() {
            if indices.len() != 1 {
                return Err(ScriptError::index(
                    format!("expected 1 index, got {}", indices.len()),
                    line,
                ));
            }
            let idx = indices[0];
            if idx < 0 || idx as usize >= self.data.len() {
                return Err(ScriptError::index(
                    format!("index {} out of bounds for length {}", idx, self.data.len()),
                    line,
                ));
            }
            return Ok(idx as usize);
        }
        if indices.len() != self.dims.len() {
            return Err(ScriptError::index(
                format!("expected {} indexes, got {}", self.dims.len(), indices.len()),
                line,
            ));
        }
        let strides = self.strides();
        let mut offset = 0usize;
        for (axis, (&idx, &dim)) in indices.iter().zip(&self.dims).enumerate() {
            if idx < 0 || idx as usize >= dim {
                return Err(ScriptError::index(
                    format!("index {idx} out of bounds for dimension {axis} of size {dim}"),
                    line,
                ));
            }
            offset += idx as usize * strides[axis];
        }
        Ok(offset)
    }
}

/// Record storage: the field set always equals the record type's field set,
/// in declaration order.
#[derive(Debug)]
pub struct RecordValue {
    pub ty: Rc<RecordType>,
    pub fields: IndexMap<String, Value>,
}

/// Map storage: insertion-ordered by default, key-sorted for `sorted map`.
#[derive(Debug, Default)]
pub struct MapValue {
    pub sorted: bool,
    pub entries: IndexMap<String, Value>,
}

impl MapValue {
    pub fn new(sorted: bool) -> Self {
        MapValue {
            sorted,
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, key: String, value: Value) {
        if self.sorted && !self.entries.contains_key(&key) {
            let pos = self
                .entries
                .keys()
                .position(|k| k.as_str() > key.as_str())
                .unwrap_or(self.entries.len());
            self.entries.shift_insert(pos, key, value);
        } else {
            self.entries.insert(key, value);
        }
    }
}

/// FIFO queue.
#[derive(Debug, Default)]
pub struct QueueValue {
    pub items: VecDeque<Value>,
}

/// Bit-packed view over a byte (bitmap) or 32-bit integer (intmap). The
/// cell is the storage the view was cast from; writes go back through it.
#[derive(Debug, Clone)]
pub struct PackedValue {
    pub cell: Rc<RefCell<Value>>,
    pub ty: Rc<PackedType>,
}

impl PackedValue {
    pub fn raw(&self) -> u32 {
        match &*self.cell.borrow() {
            Value::Byte(b) => *b as u32,
            Value::Int(i) => *i as u32,
            Value::Long(l) => *l as u32,
            _ => 0,
        }
    }

    fn store(&self, raw: u32) {
        let mut cell = self.cell.borrow_mut();
        *cell = match &*cell {
            Value::Byte(_) => Value::Byte(raw as u8),
            Value::Long(_) => Value::Long(raw as i64),
            _ => Value::Int(raw as i32),
        };
    }

    /// Read a field as a small unsigned integer; 1-bit fields read 0/1 and
    /// accept boolean writes.
    pub fn get(&self, field: &str, line: u32) -> Result<Value, ScriptError> {
        let f = self
            .ty
            .field(field)
            .ok_or_else(|| ScriptError::name(format!("unknown bit field '{field}'"), line))?;
        let bits = (self.raw() & f.mask()) >> f.start_bit;
        Ok(Value::Int(bits as i32))
    }

    /// Write a field back through the storage cell. Values that do not fit
    /// the bit width are TYPE_ERROR.
    pub fn set(&self, field: &str, value: &Value, line: u32) -> Result<(), ScriptError> {
        let f = self
            .ty
            .field(field)
            .ok_or_else(|| ScriptError::name(format!("unknown bit field '{field}'"), line))?;
        let bits = match value {
            Value::Bool(b) if f.is_boolean() => *b as u32,
            Value::Byte(b) => *b as u32,
            Value::Int(i) if *i >= 0 => *i as u32,
            Value::Long(l) if *l >= 0 => *l as u32,
            other => {
                return Err(ScriptError::type_err(
                    format!("cannot store {} in bit field '{field}'", other.data_type()),
                    line,
                ));
            }
        };
        let width = f.width() as u32;
        let limit = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
        if bits > limit {
            return Err(ScriptError::type_err(
                format!("value {bits} does not fit {width}-bit field '{field}'"),
                line,
            ));
        }
        let raw = (self.raw() & !f.mask()) | (bits << f.start_bit);
        self.store(raw);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Byte(u8),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Date(DateValue),
    Bool(bool),
    Json(Rc<RefCell<JsonValue>>),
    Array(Rc<RefCell<ArrayValue>>),
    Record(Rc<RefCell<RecordValue>>),
    Map(Rc<RefCell<MapValue>>),
    Queue(Rc<RefCell<QueueValue>>),
    Bitmap(PackedValue),
    Intmap(PackedValue),
    Cursor(Rc<str>),
    Connection(Rc<str>),
    Image(Rc<Vec<u8>>),
}

impl Value {
    pub fn json(tree: JsonValue) -> Value {
        Value::Json(Rc::new(RefCell::new(tree)))
    }

    pub fn array(array: ArrayValue) -> Value {
        Value::Array(Rc::new(RefCell::new(array)))
    }

    pub fn record(record: RecordValue) -> Value {
        Value::Record(Rc::new(RefCell::new(record)))
    }

    pub fn map(map: MapValue) -> Value {
        Value::Map(Rc::new(RefCell::new(map)))
    }

    pub fn queue(queue: QueueValue) -> Value {
        Value::Queue(Rc::new(RefCell::new(queue)))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Byte(_) => DataType::Byte,
            Value::Int(_) => DataType::Integer,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Str(_) => DataType::String,
            Value::Date(_) => DataType::Date,
            Value::Bool(_) => DataType::Boolean,
            Value::Json(_) => DataType::Json,
            Value::Array(_) => DataType::Array,
            Value::Record(_) => DataType::Record,
            Value::Map(_) => DataType::Map,
            Value::Queue(_) => DataType::Queue,
            Value::Bitmap(_) => DataType::Bitmap,
            Value::Intmap(_) => DataType::Intmap,
            Value::Cursor(_) => DataType::Cursor,
            Value::Connection(_) => DataType::Connection,
            Value::Image(_) => DataType::Image,
        }
    }

    /// Type-zero used for missing initializers: 0 / 0.0 / false / "" / null.
    pub fn zero_for(tag: DataType) -> Value {
        match tag {
            DataType::Byte => Value::Byte(0),
            DataType::Integer => Value::Int(0),
            DataType::Long => Value::Long(0),
            DataType::Float => Value::Float(0.0),
            DataType::Double => Value::Double(0.0),
            DataType::String => Value::Str(String::new()),
            DataType::Boolean => Value::Bool(false),
            DataType::Json => Value::json(JsonValue::Null),
            DataType::Map => Value::map(MapValue::new(false)),
            DataType::Queue => Value::queue(QueueValue::default()),
            _ => Value::Null,
        }
    }

    /// The one implicit boolean coercion in the language.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Byte(b) => *b != 0,
            Value::Int(i) => *i != 0,
            Value::Long(l) => *l != 0,
            Value::Float(f) => *f != 0.0,
            Value::Double(d) => *d != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.borrow().data.is_empty(),
            Value::Map(m) => !m.borrow().entries.is_empty(),
            Value::Queue(q) => !q.borrow().items.is_empty(),
            // Records (and the remaining handle kinds) are always true.
            _ => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Byte(b) => Some(*b as f64),
            Value::Int(i) => Some(*i as f64),
            Value::Long(l) => Some(*l as f64),
            Value::Float(f) => Some(*f as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(b) => Some(*b as i64),
            Value::Int(i) => Some(*i as i64),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn is_float_kind(&self) -> bool {
        matches!(self, Value::Float(_) | Value::Double(_))
    }

    /// Structural equality with numeric widening. Shared handles compare
    /// equal by identity first, which also keeps cyclic structures safe.
    pub fn equals(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                if a.is_float_kind() || b.is_float_kind() {
                    a.as_f64() == b.as_f64()
                } else {
                    a.as_i64() == b.as_i64()
                }
            }
            (Json(a), Json(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Array(a), Array(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.dims == b.dims
                        && a.data.len() == b.data.len()
                        && a.data.iter().zip(&b.data).all(|(x, y)| x.equals(y))
                }
            }
            (Record(a), Record(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.fields.len() == b.fields.len()
                        && a.fields
                            .iter()
                            .zip(&b.fields)
                            .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
                }
            }
            (Map(a), Map(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.entries.len() == b.entries.len()
                        && a.entries
                            .iter()
                            .zip(&b.entries)
                            .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
                }
            }
            (Queue(a), Queue(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.items.len() == b.items.len()
                        && a.items.iter().zip(&b.items).all(|(x, y)| x.equals(y))
                }
            }
            (Bitmap(a), Bitmap(b)) | (Intmap(a), Intmap(b)) => a.raw() == b.raw(),
            (Cursor(a), Cursor(b)) => a == b,
            (Connection(a), Connection(b)) => a == b,
            (Image(a), Image(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering for the comparison operators; `None` when the operands are
    /// not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (a, b) => {
                if a.is_float_kind() || b.is_float_kind() {
                    a.as_f64()?.partial_cmp(&b.as_f64()?)
                } else {
                    Some(a.as_i64()?.cmp(&b.as_i64()?))
                }
            }
        }
    }

    /// Element count: arrays/maps/queues by entries, strings by code
    /// points, records by field count.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.borrow().data.len()),
            Value::Map(m) => Some(m.borrow().entries.len()),
            Value::Queue(q) => Some(q.borrow().items.len()),
            Value::Record(r) => Some(r.borrow().fields.len()),
            Value::Json(j) => match &*j.borrow() {
                JsonValue::Seq(items) => Some(items.len()),
                JsonValue::Obj(map) => Some(map.len()),
                JsonValue::Str(s) => Some(s.chars().count()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Convert into the JSON tree used by `print`, `json.stringify` and
    /// screen specs. Handle kinds without a JSON form become tag strings.
    pub fn to_json_tree(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Byte(b) => JsonValue::Int(*b as i64),
            Value::Int(i) => JsonValue::Int(*i as i64),
            Value::Long(l) => JsonValue::Int(*l),
            Value::Float(f) => JsonValue::Double(*f as f64),
            Value::Double(d) => JsonValue::Double(*d),
            Value::Str(s) => JsonValue::Str(s.clone()),
            Value::Date(d) => JsonValue::Str(d.to_string()),
            Value::Json(j) => j.borrow().clone(),
            Value::Array(a) => {
                JsonValue::Seq(a.borrow().data.iter().map(Value::to_json_tree).collect())
            }
            Value::Queue(q) => {
                JsonValue::Seq(q.borrow().items.iter().map(Value::to_json_tree).collect())
            }
            Value::Record(r) => JsonValue::Obj(
                r.borrow()
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_tree()))
                    .collect(),
            ),
            Value::Map(m) => JsonValue::Obj(
                m.borrow()
                    .entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_tree()))
                    .collect(),
            ),
            Value::Bitmap(p) | Value::Intmap(p) => JsonValue::Obj(
                p.ty
                    .fields
                    .iter()
                    .map(|f| {
                        let bits = (p.raw() & f.mask()) >> f.start_bit;
                        (f.name.clone(), JsonValue::Int(bits as i64))
                    })
                    .collect(),
            ),
            Value::Cursor(name) => JsonValue::Str(format!("<cursor {name}>")),
            Value::Connection(name) => JsonValue::Str(format!("<connection {name}>")),
            Value::Image(data) => JsonValue::Str(format!("<image {} bytes>", data.len())),
        }
    }

    /// The string `print` emits: structured values pretty-print as JSON,
    /// primitives use their canonical form.
    pub fn print_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Byte(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Long(l) => l.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Str(s) => s.clone(),
            Value::Date(d) => d.to_string(),
            Value::Cursor(name) => format!("<cursor {name}>"),
            Value::Connection(name) => format!("<connection {name}>"),
            Value::Image(data) => format!("<image {} bytes>", data.len()),
            other => other.to_json_tree().pretty(),
        }
    }

    /// Deep duplication. Shared substructure and cycles are reproduced:
    /// every handle is copied once and re-encountering it reuses the copy.
    pub fn deep_copy(&self) -> Value {
        let mut seen: HashMap<usize, Value> = HashMap::new();
        self.copy_inner(&mut seen)
    }

    fn copy_inner(&self, seen: &mut HashMap<usize, Value>) -> Value {
        match self {
            Value::Json(j) => {
                let key = Rc::as_ptr(j) as usize;
                if let Some(copy) = seen.get(&key) {
                    return copy.clone();
                }
                let copy = Value::json(j.borrow().clone());
                seen.insert(key, copy.clone());
                copy
            }
            Value::Array(a) => {
                let key = Rc::as_ptr(a) as usize;
                if let Some(copy) = seen.get(&key) {
                    return copy.clone();
                }
                let src = a.borrow();
                let handle = Rc::new(RefCell::new(ArrayValue {
                    elem: src.elem.clone(),
                    dims: src.dims.clone(),
                    data: Vec::with_capacity(src.data.len()),
                }));
                seen.insert(key, Value::Array(Rc::clone(&handle)));
                let data = src.data.iter().map(|v| v.copy_inner(seen)).collect();
                handle.borrow_mut().data = data;
                Value::Array(handle)
            }
            Value::Record(r) => {
                let key = Rc::as_ptr(r) as usize;
                if let Some(copy) = seen.get(&key) {
                    return copy.clone();
                }
                let src = r.borrow();
                let handle = Rc::new(RefCell::new(RecordValue {
                    ty: Rc::clone(&src.ty),
                    fields: IndexMap::new(),
                }));
                seen.insert(key, Value::Record(Rc::clone(&handle)));
                let fields = src
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.copy_inner(seen)))
                    .collect();
                handle.borrow_mut().fields = fields;
                Value::Record(handle)
            }
            Value::Map(m) => {
                let key = Rc::as_ptr(m) as usize;
                if let Some(copy) = seen.get(&key) {
                    return copy.clone();
                }
                let src = m.borrow();
                let handle = Rc::new(RefCell::new(MapValue::new(src.sorted)));
                seen.insert(key, Value::Map(Rc::clone(&handle)));
                let entries: IndexMap<String, Value> = src
                    .entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.copy_inner(seen)))
                    .collect();
                handle.borrow_mut().entries = entries;
                Value::Map(handle)
            }
            Value::Queue(q) => {
                let key = Rc::as_ptr(q) as usize;
                if let Some(copy) = seen.get(&key) {
                    return copy.clone();
                }
                let src = q.borrow();
                let handle = Rc::new(RefCell::new(QueueValue::default()));
                seen.insert(key, Value::Queue(Rc::clone(&handle)));
                let items = src.items.iter().map(|v| v.copy_inner(seen)).collect();
                handle.borrow_mut().items = items;
                Value::Queue(handle)
            }
            Value::Bitmap(p) => Value::Bitmap(PackedValue {
                cell: Rc::new(RefCell::new(p.cell.borrow().clone())),
                ty: Rc::clone(&p.ty),
            }),
            Value::Intmap(p) => Value::Intmap(PackedValue {
                cell: Rc::new(RefCell::new(p.cell.borrow().clone())),
                ty: Rc::clone(&p.ty),
            }),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::types::BitField;

    #[test]
    fn truthiness_table() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Bool(true).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Long(0).truthy());
        assert!(!Value::Byte(0).truthy());
        assert!(!Value::Double(-0.0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(Value::Str("x".into()).truthy());
        assert!(!Value::array(ArrayValue::dynamic(TypeSpec::Data(DataType::Integer))).truthy());
        assert!(!Value::map(MapValue::new(false)).truthy());
        assert!(!Value::queue(QueueValue::default()).truthy());
        // Records are always true, even empty ones.
        let rec = Value::record(RecordValue {
            ty: Rc::new(RecordType { fields: vec![] }),
            fields: IndexMap::new(),
        });
        assert!(rec.truthy());
    }

    #[test]
    fn reference_semantics_and_deep_copy() {
        let a = Value::array(ArrayValue::dynamic(TypeSpec::Data(DataType::Integer)));
        let b = a.clone();
        if let Value::Array(handle) = &a {
            handle.borrow_mut().data.push(Value::Int(1));
        }
        assert_eq!(b.length(), Some(1));

        let copy = a.deep_copy();
        if let Value::Array(handle) = &a {
            handle.borrow_mut().data.push(Value::Int(2));
        }
        assert_eq!(a.length(), Some(2));
        assert_eq!(copy.length(), Some(1));
    }

    #[test]
    fn deep_copy_reproduces_cycles() {
        let rec = Rc::new(RefCell::new(RecordValue {
            ty: Rc::new(RecordType { fields: vec![] }),
            fields: IndexMap::new(),
        }));
        rec.borrow_mut()
            .fields
            .insert("self".into(), Value::Record(Rc::clone(&rec)));
        let copy = Value::Record(rec).deep_copy();
        let Value::Record(copy_rc) = &copy else {
            panic!("expected record");
        };
        let inner = copy_rc.borrow().fields["self"].clone();
        let Value::Record(inner_rc) = inner else {
            panic!("expected record");
        };
        assert!(Rc::ptr_eq(copy_rc, &inner_rc));
    }

    #[test]
    fn packed_view_writes_through() {
        let ty = Rc::new(PackedType {
            fields: vec![
                BitField {
                    name: "ready".into(),
                    start_bit: 0,
                    end_bit: 0,
                },
                BitField {
                    name: "prio".into(),
                    start_bit: 1,
                    end_bit: 3,
                },
            ],
            max_bit: 7,
        });
        let cell = Rc::new(RefCell::new(Value::Byte(0b0000_1010)));
        let view = PackedValue {
            cell: Rc::clone(&cell),
            ty,
        };
        assert!(view.get("ready", 1).unwrap().equals(&Value::Int(0)));
        assert!(view.get("prio", 1).unwrap().equals(&Value::Int(5)));
        view.set("prio", &Value::Int(7), 1).unwrap();
        assert!(matches!(&*cell.borrow(), Value::Byte(14)));
        assert!(view.set("prio", &Value::Int(8), 1).is_err());
    }

    #[test]
    fn sorted_map_orders_keys() {
        let mut m = MapValue::new(true);
        m.insert("b".into(), Value::Int(2));
        m.insert("a".into(), Value::Int(1));
        m.insert("c".into(), Value::Int(3));
        let keys: Vec<_> = m.entries.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn multi_dim_offsets_are_row_major() {
        let arr = ArrayValue {
            elem: TypeSpec::Data(DataType::Integer),
            dims: vec![2, 3],
            data: vec![Value::Int(0); 6],
        };
        assert_eq!(arr.strides(), vec![3, 1]);
        assert_eq!(arr.offset(&[0, 0], 1).unwrap(), 0);
        assert_eq!(arr.offset(&[1, 2], 1).unwrap(), 5);
        assert!(arr.offset(&[-1, 0], 1).is_err());
        assert!(arr.offset(&[0, 3], 1).is_err());
        assert!(arr.offset(&[0], 1).is_err());
    }

    #[test]
    fn stringify_round_trip_shapes() {
        let mut obj = IndexMap::new();
        obj.insert("a".to_string(), JsonValue::Int(1));
        obj.insert(
            "b".to_string(),
            JsonValue::Seq(vec![JsonValue::Bool(true), JsonValue::Null]),
        );
        let tree = JsonValue::Obj(obj);
        assert_eq!(tree.stringify(), r#"{"a":1, "b":[true, null]}"#);
    }
}
