//! Expression evaluation and lvalue writes.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::syntax::expressions::{
    BinaryOp, CallExpr, CallTarget, CompareOp, Expression, Lit, UnaryOp,
};
use crate::syntax::types::{ArrayDim, DataType, RecordType, TypeSpec};

use super::convert;
use super::exception::ScriptError;
use super::value::{
    ArrayValue, DateValue, JsonValue, MapValue, PackedValue, QueueValue, RecordValue, Value,
};
use super::Interpreter;

impl Interpreter {
    pub(crate) fn eval(&mut self, expr: &Expression) -> Result<Value, ScriptError> {
        match expr {
            Expression::Literal { value, .. } => Ok(match value {
                Lit::Int(v) => Value::Int(*v),
                Lit::Long(v) => Value::Long(*v),
                Lit::Float(v) => Value::Float(*v),
                Lit::Double(v) => Value::Double(*v),
                Lit::Str(s) => Value::Str(s.clone()),
                Lit::Date(d, t) => Value::Date(DateValue::new(*d, *t)),
                Lit::Bool(b) => Value::Bool(*b),
                Lit::Null => Value::Null,
            }),

            Expression::Variable { path, line } => self.eval_variable(path, *line),

            Expression::Property { base, field, line } => {
                let base = self.eval(base)?;
                self.read_property(&base, field, *line)
            }

            Expression::Index {
                base,
                indices,
                line,
            } => {
                let base = self.eval(base)?;
                let mut idx = Vec::with_capacity(indices.len());
                for index in indices {
                    idx.push(self.eval(index)?);
                }
                self.read_index(&base, &idx, *line)
            }

            Expression::Length { value, line } => {
                let value = self.eval(value)?;
                value
                    .length()
                    .map(|n| Value::Int(n as i32))
                    .ok_or_else(|| {
                        ScriptError::type_err(
                            format!("{} has no length", value.data_type()),
                            *line,
                        )
                    })
            }

            Expression::Unary { op, operand, line } => {
                let value = self.eval(operand)?;
                eval_unary(*op, &value, *line)
            }

            Expression::Binary {
                op,
                left,
                right,
                line,
            } => match op {
                // && and || short-circuit on truthiness.
                BinaryOp::And => {
                    let left = self.eval(left)?;
                    if !left.truthy() {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(self.eval(right)?.truthy()))
                }
                BinaryOp::Or => {
                    let left = self.eval(left)?;
                    if left.truthy() {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(self.eval(right)?.truthy()))
                }
                _ => {
                    let left = self.eval(left)?;
                    let right = self.eval(right)?;
                    eval_binary(*op, &left, &right, *line)
                }
            },

            // Evaluate every operand once, then scan left to right.
            Expression::Chained {
                operands,
                ops,
                line,
            } => {
                let mut values = Vec::with_capacity(operands.len());
                for operand in operands {
                    values.push(self.eval(operand)?);
                }
                for (i, op) in ops.iter().enumerate() {
                    if !compare(&values[i], &values[i + 1], *op, *line)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }

            Expression::Call(call) => Ok(self.exec_call(call)?.unwrap_or(Value::Null)),

            Expression::Cast { ty, value, line } => self.eval_cast(ty, value, *line),

            Expression::ArrayLiteral { elements, .. } => {
                let mut data = Vec::with_capacity(elements.len());
                for element in elements {
                    data.push(self.eval(element)?);
                }
                let elem = data
                    .first()
                    .map(|v| TypeSpec::Data(v.data_type()))
                    .unwrap_or(TypeSpec::Data(DataType::Null));
                Ok(Value::array(ArrayValue {
                    elem,
                    dims: Vec::new(),
                    data,
                }))
            }

            Expression::ArrayAlloc { spec, line } => {
                let resolved = self.resolve_spec(spec, *line)?;
                self.zero_value(&resolved, *line)
            }

            Expression::QueueAlloc { spec, line } => {
                let resolved = self.resolve_spec(spec, *line)?;
                self.zero_value(&resolved, *line)
            }

            Expression::JsonLiteral { raw, offset, line } => {
                let tree = self.parse_json_slice(raw, *offset, *line, false)?;
                Ok(Value::json(tree))
            }

            Expression::RecordLiteral {
                alias,
                raw,
                offset,
                line,
            } => {
                let resolved = self.resolve_spec(&TypeSpec::Alias(alias.clone()), *line)?;
                let TypeSpec::Record(rt) = &resolved else {
                    return Err(ScriptError::type_err(
                        format!("'{alias}' is not a record type"),
                        *line,
                    ));
                };
                let tree = self.parse_json_slice(raw, *offset, *line, false)?;
                self.record_from_json(rt, &tree, *line)
            }

            Expression::SqlSelect { raw, line } => self.run_select(raw, *line),

            Expression::CursorHasNext { cursor, line } => {
                Ok(Value::Bool(self.cursor_has_next(cursor, *line)?))
            }
            Expression::CursorNext { cursor, line } => self.cursor_next(cursor, *line),
        }
    }

    fn eval_variable(&mut self, path: &[String], line: u32) -> Result<Value, ScriptError> {
        let first = path[0].as_str();
        if let Some(slot) = self.lookup(first) {
            let mut value = slot.get();
            for segment in &path[1..] {
                value = self.read_property(&value, segment, line)?;
            }
            return Ok(value);
        }
        // Screen-scoped names: `screenName.varName` reads host UI state.
        if path.len() == 2 && self.screens.contains(first) {
            return self
                .host
                .get_screen_var(first, &path[1])
                .map_err(|msg| ScriptError::name(msg, line));
        }
        if path.len() == 1 {
            if self.cursor_declared(first) {
                return Ok(Value::Cursor(Rc::from(first)));
            }
            if self.connection_known(first) {
                return Ok(Value::Connection(Rc::from(first)));
            }
        }
        Err(ScriptError::name(
            format!("undefined variable '{first}'"),
            line,
        ))
    }

    pub(crate) fn read_property(
        &mut self,
        base: &Value,
        field: &str,
        line: u32,
    ) -> Result<Value, ScriptError> {
        match base {
            // Missing fields read as null.
            Value::Record(rec) => Ok(rec.borrow().fields.get(field).cloned().unwrap_or(Value::Null)),
            Value::Map(map) => Ok(map.borrow().entries.get(field).cloned().unwrap_or(Value::Null)),
            Value::Json(tree) => match &*tree.borrow() {
                JsonValue::Obj(map) => Ok(map
                    .get(field)
                    .map(convert::json_to_value)
                    .unwrap_or(Value::Null)),
                _ => Err(ScriptError::type_err(
                    format!("cannot read field '{field}' of this JSON value"),
                    line,
                )),
            },
            Value::Bitmap(packed) | Value::Intmap(packed) => packed.get(field, line),
            other => Err(ScriptError::type_err(
                format!("cannot read field '{field}' of {}", other.data_type()),
                line,
            )),
        }
    }

    fn read_index(
        &mut self,
        base: &Value,
        indices: &[Value],
        line: u32,
    ) -> Result<Value, ScriptError> {
        match base {
            Value::Array(array) => {
                let array = array.borrow();
                let idx = int_indices(indices, line)?;
                let offset = array.offset(&idx, line)?;
                Ok(array.data[offset].clone())
            }
            Value::Map(map) => match indices {
                [Value::Str(key)] => {
                    Ok(map.borrow().entries.get(key).cloned().unwrap_or(Value::Null))
                }
                _ => Err(ScriptError::index("map index must be a single string", line)),
            },
            Value::Json(tree) => match (&*tree.borrow(), indices) {
                (JsonValue::Seq(items), _) => {
                    let idx = int_indices(indices, line)?;
                    if idx.len() != 1 || idx[0] < 0 || idx[0] as usize >= items.len() {
                        return Err(ScriptError::index(
                            format!("JSON index out of bounds for length {}", items.len()),
                            line,
                        ));
                    }
                    Ok(convert::json_to_value(&items[idx[0] as usize]))
                }
                (JsonValue::Obj(map), [Value::Str(key)]) => Ok(map
                    .get(key)
                    .map(convert::json_to_value)
                    .unwrap_or(Value::Null)),
                _ => Err(ScriptError::index("cannot index this JSON value", line)),
            },
            other => Err(ScriptError::type_err(
                format!("cannot index a {}", other.data_type()),
                line,
            )),
        }
    }

    fn eval_cast(
        &mut self,
        ty: &TypeSpec,
        value: &Expression,
        line: u32,
    ) -> Result<Value, ScriptError> {
        let resolved = self.resolve_spec(ty, line)?;
        match &resolved {
            // Bit-pack casts are views: cast over a plain variable shares
            // its storage cell, so field writes propagate back.
            TypeSpec::Bitmap(packed) | TypeSpec::Intmap(packed) => {
                let is_bitmap = matches!(&resolved, TypeSpec::Bitmap(_));
                let cell = match value {
                    Expression::Variable { path, .. } if path.len() == 1 => {
                        match self.lookup(&path[0]) {
                            Some(slot) => {
                                let backing = slot.get();
                                check_backing(&backing, is_bitmap, line)?;
                                slot.cell
                            }
                            None => return Err(ScriptError::name(
                                format!("undefined variable '{}'", path[0]),
                                line,
                            )),
                        }
                    }
                    other => {
                        let backing = self.eval(other)?;
                        check_backing(&backing, is_bitmap, line)?;
                        Rc::new(RefCell::new(backing))
                    }
                };
                let view = PackedValue {
                    cell,
                    ty: Rc::new(packed.clone()),
                };
                Ok(if is_bitmap {
                    Value::Bitmap(view)
                } else {
                    Value::Intmap(view)
                })
            }
            TypeSpec::Record(rt) => {
                let value = self.eval(value)?;
                match value {
                    Value::Json(tree) => {
                        let tree = tree.borrow().clone();
                        self.record_from_json(rt, &tree, line)
                    }
                    Value::Record(_) => {
                        convert::coerce_for_store(value, &resolved, &self.types, line)
                    }
                    other => Err(ScriptError::type_err(
                        format!("cannot cast {} to record", other.data_type()),
                        line,
                    )),
                }
            }
            TypeSpec::Data(tag) => {
                let value = self.eval(value)?;
                convert::cast(&value, *tag, line)
            }
            _ => Err(ScriptError::type_err("unsupported cast target", line)),
        }
    }

    // ----- construction helpers ---------------------------------------------

    /// Zero value for a resolved type: fixed arrays allocate their full
    /// row-major extent, records zero each field recursively.
    pub(crate) fn zero_value(&mut self, spec: &TypeSpec, line: u32) -> Result<Value, ScriptError> {
        let resolved = self.resolve_spec(spec, line)?;
        Ok(match &resolved {
            TypeSpec::Record(rt) => {
                let rt = rt.clone();
                let mut fields = IndexMap::new();
                for field in &rt.fields {
                    fields.insert(field.name.clone(), self.zero_value(&field.ty, line)?);
                }
                Value::record(RecordValue {
                    ty: Rc::new(rt),
                    fields,
                })
            }
            TypeSpec::Bitmap(packed) => Value::Bitmap(PackedValue {
                cell: Rc::new(RefCell::new(Value::Byte(0))),
                ty: Rc::new(packed.clone()),
            }),
            TypeSpec::Intmap(packed) => Value::Intmap(PackedValue {
                cell: Rc::new(RefCell::new(Value::Int(0))),
                ty: Rc::new(packed.clone()),
            }),
            TypeSpec::Array { elem, dims } => {
                if dims.is_empty() || dims.iter().any(|d| matches!(d, ArrayDim::Dynamic)) {
                    Value::array(ArrayValue::dynamic((**elem).clone()))
                } else {
                    let mut extents = Vec::with_capacity(dims.len());
                    for dim in dims {
                        let ArrayDim::Fixed(expr) = dim else {
                            unreachable!("dynamic dims handled above")
                        };
                        let n = self.eval(expr)?.as_i64().ok_or_else(|| {
                            ScriptError::type_err("array dimension must be an integer", line)
                        })?;
                        if n < 0 {
                            return Err(ScriptError::index(
                                format!("negative array dimension {n}"),
                                line,
                            ));
                        }
                        extents.push(n as usize);
                    }
                    let total: usize = extents.iter().product();
                    let mut data = Vec::with_capacity(total);
                    for _ in 0..total {
                        data.push(self.zero_value(elem, line)?);
                    }
                    Value::array(ArrayValue {
                        elem: (**elem).clone(),
                        dims: extents,
                        data,
                    })
                }
            }
            TypeSpec::Queue(_) => Value::queue(QueueValue::default()),
            other => convert::primitive_zero(other),
        })
    }

    /// Build a record of shape `rt` from a JSON object. Missing fields
    /// default to type-zero; unknown keys are a type error.
    pub(crate) fn record_from_json(
        &mut self,
        rt: &RecordType,
        tree: &JsonValue,
        line: u32,
    ) -> Result<Value, ScriptError> {
        let JsonValue::Obj(map) = tree else {
            return Err(ScriptError::type_err(
                "record initializer must be a JSON object",
                line,
            ));
        };
        for key in map.keys() {
            if rt.field(key).is_none() {
                return Err(ScriptError::type_err(
                    format!("unknown record field '{key}'"),
                    line,
                ));
            }
        }
        let mut fields = IndexMap::new();
        for field in &rt.fields {
            let resolved = self.resolve_spec(&field.ty, line)?;
            let value = match map.get(&field.name) {
                None => self.zero_value(&resolved, line)?,
                Some(sub) => match &resolved {
                    TypeSpec::Record(sub_rt) => {
                        let sub_rt = sub_rt.clone();
                        self.record_from_json(&sub_rt, sub, line)?
                    }
                    TypeSpec::Array { elem, .. } => {
                        let JsonValue::Seq(items) = sub else {
                            return Err(ScriptError::type_err(
                                format!("field '{}' expects an array", field.name),
                                line,
                            ));
                        };
                        let elem = (**elem).clone();
                        let mut data = Vec::with_capacity(items.len());
                        for item in items {
                            let value = self.value_from_json_for(&elem, item, line)?;
                            data.push(value);
                        }
                        Value::array(ArrayValue {
                            elem,
                            dims: Vec::new(),
                            data,
                        })
                    }
                    _ => {
                        let raw = convert::json_to_value(sub);
                        self.coerce_declared(raw, &resolved, line)?
                    }
                },
            };
            fields.insert(field.name.clone(), value);
        }
        Ok(Value::record(RecordValue {
            ty: Rc::new(rt.clone()),
            fields,
        }))
    }

    fn value_from_json_for(
        &mut self,
        spec: &TypeSpec,
        tree: &JsonValue,
        line: u32,
    ) -> Result<Value, ScriptError> {
        let resolved = self.resolve_spec(spec, line)?;
        match &resolved {
            TypeSpec::Record(rt) => {
                let rt = rt.clone();
                self.record_from_json(&rt, tree, line)
            }
            _ => {
                let raw = convert::json_to_value(tree);
                self.coerce_declared(raw, &resolved, line)
            }
        }
    }

    /// Build a map value from a JSON object initializer.
    pub(crate) fn map_from_json(
        &mut self,
        tree: &JsonValue,
        sorted: bool,
        line: u32,
    ) -> Result<Value, ScriptError> {
        let JsonValue::Obj(obj) = tree else {
            return Err(ScriptError::type_err(
                "map initializer must be a JSON object",
                line,
            ));
        };
        let mut map = MapValue::new(sorted);
        for (key, sub) in obj {
            map.insert(key.clone(), convert::json_to_value(sub));
        }
        Ok(Value::map(map))
    }

    // ----- calls ------------------------------------------------------------

    /// Run a call site: user block, builtin, or late-resolved name.
    pub(crate) fn exec_call(&mut self, call: &CallExpr) -> Result<Option<Value>, ScriptError> {
        self.check_cancelled(call.line)?;
        match call.target {
            CallTarget::Block => self.call_user_block(call),
            CallTarget::Builtin => self.call_registered_builtin(call),
            CallTarget::Unresolved => {
                if self.blocks.contains_key(&call.name) {
                    self.call_user_block(call)
                } else if self.builtins.get(&call.name).is_some() {
                    self.call_registered_builtin(call)
                } else {
                    Err(ScriptError::name(
                        format!("unknown block or builtin '{}'", call.name),
                        call.line,
                    ))
                }
            }
        }
    }

    fn call_user_block(&mut self, call: &CallExpr) -> Result<Option<Value>, ScriptError> {
        let block = self
            .blocks
            .get(&call.name)
            .cloned()
            .ok_or_else(|| ScriptError::name(format!("unknown block '{}'", call.name), call.line))?;

        // Late-bound calls normalize here with the same rules the binder
        // applies at parse time.
        let normalized_storage;
        let normalized = match &call.normalized {
            Some(slots) => slots,
            None => {
                let formals: Vec<crate::parser::binder::FormalInfo> = block
                    .params
                    .iter()
                    .map(|p| crate::parser::binder::FormalInfo {
                        name: p.name.clone(),
                        has_default: p.default.is_some(),
                        mandatory: p.mandatory,
                    })
                    .collect();
                normalized_storage = crate::parser::binder::match_parameters(
                    &formals, &call.args, &call.name, call.line,
                )
                .map_err(|err| ScriptError::name(err.message, err.line))?;
                &normalized_storage
            }
        };

        // Actuals evaluate in the caller's frame; defaults later in the
        // callee's.
        let mut bound = Vec::with_capacity(normalized.len());
        for slot in normalized {
            bound.push(match slot {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        self.invoke_block(&block, bound, call.line)
    }

    fn call_registered_builtin(&mut self, call: &CallExpr) -> Result<Option<Value>, ScriptError> {
        let registry = Rc::clone(&self.builtins);
        let info = registry.get(&call.name).ok_or_else(|| {
            ScriptError::name(format!("unknown builtin '{}'", call.name), call.line)
        })?;
        let args = match (&info.signature, &call.normalized) {
            (Some(params), Some(slots)) => {
                let mut args = Vec::with_capacity(params.len());
                for (param, slot) in params.iter().zip(slots) {
                    args.push(match slot {
                        Some(expr) => self.eval(expr)?,
                        None => param.default.clone().unwrap_or(Value::Null),
                    });
                }
                args
            }
            _ => {
                // Dynamic family, or an embedder call without a bind pass:
                // positional order as written.
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.eval(arg.value())?);
                }
                args
            }
        };
        (info.invoke)(self, args, call.line)
    }

    // ----- lvalue writes ----------------------------------------------------

    /// Write through an lvalue: a variable, a property chain, an indexed
    /// element, a screen variable or a bit-packed field.
    pub(crate) fn assign(
        &mut self,
        target: &Expression,
        value: Value,
        line: u32,
    ) -> Result<(), ScriptError> {
        let (root, steps) = self.flatten_lvalue(target, line)?;

        let slot = match self.lookup(&root) {
            Some(slot) => slot,
            None => {
                // Screen variables: `screenName.varName = value`.
                if steps.len() == 1 && self.screens.contains(root.as_str()) {
                    if let Step::Field(var) = &steps[0] {
                        return self
                            .host
                            .set_screen_var(&root, var, value)
                            .map_err(|msg| ScriptError::name(msg, line));
                    }
                }
                return Err(ScriptError::name(
                    format!("undefined variable '{root}'"),
                    line,
                ));
            }
        };

        if steps.is_empty() {
            if slot.constant {
                return Err(ScriptError::type_err(
                    format!("cannot assign to const '{root}'"),
                    line,
                ));
            }
            let coerced = match &slot.declared {
                Some(declared) => {
                    let declared = declared.clone();
                    self.coerce_declared(value, &declared, line)?
                }
                None => value,
            };
            *slot.cell.borrow_mut() = coerced;
            return Ok(());
        }

        let mut current = slot.get();
        let mut i = 0;
        while i < steps.len() {
            let last = i == steps.len() - 1;
            match (&current, &steps[i]) {
                (Value::Json(tree), _) => {
                    // Convert before borrowing so self-assignment into an
                    // own subtree cannot alias the mutable borrow.
                    let leaf = value.to_json_tree();
                    let mut tree = tree.borrow_mut();
                    return json_write(&mut tree, &steps[i..], leaf, line);
                }
                (Value::Record(rec), Step::Field(field)) => {
                    if last {
                        let field_ty = {
                            let rec = rec.borrow();
                            match rec.ty.field(field) {
                                Some(f) => f.ty.clone(),
                                None => {
                                    return Err(ScriptError::name(
                                        format!("record has no field '{field}'"),
                                        line,
                                    ));
                                }
                            }
                        };
                        let resolved = self.resolve_spec(&field_ty, line)?;
                        let coerced = self.coerce_declared(value, &resolved, line)?;
                        rec.borrow_mut().fields.insert(field.clone(), coerced);
                        return Ok(());
                    }
                    let next = rec.borrow().fields.get(field).cloned();
                    current = next.ok_or_else(|| {
                        ScriptError::name(format!("record has no field '{field}'"), line)
                    })?;
                }
                (Value::Map(map), Step::Field(field)) => {
                    if last {
                        map.borrow_mut().insert(field.clone(), value);
                        return Ok(());
                    }
                    let next = map.borrow().entries.get(field).cloned();
                    current = next.ok_or_else(|| {
                        ScriptError::name(format!("map has no entry '{field}'"), line)
                    })?;
                }
                (Value::Bitmap(packed) | Value::Intmap(packed), Step::Field(field)) => {
                    if !last {
                        return Err(ScriptError::type_err(
                            "bit fields hold plain values",
                            line,
                        ));
                    }
                    return packed.set(field, &value, line);
                }
                (Value::Array(array), Step::Index(indices)) => {
                    if last {
                        let elem_ty = array.borrow().elem.clone();
                        let resolved = self.resolve_spec(&elem_ty, line)?;
                        let coerced = self.coerce_declared(value, &resolved, line)?;
                        let mut array = array.borrow_mut();
                        let offset = array.offset(indices, line)?;
                        array.data[offset] = coerced;
                        return Ok(());
                    }
                    let next = {
                        let array = array.borrow();
                        let offset = array.offset(indices, line)?;
                        array.data[offset].clone()
                    };
                    current = next;
                }
                (other, _) => {
                    return Err(ScriptError::type_err(
                        format!("cannot assign into a {}", other.data_type()),
                        line,
                    ));
                }
            }
            i += 1;
        }
        Ok(())
    }

    /// Decompose an lvalue expression into its root variable and the
    /// access steps, evaluating index expressions now.
    fn flatten_lvalue(
        &mut self,
        expr: &Expression,
        line: u32,
    ) -> Result<(String, Vec<Step>), ScriptError> {
        match expr {
            Expression::Variable { path, .. } => Ok((
                path[0].clone(),
                path[1..].iter().map(|f| Step::Field(f.clone())).collect(),
            )),
            Expression::Property { base, field, .. } => {
                let (root, mut steps) = self.flatten_lvalue(base, line)?;
                steps.push(Step::Field(field.clone()));
                Ok((root, steps))
            }
            Expression::Index { base, indices, .. } => {
                let (root, mut steps) = self.flatten_lvalue(base, line)?;
                let mut idx = Vec::with_capacity(indices.len());
                for index in indices {
                    idx.push(self.eval(index)?);
                }
                steps.push(Step::Index(int_indices(&idx, line)?));
                Ok((root, steps))
            }
            _ => Err(ScriptError::type_err("expression is not assignable", line)),
        }
    }
}

#[derive(Debug, Clone)]
enum Step {
    Field(String),
    Index(Vec<i64>),
}

/// Write into a JSON tree along the remaining steps. Missing object fields
/// are created on the way.
fn json_write(
    tree: &mut JsonValue,
    steps: &[Step],
    leaf: JsonValue,
    line: u32,
) -> Result<(), ScriptError> {
    let (step, rest) = steps.split_first().expect("at least one step");
    match step {
        Step::Field(field) => {
            if matches!(tree, JsonValue::Null) {
                *tree = JsonValue::Obj(IndexMap::new());
            }
            let JsonValue::Obj(map) = tree else {
                return Err(ScriptError::type_err(
                    format!("cannot write field '{field}' into this JSON value"),
                    line,
                ));
            };
            if rest.is_empty() {
                map.insert(field.clone(), leaf);
                return Ok(());
            }
            let entry = map.entry(field.clone()).or_insert(JsonValue::Null);
            json_write(entry, rest, leaf, line)
        }
        Step::Index(indices) => {
            let JsonValue::Seq(items) = tree else {
                return Err(ScriptError::type_err(
                    "cannot index this JSON value",
                    line,
                ));
            };
            if indices.len() != 1 || indices[0] < 0 || indices[0] as usize >= items.len() {
                return Err(ScriptError::index(
                    format!("JSON index out of bounds for length {}", items.len()),
                    line,
                ));
            }
            let idx = indices[0] as usize;
            if rest.is_empty() {
                items[idx] = leaf;
                return Ok(());
            }
            json_write(&mut items[idx], rest, leaf, line)
        }
    }
}

fn int_indices(indices: &[Value], line: u32) -> Result<Vec<i64>, ScriptError> {
    indices
        .iter()
        .map(|v| {
            v.as_i64().ok_or_else(|| {
                ScriptError::index(
                    format!("index must be an integer, got {}", v.data_type()),
                    line,
                )
            })
        })
        .collect()
}

fn check_backing(value: &Value, is_bitmap: bool, line: u32) -> Result<(), ScriptError> {
    let ok = if is_bitmap {
        matches!(value, Value::Byte(_))
    } else {
        matches!(value, Value::Int(_) | Value::Long(_) | Value::Byte(_))
    };
    if ok {
        Ok(())
    } else {
        Err(ScriptError::type_err(
            format!(
                "bit-pack cast needs a {} backing, got {}",
                if is_bitmap { "byte" } else { "integer" },
                value.data_type()
            ),
            line,
        ))
    }
}

// ----- operators -------------------------------------------------------------

fn numeric_rank(tag: DataType) -> u8 {
    match tag {
        DataType::Byte => 0,
        DataType::Integer => 1,
        DataType::Long => 2,
        DataType::Float => 3,
        DataType::Double => 4,
        _ => u8::MAX,
    }
}

fn eval_unary(op: UnaryOp, value: &Value, line: u32) -> Result<Value, ScriptError> {
    match op {
        UnaryOp::TypeOf => Ok(Value::Str(value.data_type().name().to_string())),
        UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
        UnaryOp::Plus => {
            if value.data_type().is_numeric() {
                Ok(value.clone())
            } else {
                Err(ScriptError::type_err(
                    format!("unary '+' needs a number, got {}", value.data_type()),
                    line,
                ))
            }
        }
        UnaryOp::Neg => match value {
            Value::Byte(b) => Ok(Value::Int(-(*b as i32))),
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ScriptError::num("integer overflow in negation", line)),
            Value::Long(l) => l
                .checked_neg()
                .map(Value::Long)
                .ok_or_else(|| ScriptError::num("integer overflow in negation", line)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Double(d) => Ok(Value::Double(-d)),
            other => Err(ScriptError::type_err(
                format!("unary '-' needs a number, got {}", other.data_type()),
                line,
            )),
        },
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value, line: u32) -> Result<Value, ScriptError> {
    // `+` with a string on either side concatenates.
    if op == BinaryOp::Add {
        if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
            return Ok(Value::Str(format!(
                "{}{}",
                convert::stringify(left),
                convert::stringify(right)
            )));
        }
    }
    if op == BinaryOp::Pow {
        return eval_pow(left, right, line);
    }

    let (lr, rr) = (numeric_rank(left.data_type()), numeric_rank(right.data_type()));
    if lr == u8::MAX || rr == u8::MAX {
        return Err(ScriptError::type_err(
            format!(
                "operator needs numbers, got {} and {}",
                left.data_type(),
                right.data_type()
            ),
            line,
        ));
    }
    let rank = lr.max(rr);

    if rank >= 3 {
        // Float domain: IEEE semantics, division by zero yields ±inf.
        let (a, b) = (left.as_f64().unwrap_or(0.0), right.as_f64().unwrap_or(0.0));
        let out = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            BinaryOp::Pow | BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        return Ok(if rank == 3 {
            Value::Float(out as f32)
        } else {
            Value::Double(out)
        });
    }

    // Integer domain: byte operands promote to integer; overflow raises.
    let (a, b) = (left.as_i64().unwrap_or(0), right.as_i64().unwrap_or(0));
    let is_long = rank >= 2;
    let out = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(ScriptError::num("division by zero", line));
            }
            a.checked_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(ScriptError::num("division by zero", line));
            }
            a.checked_rem(b)
        }
        BinaryOp::Pow | BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
    .ok_or_else(|| ScriptError::num("integer overflow", line))?;

    if is_long {
        Ok(Value::Long(out))
    } else {
        i32::try_from(out)
            .map(Value::Int)
            .map_err(|_| ScriptError::num("integer overflow", line))
    }
}

/// `^`: double whenever the exponent is negative or non-integral,
/// otherwise the wider operand type with checked integer exponentiation.
fn eval_pow(left: &Value, right: &Value, line: u32) -> Result<Value, ScriptError> {
    let (lf, rf) = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Err(ScriptError::type_err(
                format!(
                    "'^' needs numbers, got {} and {}",
                    left.data_type(),
                    right.data_type()
                ),
                line,
            ));
        }
    };
    let exp_integral = right.as_i64().is_some() && rf >= 0.0;
    if left.is_float_kind() || right.is_float_kind() || !exp_integral {
        return Ok(Value::Double(lf.powf(rf)));
    }
    let base = left.as_i64().unwrap_or(0);
    let exp = right.as_i64().unwrap_or(0) as u64;
    let mut result: i64 = 1;
    let mut factor = base;
    let mut remaining = exp;
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = result
                .checked_mul(factor)
                .ok_or_else(|| ScriptError::num("integer overflow in '^'", line))?;
        }
        remaining >>= 1;
        if remaining > 0 {
            factor = factor
                .checked_mul(factor)
                .ok_or_else(|| ScriptError::num("integer overflow in '^'", line))?;
        }
    }
    let rank = numeric_rank(left.data_type()).max(numeric_rank(right.data_type()));
    if rank >= 2 {
        Ok(Value::Long(result))
    } else {
        i32::try_from(result)
            .map(Value::Int)
            .map_err(|_| ScriptError::num("integer overflow in '^'", line))
    }
}

fn compare(a: &Value, b: &Value, op: CompareOp, line: u32) -> Result<bool, ScriptError> {
    match op {
        CompareOp::Eq => Ok(a.equals(b)),
        CompareOp::Ne => Ok(!a.equals(b)),
        ordered => {
            let ordering = a.compare(b).ok_or_else(|| {
                ScriptError::type_err(
                    format!(
                        "cannot compare {} with {}",
                        a.data_type(),
                        b.data_type()
                    ),
                    line,
                )
            })?;
            Ok(match ordered {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Ge => ordering.is_ge(),
                CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
            })
        }
    }
}
