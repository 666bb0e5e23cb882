//! Statement execution.

use std::rc::Rc;

use log::warn;

use crate::host::Stream;
use crate::syntax::expressions::Argument;
use crate::syntax::statements::Statement;
use crate::syntax::types::TypeSpec;

use super::convert;
use super::exception::{ErrorKind, ScriptError};
use super::value::Value;
use super::{Exec, Flow, Interpreter};

impl Interpreter {
    /// Run a statement sequence, checking the cancellation flag at every
    /// statement boundary. The first non-normal flow short-circuits.
    pub(crate) fn exec_statements(&mut self, stmts: &[Statement]) -> Exec {
        for stmt in stmts {
            self.check_cancelled(stmt.line())?;
            match self.exec_statement(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    pub(crate) fn exec_statement(&mut self, stmt: &Statement) -> Exec {
        match stmt {
            Statement::VarDecl {
                name,
                ty,
                init,
                constant,
                line,
            } => {
                let declared = match ty {
                    Some(spec) => Some(self.resolve_spec(spec, *line)?),
                    None => None,
                };
                let value = match (init, &declared) {
                    (Some(expr), Some(spec)) => {
                        let raw = self.eval(expr)?;
                        self.coerce_declared(raw, spec, *line)?
                    }
                    (Some(expr), None) => self.eval(expr)?,
                    (None, Some(spec)) => self.zero_value(spec, *line)?,
                    (None, None) => Value::Null,
                };
                self.env_mut()
                    .define(name, declared, value, *constant, *line)?;
                Ok(Flow::Normal)
            }

            // Registered during parsing; re-registering here covers aliases
            // arriving through a runtime import.
            Statement::TypedefDecl { name, spec, .. } => {
                if !self.types.contains(name) {
                    self.types.register(crate::syntax::TypeAlias {
                        name: name.clone(),
                        spec: spec.clone(),
                    });
                }
                Ok(Flow::Normal)
            }

            Statement::Assign {
                target,
                value,
                line,
            } => {
                let value = self.eval(value)?;
                self.assign(target, value, *line)?;
                Ok(Flow::Normal)
            }

            Statement::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let chosen = if self.eval(cond)?.truthy() {
                    Some(then_branch)
                } else {
                    else_branch.as_ref()
                };
                match chosen {
                    Some(branch) => self.exec_scoped(branch),
                    None => Ok(Flow::Normal),
                }
            }

            Statement::While { cond, body, line } => {
                loop {
                    self.check_cancelled(*line)?;
                    if !self.eval(cond)?.truthy() {
                        break;
                    }
                    match self.exec_scoped(body)? {
                        Flow::Break => break,
                        Flow::Return => return Ok(Flow::Return),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }

            Statement::DoWhile { body, cond, line } => {
                loop {
                    self.check_cancelled(*line)?;
                    match self.exec_scoped(body)? {
                        Flow::Break => break,
                        Flow::Return => return Ok(Flow::Return),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.eval(cond)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }

            Statement::For {
                init,
                cond,
                step,
                body,
                line,
            } => {
                let depth = self.env().depth();
                self.env_mut().push();
                let result = self.exec_for(init, cond, step, body, *line);
                self.env_mut().truncate(depth);
                result
            }

            Statement::ForEach {
                var,
                iterable,
                body,
                line,
            } => {
                let items = self.foreach_items(iterable, *line)?;
                for item in items {
                    self.check_cancelled(*line)?;
                    let depth = self.env().depth();
                    self.env_mut().push();
                    let defined = self.env_mut().define(var, None, item, false, *line);
                    let flow = match defined {
                        Ok(()) => self.exec_statement(body),
                        Err(err) => Err(err),
                    };
                    self.env_mut().truncate(depth);
                    match flow? {
                        Flow::Break => break,
                        Flow::Return => return Ok(Flow::Return),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }

            Statement::Break { .. } => Ok(Flow::Break),
            Statement::Continue { .. } => Ok(Flow::Continue),

            Statement::Block(block) => {
                if let Some(name) = &block.name {
                    // A nested named block is a declaration: register it so
                    // later (or earlier unresolved) calls can find it.
                    self.blocks
                        .insert(name.clone(), Rc::new(block.clone()));
                    return Ok(Flow::Normal);
                }
                let depth = self.env().depth();
                self.env_mut().push();
                let flow = self.exec_statements(&block.body);
                self.env_mut().truncate(depth);
                flow
            }

            Statement::Call(call) => {
                if let Some(value) = self.exec_call(call)? {
                    if !matches!(value, Value::Null) {
                        warn!(
                            "line {}: discarded return value from '{}'",
                            call.line, call.name
                        );
                    }
                }
                Ok(Flow::Normal)
            }

            Statement::Return { value, line } => {
                let result = match value {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                match self.frames.last_mut() {
                    Some(frame) => frame.return_slot = result,
                    None => {
                        return Err(ScriptError::new(
                            ErrorKind::Parse,
                            "'return' outside a function",
                            *line,
                        ));
                    }
                }
                Ok(Flow::Return)
            }

            Statement::Print { value, .. } => {
                let value = self.eval(value)?;
                self.host.print(Stream::Info, &convert::stringify(&value));
                Ok(Flow::Normal)
            }

            Statement::Import { name, line } => self.import_file(name, *line),

            Statement::Connect {
                name,
                spec_raw,
                offset,
                line,
            } => {
                let spec = self.parse_json_slice(spec_raw, *offset, *line, false)?;
                self.connect(name, &spec, *line)?;
                Ok(Flow::Normal)
            }

            Statement::UseConnection { name, body, line } => {
                if !self.connection_known(name) {
                    return Err(ScriptError::db(
                        format!("unknown connection '{name}'"),
                        *line,
                    ));
                }
                let cursor_snapshot = self.open_cursor_names();
                let depth_before = self.conn_stack_depth();
                self.push_connection_use(name);
                let env_depth = self.env().depth();
                self.env_mut().push();
                let flow = self.exec_statements(body);
                self.env_mut().truncate(env_depth);
                // Every exit path: close cursors opened inside, restore the
                // connection stack to its pre-`use` depth.
                self.close_cursors_since(&cursor_snapshot);
                while self.conn_stack_depth() > depth_before {
                    self.pop_connection_use();
                }
                flow
            }

            Statement::CloseConnection { name, line } => {
                self.close_connection(name, *line);
                Ok(Flow::Normal)
            }

            Statement::CursorDecl { name, sql, .. } => {
                self.declare_cursor(name, sql);
                Ok(Flow::Normal)
            }

            Statement::OpenCursor { name, args, line } => {
                let mut positional = Vec::new();
                let mut named = Vec::new();
                for arg in args {
                    match arg {
                        Argument::Positional(expr) => positional.push(self.eval(expr)?),
                        Argument::Named { name, value } => {
                            named.push((name.clone(), self.eval(value)?));
                        }
                    }
                }
                self.open_cursor(name, &positional, &named, *line)?;
                Ok(Flow::Normal)
            }

            Statement::CloseCursor { name, line } => {
                self.close_cursor(name, *line);
                Ok(Flow::Normal)
            }

            Statement::ScreenDecl {
                name,
                spec_raw,
                offset,
                replace,
                line,
            } => {
                // Screen specs parse in lowercase-key mode.
                let spec = self.parse_json_slice(spec_raw, *offset, *line, true)?;
                self.host
                    .define_screen(name, &spec, *replace)
                    .map_err(|msg| ScriptError::new(ErrorKind::Any, msg, *line))?;
                self.screens.insert(name.clone());
                Ok(Flow::Normal)
            }

            Statement::ShowScreen { name, args, line } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.host
                    .show_screen(name, &values)
                    .map_err(|msg| ScriptError::new(ErrorKind::Any, msg, *line))?;
                Ok(Flow::Normal)
            }

            Statement::HideScreen { name, line } => self
                .host
                .hide_screen(name.as_deref())
                .map_err(|msg| ScriptError::new(ErrorKind::Any, msg, *line))
                .map(|_| Flow::Normal),

            Statement::CloseScreen { name, line } => self
                .host
                .close_screen(name.as_deref())
                .map_err(|msg| ScriptError::new(ErrorKind::Any, msg, *line))
                .map(|_| Flow::Normal),

            Statement::SubmitScreen { name, line } => self
                .host
                .submit_screen(name.as_deref())
                .map_err(|msg| ScriptError::new(ErrorKind::Any, msg, *line))
                .map(|_| Flow::Normal),

            Statement::Try {
                body,
                handlers,
                ..
            } => {
                let cursor_snapshot = self.open_cursor_names();
                let depth = self.env().depth();
                self.env_mut().push();
                let flow = self.exec_statements(body);
                self.env_mut().truncate(depth);
                match flow {
                    Err(err) => {
                        // Affected resources close before the handler runs.
                        self.close_cursors_since(&cursor_snapshot);
                        self.run_handlers(err, handlers)
                    }
                    ok => ok,
                }
            }

            Statement::Raise { kind, args, line } => {
                let error_kind = ErrorKind::from_name(kind);
                let mut params = Vec::with_capacity(args.len());
                for arg in args {
                    params.push(self.eval(arg)?);
                }
                let message = if error_kind.is_standard() {
                    params
                        .first()
                        .map(convert::stringify)
                        .unwrap_or_default()
                } else {
                    String::new()
                };
                let mut err = ScriptError::new(error_kind, message, *line);
                if !err.kind.is_standard() {
                    err.params = params;
                }
                Err(err)
            }
        }
    }

    /// Branch bodies run in a nested scope of their own.
    fn exec_scoped(&mut self, stmt: &Statement) -> Exec {
        let depth = self.env().depth();
        self.env_mut().push();
        let flow = self.exec_statement(stmt);
        self.env_mut().truncate(depth);
        flow
    }

    fn exec_for(
        &mut self,
        init: &Option<Box<Statement>>,
        cond: &Option<crate::syntax::Expression>,
        step: &Option<Box<Statement>>,
        body: &Statement,
        line: u32,
    ) -> Exec {
        if let Some(init) = init {
            self.exec_statement(init)?;
        }
        loop {
            self.check_cancelled(line)?;
            if let Some(cond) = cond {
                if !self.eval(cond)?.truthy() {
                    break;
                }
            }
            match self.exec_scoped(body)? {
                Flow::Break => break,
                Flow::Return => return Ok(Flow::Return),
                Flow::Normal | Flow::Continue => {}
            }
            if let Some(step) = step {
                self.exec_statement(step)?;
            }
        }
        Ok(Flow::Normal)
    }

    /// Materialize the items a `foreach` walks: arrays, queues and JSON
    /// sequences by element, maps and JSON objects by key (insertion
    /// order), integers as `0..n`.
    fn foreach_items(
        &mut self,
        iterable: &crate::syntax::Expression,
        line: u32,
    ) -> Result<Vec<Value>, ScriptError> {
        let value = self.eval(iterable)?;
        match &value {
            Value::Array(a) => Ok(a.borrow().data.clone()),
            Value::Queue(q) => Ok(q.borrow().items.iter().cloned().collect()),
            Value::Map(m) => Ok(m
                .borrow()
                .entries
                .keys()
                .map(|k| Value::Str(k.clone()))
                .collect()),
            Value::Json(j) => match &*j.borrow() {
                super::value::JsonValue::Seq(items) => {
                    Ok(items.iter().map(convert::json_to_value).collect())
                }
                super::value::JsonValue::Obj(map) => {
                    Ok(map.keys().map(|k| Value::Str(k.clone())).collect())
                }
                _ => Err(ScriptError::type_err("cannot iterate this JSON value", line)),
            },
            other => match other.as_i64() {
                Some(n) if n >= 0 => Ok((0..n)
                    .map(|i| {
                        i32::try_from(i)
                            .map(Value::Int)
                            .unwrap_or(Value::Long(i))
                    })
                    .collect()),
                _ => Err(ScriptError::type_err(
                    format!("cannot iterate a {}", other.data_type()),
                    line,
                )),
            },
        }
    }

    /// Store-time coercion that also builds records/maps from JSON values
    /// (record initializers arrive as JSON slices).
    pub(crate) fn coerce_declared(
        &mut self,
        value: Value,
        declared: &TypeSpec,
        line: u32,
    ) -> Result<Value, ScriptError> {
        match (declared, &value) {
            (TypeSpec::Record(rt), Value::Json(tree)) => {
                let tree = tree.borrow().clone();
                self.record_from_json(rt, &tree, line)
            }
            (TypeSpec::Data(crate::syntax::DataType::Map) | TypeSpec::SortedMap, Value::Json(tree)) => {
                let sorted = matches!(declared, TypeSpec::SortedMap);
                let tree = tree.borrow().clone();
                self.map_from_json(&tree, sorted, line)
            }
            _ => convert::coerce_for_store(value, declared, &self.types, line),
        }
    }
}
