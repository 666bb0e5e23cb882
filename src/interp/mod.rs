//! Tree-walking interpreter.
//!
//! Owns the call stack, loop/return signals, exception unwinding, the
//! connection stack and the cursor table. Registries are owned per
//! interpreter, never process-global, so several isolated interpreters can
//! coexist in one process. The host is a capability trait object; the core
//! never embeds it.

pub mod convert;
pub mod env;
pub mod exception;
pub mod value;

mod eval;
mod exec;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;
use log::warn;

use crate::builtins::BuiltinRegistry;
use crate::host::{Host, Stream};
use crate::json::{self, JsonOptions, MAX_PREEVAL_DEPTH};
use crate::parser::{Parser, Program, binder};
use crate::source::SourceBuffer;
use crate::sql::{Connection, RowCursor};
use crate::syntax::{BlockStatement, TypeRegistry, TypeSpec};

use env::{Environment, Slot};
use exception::{ErrorKind, ScriptError};
use value::{JsonValue, Value};

/// Statement outcome: fall through, or one of the unwinding signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return,
}

pub(crate) type Exec = Result<Flow, ScriptError>;

/// One call-stack entry.
pub(crate) struct Frame {
    pub name: String,
    pub env: Environment,
    pub return_slot: Option<Value>,
    pub call_line: u32,
}

/// Declared cursor: the raw SELECT plus the driver iterator while open.
struct CursorState {
    sql: String,
    open: Option<Box<dyn RowCursor>>,
}

pub struct Interpreter {
    pub(crate) host: Rc<dyn Host>,
    pub(crate) builtins: Rc<BuiltinRegistry>,
    pub(crate) types: TypeRegistry,
    pub(crate) globals: Environment,
    pub(crate) frames: Vec<Frame>,
    pub(crate) blocks: IndexMap<String, Rc<BlockStatement>>,
    cursors: IndexMap<String, CursorState>,
    connections: IndexMap<String, Box<dyn Connection>>,
    conn_stack: Vec<String>,
    pub(crate) screens: HashSet<String>,
    imported: HashSet<PathBuf>,
    importing: Vec<PathBuf>,
    import_root: PathBuf,
    json_cache: HashMap<usize, JsonValue>,
}

impl Interpreter {
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self::with_builtins(host, BuiltinRegistry::standard())
    }

    pub fn with_builtins(host: Rc<dyn Host>, builtins: BuiltinRegistry) -> Self {
        Interpreter {
            host,
            builtins: Rc::new(builtins),
            types: TypeRegistry::new(),
            globals: Environment::new(),
            frames: Vec::new(),
            blocks: IndexMap::new(),
            cursors: IndexMap::new(),
            connections: IndexMap::new(),
            conn_stack: Vec::new(),
            screens: HashSet::new(),
            imported: HashSet::new(),
            importing: Vec::new(),
            import_root: PathBuf::from("."),
            json_cache: HashMap::new(),
        }
    }

    /// Directory `import "name";` resolves relative names against.
    pub fn set_import_root(&mut self, root: impl Into<PathBuf>) {
        self.import_root = root.into();
    }

    /// Execute a parsed program top to bottom. An unhandled exception is
    /// reported on the host's error stream (kind, line, message, then the
    /// frame trace) and returned.
    pub fn run(&mut self, program: &Program) -> Result<(), ScriptError> {
        self.types.merge(&program.types);
        for (name, block) in &program.blocks {
            self.blocks.insert(name.clone(), Rc::clone(block));
        }
        for screen in &program.screens {
            self.screens.insert(screen.clone());
        }
        match self.exec_statements(&program.statements) {
            Ok(_) => Ok(()),
            Err(err) => {
                self.host.print(Stream::Error, &err.report());
                Err(err)
            }
        }
    }

    /// Host "reset": wipe program scope.
    pub fn reset(&mut self) {
        self.globals.clear();
    }

    /// Call a named block from the embedder (screen callbacks arrive this
    /// way). Arguments bind positionally.
    pub fn call_block(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>, ScriptError> {
        let block = self
            .blocks
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::name(format!("unknown block '{name}'"), 0))?;
        if args.len() > block.params.len() {
            return Err(ScriptError::name(
                format!("Too many value parameters in call to '{name}'"),
                0,
            ));
        }
        let mut bound: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        bound.resize(block.params.len(), None);
        self.invoke_block(&block, bound, 0)
    }

    /// Builtin invocation protocol: run a builtin by dotted name.
    pub fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>, ScriptError> {
        let registry = Rc::clone(&self.builtins);
        let info = registry
            .get(name)
            .ok_or_else(|| ScriptError::name(format!("unknown builtin '{name}'"), 0))?;
        (info.invoke)(self, args, 0)
    }

    /// Signature lookup for the embedder; `None` for dynamic families.
    pub fn builtin_signature(&self, name: &str) -> Option<Vec<crate::builtins::Parameter>> {
        self.builtins.get(name).and_then(|info| info.signature.clone())
    }

    // ----- frame and scope plumbing -----------------------------------------

    pub(crate) fn env(&self) -> &Environment {
        self.frames.last().map(|f| &f.env).unwrap_or(&self.globals)
    }

    pub(crate) fn env_mut(&mut self) -> &mut Environment {
        if let Some(frame) = self.frames.last_mut() {
            &mut frame.env
        } else {
            &mut self.globals
        }
    }

    /// Resolve a name: current frame first, then program scope. Callers'
    /// locals are never visible.
    pub(crate) fn lookup(&self, name: &str) -> Option<Slot> {
        if let Some(frame) = self.frames.last() {
            if let Some(slot) = frame.env.lookup(name) {
                return Some(slot);
            }
        }
        self.globals.lookup(name)
    }

    pub(crate) fn check_cancelled(&self, line: u32) -> Result<(), ScriptError> {
        if self.host.is_cancelled() {
            Err(ScriptError::cancelled(line))
        } else {
            Ok(())
        }
    }

    /// Invoke a block with values aligned to its formals (`None` slots take
    /// the declared default, evaluated in the fresh frame).
    pub(crate) fn invoke_block(
        &mut self,
        block: &Rc<BlockStatement>,
        bound: Vec<Option<Value>>,
        call_line: u32,
    ) -> Result<Option<Value>, ScriptError> {
        let name = block.name.clone().unwrap_or_else(|| "<anonymous>".into());
        self.frames.push(Frame {
            name: name.clone(),
            env: Environment::new(),
            return_slot: None,
            call_line,
        });

        let result = self.run_block_body(block, bound);
        let frame = self.frames.pop().expect("frame pushed above");
        match result {
            Ok(_) => Ok(frame.return_slot),
            Err(err) => Err(err.pushed(&name, call_line)),
        }
    }

    fn run_block_body(
        &mut self,
        block: &Rc<BlockStatement>,
        bound: Vec<Option<Value>>,
    ) -> Exec {
        // paramInit: one declaration per formal, in formals order.
        for (param, value) in block.params.iter().zip(bound) {
            let value = match value {
                Some(v) => v,
                None => match &param.default {
                    Some(default) => self.eval(default)?,
                    None => Value::Null,
                },
            };
            let resolved = self.resolve_spec(&param.ty, param.line)?;
            let value = convert::coerce_for_store(value, &resolved, &self.types, param.line)?;
            self.env_mut()
                .define(&param.name, Some(resolved), value, false, param.line)?;
        }

        let result = self.exec_statements(&block.body);
        match result {
            Err(err) if !block.handlers.is_empty() => {
                self.run_handlers(err, &block.handlers)
            }
            Ok(Flow::Return) => Ok(Flow::Normal),
            other => other,
        }
    }

    /// First handler whose kind matches catches, in source order. The
    /// handler body sees the exception as a record (`name`, `line`,
    /// `message`, plus `p1…pn` for custom kinds).
    pub(crate) fn run_handlers(
        &mut self,
        err: ScriptError,
        handlers: &[crate::syntax::Handler],
    ) -> Exec {
        for handler in handlers {
            let handler_kind = ErrorKind::from_name(&handler.kind);
            if !err.kind.caught_by(&handler_kind) {
                continue;
            }
            let record = exception_record(&err);
            let depth = self.env().depth();
            self.env_mut().push();
            let defined = self
                .env_mut()
                .define(&handler.var, None, record, false, handler.line);
            // A handler may itself raise; that raise replaces the one in
            // flight. Break/continue/return escaping the body keep their
            // meaning.
            let flow = match defined {
                Ok(()) => self.exec_statements(&handler.body),
                Err(new_err) => Err(new_err),
            };
            self.env_mut().truncate(depth);
            return flow;
        }
        Err(err)
    }

    // ----- resource management ----------------------------------------------

    pub(crate) fn open_cursor_names(&self) -> HashSet<String> {
        self.cursors
            .iter()
            .filter(|(_, state)| state.open.is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Close every cursor opened after `snapshot` was taken. Runs on every
    /// exit path of `use` blocks and before exception handlers.
    pub(crate) fn close_cursors_since(&mut self, snapshot: &HashSet<String>) {
        for (name, state) in self.cursors.iter_mut() {
            if state.open.is_some() && !snapshot.contains(name) {
                state.open = None;
                warn!("cursor '{name}' closed on scope exit");
            }
        }
    }

    pub(crate) fn declare_cursor(&mut self, name: &str, sql: &str) {
        self.cursors.insert(
            name.to_string(),
            CursorState {
                sql: sql.to_string(),
                open: None,
            },
        );
    }

    pub(crate) fn cursor_declared(&self, name: &str) -> bool {
        self.cursors.contains_key(name)
    }

    pub(crate) fn cursor_is_open(&self, name: &str) -> bool {
        self.cursors
            .get(name)
            .map(|state| state.open.is_some())
            .unwrap_or(false)
    }

    pub(crate) fn open_cursor(
        &mut self,
        name: &str,
        positional: &[Value],
        named: &[(String, Value)],
        line: u32,
    ) -> Result<(), ScriptError> {
        let sql = match self.cursors.get(name) {
            None => {
                return Err(ScriptError::name(format!("unknown cursor '{name}'"), line));
            }
            Some(state) if state.open.is_some() => {
                return Err(ScriptError::db(
                    format!("cursor '{name}' is already open"),
                    line,
                ));
            }
            Some(state) => state.sql.clone(),
        };
        let bound = crate::sql::bind_sql(&sql, positional, named)
            .map_err(|msg| ScriptError::db(msg, line))?;
        let conn_name = self
            .conn_stack
            .last()
            .cloned()
            .ok_or_else(|| ScriptError::db("no active connection", line))?;
        let conn = self
            .connections
            .get_mut(&conn_name)
            .ok_or_else(|| ScriptError::db(format!("connection '{conn_name}' is closed"), line))?;
        let rows = conn.prepare(&bound).map_err(|msg| ScriptError::db(msg, line))?;
        if let Some(state) = self.cursors.get_mut(name) {
            state.open = Some(rows);
        }
        Ok(())
    }

    pub(crate) fn close_cursor(&mut self, name: &str, line: u32) {
        match self.cursors.get_mut(name) {
            Some(state) if state.open.is_some() => state.open = None,
            _ => {
                warn!("line {line}: close of cursor '{name}' that is not open");
                self.host
                    .print(Stream::Warn, &format!("cursor '{name}' is not open"));
            }
        }
    }

    pub(crate) fn cursor_has_next(&mut self, name: &str, line: u32) -> Result<bool, ScriptError> {
        let state = self
            .cursors
            .get_mut(name)
            .ok_or_else(|| ScriptError::name(format!("unknown cursor '{name}'"), line))?;
        let rows = state
            .open
            .as_mut()
            .ok_or_else(|| ScriptError::db(format!("cursor '{name}' is not open"), line))?;
        rows.has_next().map_err(|msg| ScriptError::db(msg, line))
    }

    pub(crate) fn cursor_next(&mut self, name: &str, line: u32) -> Result<Value, ScriptError> {
        let state = self
            .cursors
            .get_mut(name)
            .ok_or_else(|| ScriptError::name(format!("unknown cursor '{name}'"), line))?;
        let rows = state
            .open
            .as_mut()
            .ok_or_else(|| ScriptError::db(format!("cursor '{name}' is not open"), line))?;
        let row = rows.next().map_err(|msg| ScriptError::db(msg, line))?;
        Ok(crate::sql::row_to_record(row))
    }

    pub(crate) fn connect(
        &mut self,
        name: &str,
        spec: &JsonValue,
        line: u32,
    ) -> Result<(), ScriptError> {
        if let Some(mut old) = self.connections.shift_remove(name) {
            old.close();
            self.conn_stack.retain(|n| n != name);
        }
        let conn = self
            .host
            .open_connection(name, spec)
            .map_err(|msg| ScriptError::db(msg, line))?;
        self.connections.insert(name.to_string(), conn);
        self.conn_stack.push(name.to_string());
        Ok(())
    }

    pub(crate) fn close_connection(&mut self, name: &str, line: u32) {
        match self.connections.shift_remove(name) {
            Some(mut conn) => {
                conn.close();
                self.host.close_connection(name);
                self.conn_stack.retain(|n| n != name);
            }
            None => {
                warn!("line {line}: close of connection '{name}' that is not open");
                self.host
                    .print(Stream::Warn, &format!("connection '{name}' is not open"));
            }
        }
    }

    pub(crate) fn connection_known(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    pub(crate) fn push_connection_use(&mut self, name: &str) {
        self.conn_stack.push(name.to_string());
    }

    pub(crate) fn pop_connection_use(&mut self) {
        self.conn_stack.pop();
    }

    pub(crate) fn conn_stack_depth(&self) -> usize {
        self.conn_stack.len()
    }

    /// Run a SELECT expression eagerly: the whole result set becomes an
    /// array of records.
    pub(crate) fn run_select(&mut self, sql: &str, line: u32) -> Result<Value, ScriptError> {
        let conn_name = self
            .conn_stack
            .last()
            .cloned()
            .ok_or_else(|| ScriptError::db("no active connection", line))?;
        let conn = self
            .connections
            .get_mut(&conn_name)
            .ok_or_else(|| ScriptError::db(format!("connection '{conn_name}' is closed"), line))?;
        let mut rows = conn.prepare(sql).map_err(|msg| ScriptError::db(msg, line))?;
        let mut data = Vec::new();
        while rows.has_next().map_err(|msg| ScriptError::db(msg, line))? {
            let row = rows.next().map_err(|msg| ScriptError::db(msg, line))?;
            data.push(crate::sql::row_to_record(row));
        }
        Ok(Value::array(value::ArrayValue {
            elem: TypeSpec::Data(crate::syntax::DataType::Record),
            dims: Vec::new(),
            data,
        }))
    }

    // ----- JSON slices ------------------------------------------------------

    /// Parse a captured `{…}`/`[…]` slice. Embedded `#ns.name(args)` calls
    /// are evaluated and substituted first, at most `MAX_PREEVAL_DEPTH`
    /// rounds. Slices without embedded calls are memoized.
    pub(crate) fn parse_json_slice(
        &mut self,
        raw: &str,
        offset: usize,
        line: u32,
        lowercase: bool,
    ) -> Result<JsonValue, ScriptError> {
        let cache_key = raw.as_ptr() as usize;
        if !lowercase {
            if let Some(tree) = self.json_cache.get(&cache_key) {
                return Ok(tree.clone());
            }
        }
        let mut text = raw.to_string();
        let mut rounds = 0usize;
        let had_calls = json::find_embedded_call(&text).is_some();
        while let Some(range) = json::find_embedded_call(&text) {
            if rounds >= MAX_PREEVAL_DEPTH {
                return Err(ScriptError::type_err(
                    format!("builtin substitution exceeded {MAX_PREEVAL_DEPTH} rounds in JSON"),
                    line,
                ));
            }
            rounds += 1;
            let snippet = text[range.clone()].to_string();
            let value = self.eval_snippet(&snippet, line)?;
            text.replace_range(range, &value.to_json_tree().stringify());
        }
        let options = JsonOptions {
            lowercase_keys: lowercase,
        };
        let tree = json::parse(&text, options).map_err(|err| {
            ScriptError::type_err(
                format!("{} (at byte {} of literal at offset {offset})", err.message, err.offset),
                line,
            )
        })?;
        if !lowercase && !had_calls {
            self.json_cache.insert(cache_key, tree.clone());
        }
        Ok(tree)
    }

    /// Lex, parse, bind and evaluate one embedded expression snippet.
    pub(crate) fn eval_snippet(&mut self, text: &str, line: u32) -> Result<Value, ScriptError> {
        let buffer = SourceBuffer::new(text);
        let (tokens, lex_errors) = crate::lexer::Lexer::new(&buffer).tokenize();
        if let Some(err) = lex_errors.first() {
            return Err(ScriptError::new(ErrorKind::Parse, err.to_string(), line));
        }
        let mut parser = Parser::new(&buffer, tokens);
        let mut expr = parser
            .parse_expression()
            .map_err(|err| ScriptError::new(ErrorKind::Parse, err.message, line))?;
        binder::bind_expression_standalone(&mut expr, &self.builtins)
            .map_err(|err| ScriptError::new(ErrorKind::Parse, err.message, line))?;
        self.eval(&expr)
    }

    // ----- type plumbing ----------------------------------------------------

    pub(crate) fn resolve_spec(
        &self,
        spec: &TypeSpec,
        line: u32,
    ) -> Result<TypeSpec, ScriptError> {
        self.types
            .resolve(spec)
            .ok_or_else(|| ScriptError::type_err("unknown type alias", line))
    }

    /// Memoized, cycle-checked file import: lex+parse once per canonical
    /// path, merge blocks/types/screens, then run the imported top-level
    /// statements at the import point.
    pub(crate) fn import_file(&mut self, name: &str, line: u32) -> Exec {
        let mut path = self.import_root.join(name);
        if path.extension().is_none() {
            path.set_extension("ebs");
        }
        let canonical = path
            .canonicalize()
            .map_err(|err| ScriptError::io(format!("cannot import '{name}': {err}"), line))?;
        if self.importing.contains(&canonical) {
            return Err(ScriptError::io(
                format!("import cycle through '{name}'"),
                line,
            ));
        }
        if self.imported.contains(&canonical) {
            return Ok(Flow::Normal);
        }
        let source = std::fs::read_to_string(&canonical)
            .map_err(|err| ScriptError::io(format!("cannot read '{name}': {err}"), line))?;
        let program = Program::parse(&source, &self.builtins).map_err(|diags| {
            let first = diags
                .first()
                .map(|d| format!("{} (line {})", d.message, d.line))
                .unwrap_or_else(|| "parse failed".to_string());
            ScriptError::new(ErrorKind::Parse, format!("in '{name}': {first}"), line)
        })?;
        self.imported.insert(canonical.clone());
        self.importing.push(canonical);

        self.types.merge(&program.types);
        for (block_name, block) in &program.blocks {
            self.blocks
                .entry(block_name.clone())
                .or_insert_with(|| Rc::clone(block));
        }
        for screen in &program.screens {
            self.screens.insert(screen.clone());
        }
        let result = self.exec_statements(&program.statements);
        self.importing.pop();
        result
    }
}

impl Drop for Interpreter {
    /// Teardown order: cursors first, then connections, both LIFO.
    fn drop(&mut self) {
        let names: Vec<String> = self.cursors.keys().cloned().collect();
        for name in names.into_iter().rev() {
            if let Some(state) = self.cursors.get_mut(&name) {
                state.open = None;
            }
        }
        let conns: Vec<String> = self.connections.keys().cloned().collect();
        for name in conns.into_iter().rev() {
            if let Some(mut conn) = self.connections.shift_remove(&name) {
                conn.close();
            }
        }
    }
}

/// The record bound to a handler variable.
fn exception_record(err: &ScriptError) -> Value {
    use crate::syntax::types::{DataType, RecordField, RecordType};
    let mut fields: Vec<RecordField> = vec![
        RecordField {
            name: "name".into(),
            ty: TypeSpec::Data(DataType::String),
        },
        RecordField {
            name: "line".into(),
            ty: TypeSpec::Data(DataType::Integer),
        },
        RecordField {
            name: "message".into(),
            ty: TypeSpec::Data(DataType::String),
        },
    ];
    let mut values = IndexMap::new();
    values.insert("name".to_string(), Value::Str(err.kind.name().to_string()));
    values.insert("line".to_string(), Value::Int(err.line as i32));
    values.insert("message".to_string(), Value::Str(err.message.clone()));
    for (i, param) in err.params.iter().enumerate() {
        let field = format!("p{}", i + 1);
        fields.push(RecordField {
            name: field.clone(),
            ty: TypeSpec::Data(param.data_type()),
        });
        values.insert(field, param.clone());
    }
    Value::record(value::RecordValue {
        ty: Rc::new(RecordType { fields }),
        fields: values,
    })
}
