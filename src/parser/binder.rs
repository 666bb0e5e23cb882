//! Post-parse binding passes.
//!
//! For every call site: resolve the callee against the block table, then the
//! builtin registry; leave it unresolved otherwise so the interpreter can
//! retry at call time (runtime `import` can add blocks later). Resolved
//! calls get their actuals normalized into formals order, one slot per
//! formal, `None` meaning "take the declared default".

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::builtins::BuiltinRegistry;
use crate::syntax::expressions::{Argument, CallExpr, CallTarget, Expression};
use crate::syntax::statements::{BlockStatement, Handler, Statement};

use super::ParseError;

/// The slice of a formal parameter the matcher needs.
#[derive(Debug, Clone)]
pub struct FormalInfo {
    pub name: String,
    pub has_default: bool,
    pub mandatory: bool,
}

type BlockSigs = HashMap<String, Vec<FormalInfo>>;

/// Bind a lone expression (embedded `#builtin` snippets) against the
/// builtin registry only.
pub(crate) fn bind_expression_standalone(
    expr: &mut Expression,
    builtins: &BuiltinRegistry,
) -> Result<(), ParseError> {
    bind_expression(expr, &BlockSigs::new(), builtins)
}

pub(crate) fn bind(
    statements: &mut [Statement],
    blocks: &mut IndexMap<String, BlockStatement>,
    builtins: &BuiltinRegistry,
) -> Result<(), ParseError> {
    let sigs: BlockSigs = blocks
        .iter()
        .map(|(name, block)| {
            let formals = block
                .params
                .iter()
                .map(|p| FormalInfo {
                    name: p.name.clone(),
                    has_default: p.default.is_some(),
                    mandatory: p.mandatory,
                })
                .collect();
            (name.clone(), formals)
        })
        .collect();

    for stmt in statements.iter_mut() {
        bind_statement(stmt, &sigs, builtins)?;
    }
    for block in blocks.values_mut() {
        bind_block(block, &sigs, builtins)?;
    }
    Ok(())
}

fn bind_block(
    block: &mut BlockStatement,
    sigs: &BlockSigs,
    builtins: &BuiltinRegistry,
) -> Result<(), ParseError> {
    for param in &mut block.params {
        if let Some(default) = &mut param.default {
            bind_expression(default, sigs, builtins)?;
        }
    }
    for stmt in &mut block.body {
        bind_statement(stmt, sigs, builtins)?;
    }
    for handler in &mut block.handlers {
        bind_handler(handler, sigs, builtins)?;
    }
    Ok(())
}

fn bind_handler(
    handler: &mut Handler,
    sigs: &BlockSigs,
    builtins: &BuiltinRegistry,
) -> Result<(), ParseError> {
    for stmt in &mut handler.body {
        bind_statement(stmt, sigs, builtins)?;
    }
    Ok(())
}

fn bind_statement(
    stmt: &mut Statement,
    sigs: &BlockSigs,
    builtins: &BuiltinRegistry,
) -> Result<(), ParseError> {
    match stmt {
        Statement::VarDecl { init, .. } => {
            if let Some(init) = init {
                bind_expression(init, sigs, builtins)?;
            }
        }
        Statement::Assign { target, value, .. } => {
            bind_expression(target, sigs, builtins)?;
            bind_expression(value, sigs, builtins)?;
        }
        Statement::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            bind_expression(cond, sigs, builtins)?;
            bind_statement(then_branch, sigs, builtins)?;
            if let Some(else_branch) = else_branch {
                bind_statement(else_branch, sigs, builtins)?;
            }
        }
        Statement::While { cond, body, .. } => {
            bind_expression(cond, sigs, builtins)?;
            bind_statement(body, sigs, builtins)?;
        }
        Statement::DoWhile { body, cond, .. } => {
            bind_statement(body, sigs, builtins)?;
            bind_expression(cond, sigs, builtins)?;
        }
        Statement::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            if let Some(init) = init {
                bind_statement(init, sigs, builtins)?;
            }
            if let Some(cond) = cond {
                bind_expression(cond, sigs, builtins)?;
            }
            if let Some(step) = step {
                bind_statement(step, sigs, builtins)?;
            }
            bind_statement(body, sigs, builtins)?;
        }
        Statement::ForEach { iterable, body, .. } => {
            bind_expression(iterable, sigs, builtins)?;
            bind_statement(body, sigs, builtins)?;
        }
        Statement::Block(block) => bind_block(block, sigs, builtins)?,
        Statement::Call(call) => bind_call(call, sigs, builtins)?,
        Statement::Return { value, .. } => {
            if let Some(value) = value {
                bind_expression(value, sigs, builtins)?;
            }
        }
        Statement::Print { value, .. } => bind_expression(value, sigs, builtins)?,
        Statement::UseConnection { body, .. } => {
            for stmt in body {
                bind_statement(stmt, sigs, builtins)?;
            }
        }
        Statement::OpenCursor { args, .. } => {
            for arg in args {
                match arg {
                    Argument::Positional(e) => bind_expression(e, sigs, builtins)?,
                    Argument::Named { value, .. } => bind_expression(value, sigs, builtins)?,
                }
            }
        }
        Statement::ShowScreen { args, .. } => {
            for arg in args {
                bind_expression(arg, sigs, builtins)?;
            }
        }
        Statement::Try { body, handlers, .. } => {
            for stmt in body {
                bind_statement(stmt, sigs, builtins)?;
            }
            for handler in handlers {
                bind_handler(handler, sigs, builtins)?;
            }
        }
        Statement::Raise { args, .. } => {
            for arg in args {
                bind_expression(arg, sigs, builtins)?;
            }
        }
        Statement::TypedefDecl { .. }
        | Statement::Break { .. }
        | Statement::Continue { .. }
        | Statement::Import { .. }
        | Statement::Connect { .. }
        | Statement::CloseConnection { .. }
        | Statement::CursorDecl { .. }
        | Statement::CloseCursor { .. }
        | Statement::ScreenDecl { .. }
        | Statement::HideScreen { .. }
        | Statement::CloseScreen { .. }
        | Statement::SubmitScreen { .. } => {}
    }
    Ok(())
}

fn bind_expression(
    expr: &mut Expression,
    sigs: &BlockSigs,
    builtins: &BuiltinRegistry,
) -> Result<(), ParseError> {
    match expr {
        Expression::Call(call) => bind_call(call, sigs, builtins)?,
        Expression::Property { base, .. } => bind_expression(base, sigs, builtins)?,
        Expression::Index { base, indices, .. } => {
            bind_expression(base, sigs, builtins)?;
            for idx in indices {
                bind_expression(idx, sigs, builtins)?;
            }
        }
        Expression::Length { value, .. } => bind_expression(value, sigs, builtins)?,
        Expression::Unary { operand, .. } => bind_expression(operand, sigs, builtins)?,
        Expression::Binary { left, right, .. } => {
            bind_expression(left, sigs, builtins)?;
            bind_expression(right, sigs, builtins)?;
        }
        Expression::Chained { operands, .. } => {
            for operand in operands {
                bind_expression(operand, sigs, builtins)?;
            }
        }
        Expression::Cast { value, .. } => bind_expression(value, sigs, builtins)?,
        Expression::ArrayLiteral { elements, .. } => {
            for element in elements {
                bind_expression(element, sigs, builtins)?;
            }
        }
        Expression::Literal { .. }
        | Expression::Variable { .. }
        | Expression::ArrayAlloc { .. }
        | Expression::QueueAlloc { .. }
        | Expression::JsonLiteral { .. }
        | Expression::RecordLiteral { .. }
        | Expression::SqlSelect { .. }
        | Expression::CursorHasNext { .. }
        | Expression::CursorNext { .. } => {}
    }
    Ok(())
}

fn bind_call(
    call: &mut CallExpr,
    sigs: &BlockSigs,
    builtins: &BuiltinRegistry,
) -> Result<(), ParseError> {
    // Bind nested calls inside the actuals first, so the normalized clones
    // carry resolved targets.
    for arg in &mut call.args {
        match arg {
            Argument::Positional(e) => bind_expression(e, sigs, builtins)?,
            Argument::Named { value, .. } => bind_expression(value, sigs, builtins)?,
        }
    }

    if !call.forced_builtin {
        if let Some(formals) = sigs.get(&call.name) {
            call.target = CallTarget::Block;
            call.normalized = Some(match_parameters(
                formals,
                &call.args,
                &call.name,
                call.line,
            )?);
            return Ok(());
        }
    }

    if let Some(info) = builtins.get(&call.name) {
        call.target = CallTarget::Builtin;
        match &info.signature {
            Some(params) => {
                let formals: Vec<FormalInfo> = params
                    .iter()
                    .map(|p| FormalInfo {
                        name: p.name.clone(),
                        has_default: p.default.is_some(),
                        mandatory: p.mandatory,
                    })
                    .collect();
                call.normalized = Some(match_parameters(
                    &formals,
                    &call.args,
                    &call.name,
                    call.line,
                )?);
            }
            // Dynamic families accept positional arguments only.
            None => {
                if call.args.iter().any(|a| matches!(a, Argument::Named { .. })) {
                    return Err(ParseError::new(
                        call.line,
                        format!("'{}' accepts positional parameters only", call.name),
                    ));
                }
            }
        }
        return Ok(());
    }

    if call.forced_builtin {
        return Err(ParseError::new(
            call.line,
            format!("unknown builtin '{}'", call.name),
        ));
    }
    // Unknown for now; the interpreter retries when the call runs.
    call.target = CallTarget::Unresolved;
    Ok(())
}

/// Normalize actuals against formals.
///
/// Positional and named actuals cannot mix. Named actuals bind by exact,
/// case-sensitive name. Positionals bind left to right. Formals left
/// unbound fall back to their default; mandatory formals without one fail.
pub fn match_parameters(
    formals: &[FormalInfo],
    actuals: &[Argument],
    callee: &str,
    line: u32,
) -> Result<Vec<Option<Expression>>, ParseError> {
    let positional = actuals
        .iter()
        .filter(|a| matches!(a, Argument::Positional(_)))
        .count();
    let named = actuals.len() - positional;
    if positional > 0 && named > 0 {
        return Err(ParseError::new(
            line,
            format!("cannot mix positional and named parameters in call to '{callee}'"),
        ));
    }

    let mut slots: Vec<Option<Expression>> = vec![None; formals.len()];
    if named > 0 {
        for arg in actuals {
            let Argument::Named { name, value } = arg else {
                continue;
            };
            let Some(idx) = formals.iter().position(|f| &f.name == name) else {
                return Err(ParseError::new(
                    line,
                    format!("unknown parameter '{name}' in call to '{callee}'"),
                ));
            };
            if slots[idx].is_some() {
                return Err(ParseError::new(
                    line,
                    format!("parameter '{name}' given twice in call to '{callee}'"),
                ));
            }
            slots[idx] = Some(value.clone());
        }
    } else {
        if positional > formals.len() {
            return Err(ParseError::new(
                line,
                format!("Too many value parameters in call to '{callee}'"),
            ));
        }
        for (idx, arg) in actuals.iter().enumerate() {
            if let Argument::Positional(value) = arg {
                slots[idx] = Some(value.clone());
            }
        }
    }

    let missing: Vec<&str> = formals
        .iter()
        .zip(&slots)
        .filter(|(f, slot)| slot.is_none() && !f.has_default && f.mandatory)
        .map(|(f, _)| f.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(ParseError::new(
            line,
            format!(
                "Missing parameters in call to '{callee}': {}",
                missing.join(", ")
            ),
        ));
    }
    Ok(slots)
}
