//! `queue.*` builtins over the FIFO value.

use crate::interp::Interpreter;
use crate::interp::exception::ScriptError;
use crate::interp::value::Value;
use crate::syntax::types::DataType;

use super::{BuiltinInfo, BuiltinRegistry, param, want_any, want_queue};

pub(super) fn register(registry: &mut BuiltinRegistry) {
    registry.register(BuiltinInfo {
        name: "queue.enqueue",
        signature: Some(vec![
            param("queue", DataType::Queue),
            param("item", DataType::Null),
        ]),
        return_type: None,
        invoke: enqueue,
    });
    registry.register(BuiltinInfo {
        name: "queue.dequeue",
        signature: Some(vec![param("queue", DataType::Queue)]),
        return_type: None,
        invoke: dequeue,
    });
    registry.register(BuiltinInfo {
        name: "queue.peek",
        signature: Some(vec![param("queue", DataType::Queue)]),
        return_type: None,
        invoke: peek,
    });
    registry.register(BuiltinInfo {
        name: "queue.size",
        signature: Some(vec![param("queue", DataType::Queue)]),
        return_type: Some(DataType::Integer),
        invoke: size,
    });
    registry.register(BuiltinInfo {
        name: "queue.clear",
        signature: Some(vec![param("queue", DataType::Queue)]),
        return_type: None,
        invoke: clear,
    });
}

fn enqueue(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let queue = want_queue(&args, 0, "queue", line)?;
    let item = want_any(&args, 1, "item", line)?;
    queue.borrow_mut().items.push_back(item);
    Ok(None)
}

fn dequeue(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let queue = want_queue(&args, 0, "queue", line)?;
    let item = queue.borrow_mut().items.pop_front();
    item.map(Some)
        .ok_or_else(|| ScriptError::index("dequeue from an empty queue", line))
}

fn peek(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let queue = want_queue(&args, 0, "queue", line)?;
    let front = queue.borrow().items.front().cloned();
    Ok(Some(front.unwrap_or(Value::Null)))
}

fn size(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let queue = want_queue(&args, 0, "queue", line)?;
    let len = queue.borrow().items.len();
    Ok(Some(Value::Int(len as i32)))
}

fn clear(_: &mut Interpreter, args: Vec<Value>, line: u32) -> Result<Option<Value>, ScriptError> {
    let queue = want_queue(&args, 0, "queue", line)?;
    queue.borrow_mut().items.clear();
    Ok(None)
}
