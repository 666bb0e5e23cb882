//! Lexically scoped variable store.
//!
//! Each call frame owns an `Environment` whose scope stack bottoms out at
//! the frame's entry scope; name resolution inside the interpreter falls
//! back to the globals environment, never to the caller's locals. Slots are
//! `Rc<RefCell<Value>>` cells so bit-packed views can write back through
//! the variable they were cast from.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::interp::exception::ScriptError;
use crate::interp::value::Value;
use crate::syntax::types::TypeSpec;

/// One variable binding: declared type, storage cell, const flag.
#[derive(Debug, Clone)]
pub struct Slot {
    pub declared: Option<TypeSpec>,
    pub cell: Rc<RefCell<Value>>,
    pub constant: bool,
}

impl Slot {
    pub fn get(&self) -> Value {
        self.cell.borrow().clone()
    }
}

#[derive(Debug, Default)]
pub struct Environment {
    scopes: Vec<HashMap<String, Slot>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Drop scopes until the stack is `depth` deep again; used when an
    /// exception unwinds out of nested scopes.
    pub fn truncate(&mut self, depth: usize) {
        while self.scopes.len() > depth.max(1) {
            self.scopes.pop();
        }
    }

    /// Introduce a name in the innermost scope. Redefinition within the
    /// same scope is an error.
    pub fn define(
        &mut self,
        name: &str,
        declared: Option<TypeSpec>,
        value: Value,
        constant: bool,
        line: u32,
    ) -> Result<(), ScriptError> {
        let scope = self.scopes.last_mut().expect("scope stack never empty");
        if scope.contains_key(name) {
            return Err(ScriptError::name(
                format!("variable '{name}' already defined"),
                line,
            ));
        }
        scope.insert(
            name.to_string(),
            Slot {
                declared,
                cell: Rc::new(RefCell::new(value)),
                constant,
            },
        );
        Ok(())
    }

    /// Find a slot, innermost scope first.
    pub fn lookup(&self, name: &str) -> Option<Slot> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains_key(name))
    }

    /// Wipe every scope; used by the host's reset operation on globals.
    pub fn clear(&mut self) {
        self.scopes.clear();
        self.scopes.push(HashMap::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_lookup_shadowing() {
        let mut env = Environment::new();
        env.define("x", None, Value::Int(1), false, 1).unwrap();
        assert!(env.define("x", None, Value::Int(2), false, 1).is_err());
        env.push();
        env.define("x", None, Value::Int(2), false, 2).unwrap();
        assert!(env.lookup("x").unwrap().get().equals(&Value::Int(2)));
        env.pop();
        assert!(env.lookup("x").unwrap().get().equals(&Value::Int(1)));
    }

    #[test]
    fn cells_are_shared() {
        let mut env = Environment::new();
        env.define("x", None, Value::Int(1), false, 1).unwrap();
        let slot = env.lookup("x").unwrap();
        *slot.cell.borrow_mut() = Value::Int(9);
        assert!(env.lookup("x").unwrap().get().equals(&Value::Int(9)));
    }

    #[test]
    fn clear_wipes_everything() {
        let mut env = Environment::new();
        env.define("x", None, Value::Int(1), false, 1).unwrap();
        env.push();
        env.define("y", None, Value::Int(2), false, 1).unwrap();
        env.clear();
        assert!(env.lookup("x").is_none());
        assert!(env.lookup("y").is_none());
        assert_eq!(env.depth(), 1);
    }
}
