//! Frame and stack store: the global/local/temporary frames, the data
//! stack, and the call stack.
//!
//! This is the only module that owns variable storage. The executor always
//! goes through [`FrameStore`] to read or write a slot, so the frame-legality
//! and redeclaration rules hold in exactly one place.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::operand::{Scope, VarRef};
use crate::value::{Slot, Value};

type Vars = HashMap<String, Slot>;

/// Global, temporary, and local-stack frames, with frame-qualified
/// define/read/write.
#[derive(Debug, Default)]
pub struct FrameStore {
    global: Vars,
    temporary: Option<Vars>,
    local_stack: Vec<Vars>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame_mut(&mut self, order: u32, scope: Scope) -> Result<&mut Vars> {
        match scope {
            Scope::Global => Ok(&mut self.global),
            Scope::Temporary => self
                .temporary
                .as_mut()
                .ok_or(Error::UndefinedFrame { order }),
            Scope::Local => self
                .local_stack
                .last_mut()
                .ok_or(Error::UndefinedFrame { order }),
        }
    }

    fn frame(&self, order: u32, scope: Scope) -> Result<&Vars> {
        match scope {
            Scope::Global => Ok(&self.global),
            Scope::Temporary => self.temporary.as_ref().ok_or(Error::UndefinedFrame { order }),
            Scope::Local => self.local_stack.last().ok_or(Error::UndefinedFrame { order }),
        }
    }

    /// `DEFVAR`: declare `var_ref` as `Undefined` in its frame.
    pub fn define(&mut self, order: u32, var_ref: &VarRef) -> Result<()> {
        let frame = self.frame_mut(order, var_ref.scope)?;
        if frame.contains_key(&var_ref.name) {
            return Err(Error::SemanticError(format!(
                "instruction {order}: variable `{}` already defined in this frame",
                var_ref.name
            )));
        }
        frame.insert(var_ref.name.clone(), Slot::Undefined);
        Ok(())
    }

    /// Look up a declared variable's slot. Fails `AccessUndefinedVariable`
    /// if the variable was never `DEFVAR`-ed.
    pub fn read(&self, order: u32, var_ref: &VarRef) -> Result<&Slot> {
        self.frame(order, var_ref.scope)?
            .get(&var_ref.name)
            .ok_or_else(|| Error::AccessUndefinedVariable {
                order,
                name: var_ref.name.clone(),
            })
    }

    /// Assign a concrete value to a declared variable.
    pub fn write(&mut self, order: u32, var_ref: &VarRef, value: Value) -> Result<()> {
        let frame = self.frame_mut(order, var_ref.scope)?;
        let slot = frame
            .get_mut(&var_ref.name)
            .ok_or_else(|| Error::AccessUndefinedVariable {
                order,
                name: var_ref.name.clone(),
            })?;
        *slot = Slot::Value(value);
        Ok(())
    }

    /// `CREATEFRAME`: reset TF to empty, discarding any previous contents.
    pub fn create_temporary(&mut self) {
        self.temporary = Some(HashMap::new());
    }

    /// `PUSHFRAME`: TF becomes the new top LF; TF ceases to exist.
    pub fn push_frame(&mut self, order: u32) -> Result<()> {
        let tf = self.temporary.take().ok_or(Error::UndefinedFrame { order })?;
        self.local_stack.push(tf);
        Ok(())
    }

    /// `POPFRAME`: the top LF becomes the new TF.
    pub fn pop_frame(&mut self, order: u32) -> Result<()> {
        let top = self.local_stack.pop().ok_or(Error::UndefinedFrame { order })?;
        self.temporary = Some(top);
        Ok(())
    }

    pub fn local_depth(&self) -> usize {
        self.local_stack.len()
    }

    /// A snapshot of how many variables live in each frame, for `BREAK`'s
    /// diagnostic output.
    pub fn variable_counts(&self) -> FrameCounts {
        FrameCounts {
            global: self.global.len(),
            temporary: self.temporary.as_ref().map(|tf| tf.len()),
            local_top: self.local_stack.last().map(|lf| lf.len()),
            local_depth: self.local_stack.len(),
        }
    }
}

/// Variable counts per live frame, used only for `BREAK` diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct FrameCounts {
    pub global: usize,
    pub temporary: Option<usize>,
    pub local_top: Option<usize>,
    pub local_depth: usize,
}

/// The data stack used by `PUSHS`/`POPS`. Entries are always concrete values.
#[derive(Debug, Default)]
pub struct DataStack(Vec<Value>);

impl DataStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn pop(&mut self, order: u32) -> Result<Value> {
        self.0.pop().ok_or(Error::MissingValue {
            order,
            message: "data stack is empty".to_string(),
        })
    }
}

/// The call stack of return addresses used by `CALL`/`RETURN`.
#[derive(Debug, Default)]
pub struct CallStack(Vec<usize>);

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, return_pc: usize) {
        self.0.push(return_pc);
    }

    pub fn pop(&mut self, order: u32) -> Result<usize> {
        self.0.pop().ok_or(Error::MissingValue {
            order,
            message: "call stack is empty".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(scope: Scope, name: &str) -> VarRef {
        VarRef {
            scope,
            name: name.to_string(),
        }
    }

    #[test]
    fn lf_reference_requires_non_empty_stack() {
        let mut store = FrameStore::new();
        assert!(store.define(1, &var(Scope::Local, "x")).is_err());
        store.create_temporary();
        store.push_frame(1).unwrap();
        assert!(store.define(1, &var(Scope::Local, "x")).is_ok());
    }

    #[test]
    fn tf_reference_requires_existing_temporary_frame() {
        let mut store = FrameStore::new();
        assert!(store.define(1, &var(Scope::Temporary, "x")).is_err());
        store.create_temporary();
        assert!(store.define(1, &var(Scope::Temporary, "x")).is_ok());
    }

    #[test]
    fn redeclaration_in_the_same_frame_is_rejected() {
        let mut store = FrameStore::new();
        let x = var(Scope::Global, "x");
        store.define(1, &x).unwrap();
        assert_eq!(store.define(2, &x).unwrap_err().exit_code(), 52);
    }

    #[test]
    fn reading_undeclared_variable_is_an_error() {
        let store = FrameStore::new();
        let x = var(Scope::Global, "x");
        assert_eq!(store.read(1, &x).unwrap_err().exit_code(), 54);
    }

    #[test]
    fn defvar_leaves_slot_undefined() {
        let mut store = FrameStore::new();
        let x = var(Scope::Global, "x");
        store.define(1, &x).unwrap();
        assert_eq!(*store.read(1, &x).unwrap(), Slot::Undefined);
    }

    #[test]
    fn push_pop_frame_round_trips_contents() {
        let mut store = FrameStore::new();
        store.create_temporary();
        store.define(1, &var(Scope::Temporary, "a")).unwrap();
        store.write(1, &var(Scope::Temporary, "a"), Value::Int(7)).unwrap();
        store.push_frame(1).unwrap();
        assert_eq!(store.local_depth(), 1);
        store.pop_frame(1).unwrap();
        assert_eq!(
            *store.read(1, &var(Scope::Temporary, "a")).unwrap(),
            Slot::Value(Value::Int(7))
        );
    }

    #[test]
    fn data_stack_push_pop_round_trips() {
        let mut s = DataStack::new();
        s.push(Value::Int(3));
        assert_eq!(s.pop(1).unwrap(), Value::Int(3));
        assert!(s.pop(1).is_err());
    }
}
