//! Execution stack
//!
//! A named, ordered scratch stack the node protocol uses to pass
//! intermediate results between resumption points. Several entries may share
//! a name; name-based operations always act on the most recent one.
//!
//! Entries own the references their values hold: pushing transfers
//! ownership in, popping or removing transfers it back out to the caller.
//! Whole-stack copies taken for frozen alternatives own nothing.

use super::heap::GenerationId;
use super::value::Value;
use crate::compiler::node::{NodeId, ResumptionPoint};
use crate::interpreter::errors::EngineFault;
use crate::parser::ast::ControlKind;

/// Reserved entry names
pub const ANONYMOUS: &str = "";
pub const CONTEXT: &str = "Context";
pub const RETURN_POINT: &str = "ReturnPoint";
pub const ARGUMENTS: &str = "Arguments";
pub const CALLEE: &str = "Callee";
pub const CONTROL: &str = "Control";
pub const REPETITIONS: &str = "Repetitions";
pub const CAPTURE_START: &str = "CaptureStart";
pub const BARRIER: &str = "Barrier";
pub const ITERATOR: &str = "Iterator";
pub const PARAMETER: &str = "Parameter";

/// A pending non-local transfer
#[derive(Debug, Clone, PartialEq)]
pub struct ControlToken {
    pub kind: ControlKind,
    pub tag: Option<String>,
    pub value: Value,
    pub source: NodeId,
}

impl ControlToken {
    /// Untagged tokens match any consumer of the right kind
    pub fn targets(&self, tag: Option<&str>) -> bool {
        match &self.tag {
            None => true,
            Some(wanted) => tag == Some(wanted.as_str()),
        }
    }
}

/// Arguments collected for a call, merged from positional, named and spread
/// arguments
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgumentBundle {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl ArgumentBundle {
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.positional
            .iter()
            .chain(self.named.iter().map(|(_, v)| v))
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What an entry holds
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    Resume(ResumptionPoint),
    Control(ControlToken),
    Arguments(ArgumentBundle),
    /// Quantifier repetitions and the cursor after the last one
    Counter { count: u32, position: usize },
    Position(usize),
    /// Lookahead/atomic region: alternatives above `mark` belong to it
    Barrier {
        mark: usize,
        position: usize,
        generation: GenerationId,
    },
}

impl Slot {
    pub fn type_name(&self) -> &'static str {
        match self {
            Slot::Value(_) => "value",
            Slot::Resume(_) => "resumption point",
            Slot::Control(_) => "control token",
            Slot::Arguments(_) => "arguments",
            Slot::Counter { .. } => "counter",
            Slot::Position(_) => "position",
            Slot::Barrier { .. } => "barrier",
        }
    }

    /// Values whose references this slot owns
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Slot::Value(value) => vec![value],
            Slot::Control(token) => vec![&token.value],
            Slot::Arguments(bundle) => bundle.values().collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackEntry {
    pub name: &'static str,
    pub slot: Slot,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionStack {
    entries: Vec<StackEntry>,
}

impl ExecutionStack {
    pub fn new() -> Self {
        ExecutionStack {
            entries: Vec::new(),
        }
    }

    /// Push an anonymous value
    pub fn push(&mut self, value: Value) {
        self.push_named(ANONYMOUS, Slot::Value(value));
    }

    pub fn push_named(&mut self, name: &'static str, slot: Slot) {
        self.entries.push(StackEntry { name, slot });
    }

    pub fn pop(&mut self) -> Result<Slot, EngineFault> {
        self.entries
            .pop()
            .map(|entry| entry.slot)
            .ok_or(EngineFault::StackSlotNotFound { name: ANONYMOUS })
    }

    /// Pop the top entry, which must hold a plain value
    pub fn pop_value(&mut self) -> Result<Value, EngineFault> {
        match self.pop()? {
            Slot::Value(value) => Ok(value),
            _ => Err(EngineFault::InvalidStackSlot {
                name: ANONYMOUS,
                expected: "a value",
            }),
        }
    }

    /// Pop the top `n` values, oldest first
    pub fn pop_values(&mut self, n: usize) -> Result<Vec<Value>, EngineFault> {
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(self.pop_value()?);
        }
        values.reverse();
        Ok(values)
    }

    pub fn peek(&self) -> Result<&Slot, EngineFault> {
        self.entries
            .last()
            .map(|entry| &entry.slot)
            .ok_or(EngineFault::StackSlotNotFound { name: ANONYMOUS })
    }

    fn position(&self, name: &'static str) -> Result<usize, EngineFault> {
        self.entries
            .iter()
            .rposition(|entry| entry.name == name)
            .ok_or(EngineFault::StackSlotNotFound { name })
    }

    pub fn contains(&self, name: &'static str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn get(&self, name: &'static str) -> Result<&Slot, EngineFault> {
        let index = self.position(name)?;
        Ok(&self.entries[index].slot)
    }

    pub fn get_mut(&mut self, name: &'static str) -> Result<&mut Slot, EngineFault> {
        let index = self.position(name)?;
        Ok(&mut self.entries[index].slot)
    }

    /// Remove the most recent entry called `name`
    pub fn remove(&mut self, name: &'static str) -> Result<Slot, EngineFault> {
        let index = self.position(name)?;
        Ok(self.entries.remove(index).slot)
    }

    pub fn rename(&mut self, old: &'static str, new: &'static str) -> Result<(), EngineFault> {
        let index = self.position(old)?;
        self.entries[index].name = new;
        Ok(())
    }

    /// Swap the slot of the most recent `name` entry, returning the old one
    pub fn replace(&mut self, name: &'static str, slot: Slot) -> Result<Slot, EngineFault> {
        let index = self.position(name)?;
        Ok(std::mem::replace(&mut self.entries[index].slot, slot))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    pub fn snapshot(&self) -> Vec<StackEntry> {
        self.entries.clone()
    }

    /// Replace the whole stack with a previously taken snapshot, returning
    /// the entries that were live
    pub fn restore(&mut self, entries: Vec<StackEntry>) -> Vec<StackEntry> {
        std::mem::replace(&mut self.entries, entries)
    }

    pub fn clear(&mut self) -> Vec<StackEntry> {
        std::mem::take(&mut self.entries)
    }

    // Typed accessors for the reserved entries

    pub fn get_value(&self, name: &'static str) -> Result<&Value, EngineFault> {
        match self.get(name)? {
            Slot::Value(value) => Ok(value),
            _ => Err(EngineFault::InvalidStackSlot {
                name,
                expected: "a value",
            }),
        }
    }

    pub fn remove_value(&mut self, name: &'static str) -> Result<Value, EngineFault> {
        match self.remove(name)? {
            Slot::Value(value) => Ok(value),
            _ => Err(EngineFault::InvalidStackSlot {
                name,
                expected: "a value",
            }),
        }
    }

    pub fn remove_resume(&mut self, name: &'static str) -> Result<ResumptionPoint, EngineFault> {
        match self.remove(name)? {
            Slot::Resume(point) => Ok(point),
            _ => Err(EngineFault::InvalidStackSlot {
                name,
                expected: "a resumption point",
            }),
        }
    }

    pub fn get_resume(&self, name: &'static str) -> Result<ResumptionPoint, EngineFault> {
        match self.get(name)? {
            Slot::Resume(point) => Ok(*point),
            _ => Err(EngineFault::InvalidStackSlot {
                name,
                expected: "a resumption point",
            }),
        }
    }

    pub fn remove_arguments(&mut self, name: &'static str) -> Result<ArgumentBundle, EngineFault> {
        match self.remove(name)? {
            Slot::Arguments(bundle) => Ok(bundle),
            _ => Err(EngineFault::InvalidStackSlot {
                name,
                expected: "arguments",
            }),
        }
    }

    pub fn arguments_mut(&mut self, name: &'static str) -> Result<&mut ArgumentBundle, EngineFault> {
        match self.get_mut(name)? {
            Slot::Arguments(bundle) => Ok(bundle),
            _ => Err(EngineFault::InvalidStackSlot {
                name,
                expected: "arguments",
            }),
        }
    }

    pub fn get_position(&self, name: &'static str) -> Result<usize, EngineFault> {
        match self.get(name)? {
            Slot::Position(position) => Ok(*position),
            _ => Err(EngineFault::InvalidStackSlot {
                name,
                expected: "a position",
            }),
        }
    }

    pub fn get_counter(&self, name: &'static str) -> Result<(u32, usize), EngineFault> {
        match self.get(name)? {
            Slot::Counter { count, position } => Ok((*count, *position)),
            _ => Err(EngineFault::InvalidStackSlot {
                name,
                expected: "a counter",
            }),
        }
    }

    pub fn control_token(&self) -> Result<&ControlToken, EngineFault> {
        match self.get(CONTROL)? {
            Slot::Control(token) => Ok(token),
            _ => Err(EngineFault::InvalidStackSlot {
                name: CONTROL,
                expected: "a control token",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::node::Signal;

    #[test]
    fn test_named_access_targets_most_recent() {
        let mut stack = ExecutionStack::new();
        stack.push_named(ARGUMENTS, Slot::Value(Value::Int(1)));
        stack.push(Value::Int(99));
        stack.push_named(ARGUMENTS, Slot::Value(Value::Int(2)));

        assert_eq!(stack.get_value(ARGUMENTS).unwrap(), &Value::Int(2));
        assert_eq!(stack.remove_value(ARGUMENTS).unwrap(), Value::Int(2));
        assert_eq!(stack.get_value(ARGUMENTS).unwrap(), &Value::Int(1));
        assert_eq!(stack.pop_value().unwrap(), Value::Int(99));
    }

    #[test]
    fn test_rename_and_replace() {
        let mut stack = ExecutionStack::new();
        stack.push(Value::Int(5));
        stack.rename(ANONYMOUS, CALLEE).unwrap();
        let old = stack.replace(CALLEE, Slot::Value(Value::Int(6))).unwrap();

        assert_eq!(old, Slot::Value(Value::Int(5)));
        assert_eq!(stack.get_value(CALLEE).unwrap(), &Value::Int(6));
        assert!(!stack.contains(ANONYMOUS));
    }

    #[test]
    fn test_missing_slot_faults() {
        let mut stack = ExecutionStack::new();
        assert_eq!(
            stack.remove(BARRIER),
            Err(EngineFault::StackSlotNotFound { name: BARRIER })
        );
        assert!(stack.pop().is_err());
    }

    #[test]
    fn test_pop_values_keeps_order() {
        let mut stack = ExecutionStack::new();
        for n in 1..=3 {
            stack.push(Value::Int(n));
        }
        assert_eq!(
            stack.pop_values(2).unwrap(),
            vec![Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn test_snapshot_restore() {
        let mut stack = ExecutionStack::new();
        stack.push_named(
            RETURN_POINT,
            Slot::Resume(ResumptionPoint::new(NodeId(3), Signal::Child(0))),
        );
        let frozen = stack.snapshot();
        stack.push(Value::Int(1));
        stack.restore(frozen);

        assert_eq!(stack.len(), 1);
        assert_eq!(
            stack.get_resume(RETURN_POINT).unwrap(),
            ResumptionPoint::new(NodeId(3), Signal::Child(0))
        );
    }

    #[test]
    fn test_control_token_targets() {
        let token = ControlToken {
            kind: ControlKind::Exit,
            tag: Some("foo".to_string()),
            value: Value::Nil,
            source: NodeId(0),
        };
        assert!(token.targets(Some("foo")));
        assert!(!token.targets(Some("bar")));
        assert!(!token.targets(None));
    }
}
