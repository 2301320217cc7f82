//! Runtime value representation
//!
//! Values are either *primitive* ([`Value::Nil`], [`Value::Bool`],
//! [`Value::Int`], [`Value::Float`], [`Value::Str`]), copied by value, or
//! *referenced* ([`Value::Ref`]), naming a heap cell that holds a
//! [`HeapValue`]. Every `Value::Ref` held by a stack entry, a binding or a
//! container element owns one reference on its cell.

use super::context::Context;
use super::iterator::IteratorState;
use crate::compiler::node::NodeId;
use crate::interpreter::builtins::Builtin;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Stable address of a heap cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

/// Runtime values in the interpreter
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ref(Address),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Ref(_) => "reference",
        }
    }

    /// `nil`, `false`, `0`, `0.0` and `""` are falsy; everything else is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Ref(_) => true,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Ref(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Ref(addr) => write!(f, "{}", addr),
        }
    }
}

/// Hashable primitive used for set members
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Key {
    /// Floats and references cannot be set members
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Nil => Some(Key::Nil),
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(n) => Some(Key::Int(*n)),
            Value::Str(s) => Some(Key::Str(s.clone())),
            Value::Float(_) | Value::Ref(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Nil => Value::Nil,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(n) => Value::Int(*n),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

/// Callable values
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionValue {
    /// A compiled function or pattern closing over the context it was created in
    User {
        node: NodeId,
        captured: Address,
        name: Option<String>,
    },
    Builtin(Builtin),
}

impl FunctionValue {
    pub fn name(&self) -> String {
        match self {
            FunctionValue::User {
                name: Some(name), ..
            } => name.clone(),
            FunctionValue::User { name: None, .. } => "<anonymous>".to_string(),
            FunctionValue::Builtin(builtin) => builtin.name().to_string(),
        }
    }
}

/// Contents of a heap cell
#[derive(Debug, Clone, PartialEq)]
pub enum HeapValue {
    /// A mutable box around a single value (the input cursor)
    Boxed(Value),
    List(Vec<Value>),
    Object(FxHashMap<String, Value>),
    Set(FxHashSet<Key>),
    Function(FunctionValue),
    Context(Context),
    Iterator(IteratorState),
}

impl HeapValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HeapValue::Boxed(_) => "box",
            HeapValue::List(_) => "list",
            HeapValue::Object(_) => "object",
            HeapValue::Set(_) => "set",
            HeapValue::Function(_) => "function",
            HeapValue::Context(_) => "context",
            HeapValue::Iterator(_) => "iterator",
        }
    }

    /// Addresses this value holds a reference on
    pub fn children(&self) -> Vec<Address> {
        fn refs<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Address> {
            values.filter_map(Value::as_address).collect()
        }

        match self {
            HeapValue::Boxed(value) => refs(std::iter::once(value)),
            HeapValue::List(items) => refs(items.iter()),
            HeapValue::Object(fields) => refs(fields.values()),
            HeapValue::Set(_) => Vec::new(),
            HeapValue::Function(FunctionValue::User { captured, .. }) => vec![*captured],
            HeapValue::Function(FunctionValue::Builtin(_)) => Vec::new(),
            HeapValue::Context(ctx) => ctx.children(),
            HeapValue::Iterator(iter) => iter.children(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("x".to_string()).is_truthy());
        assert!(Value::Ref(Address(0)).is_truthy());
    }

    #[test]
    fn test_floats_are_not_keys() {
        assert_eq!(Key::from_value(&Value::Float(1.0)), None);
        assert_eq!(Key::from_value(&Value::Int(3)), Some(Key::Int(3)));
    }

    #[test]
    fn test_list_children() {
        let list = HeapValue::List(vec![
            Value::Int(1),
            Value::Ref(Address(7)),
            Value::Ref(Address(9)),
        ]);
        assert_eq!(list.children(), vec![Address(7), Address(9)]);
    }
}
