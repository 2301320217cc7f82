//! Match results detached from the heap.
//!
//! A finished run reports whether it matched, how much input it consumed,
//! the entry point's value and the captured output. Values are copied out
//! of the heap into a plain tree, so the result outlives the analyzer and
//! serializes with `serde`. A pattern's context becomes an object of its
//! bindings.

use crate::interpreter::constants::MAX_RESULT_DEPTH;
use crate::interpreter::errors::{Interrupt, RuntimeError};
use crate::memory::value::{Address, FunctionValue, HeapValue, Value};
use crate::memory::Heap;
use crate::parser::ast::Span;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Characters consumed from the start of the input
    pub length: usize,
    pub value: ResultValue,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ResultValue>),
    Object(BTreeMap<String, ResultValue>),
    /// A reference back to a container already being copied
    Cycle {
        #[serde(rename = "$ref")]
        reference: String,
    },
}

impl ResultValue {
    /// Copy `value` out of the heap. Containers nested deeper than
    /// `MAX_RESULT_DEPTH` abort with `NestingTooDeep` reported at `span`.
    pub fn from_value(heap: &Heap, value: &Value, span: Span) -> Result<ResultValue, Interrupt> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut on_path: FxHashSet<Address> = FxHashSet::default();
        let mut current = value.clone();

        loop {
            let mut finished = match current {
                Value::Nil => Some(ResultValue::Nil),
                Value::Bool(b) => Some(ResultValue::Bool(b)),
                Value::Int(n) => Some(ResultValue::Int(n)),
                Value::Float(n) => Some(ResultValue::Float(n)),
                Value::Str(s) => Some(ResultValue::Str(s)),
                Value::Ref(address) if on_path.contains(&address) => Some(ResultValue::Cycle {
                    reference: address.to_string(),
                }),
                Value::Ref(address) => match Frame::open(address, heap.read(address)?) {
                    Opened::Leaf(leaf) => Some(leaf),
                    Opened::Frame(frame) => {
                        if frames.len() >= MAX_RESULT_DEPTH {
                            return Err(Interrupt::Abort(RuntimeError::NestingTooDeep {
                                limit: MAX_RESULT_DEPTH,
                                span,
                            }));
                        }
                        on_path.insert(address);
                        frames.push(frame);
                        None
                    }
                },
            };

            // Hand finished values up until some frame still has children
            loop {
                let Some(top) = frames.last_mut() else {
                    return Ok(finished.unwrap_or(ResultValue::Nil));
                };
                if let Some(done) = finished.take() {
                    top.accept(done);
                }
                if let Some((key, child)) = top.pending.pop() {
                    top.key = key;
                    current = child;
                    break;
                }
                if let Some(frame) = frames.pop() {
                    on_path.remove(&frame.address);
                    finished = Some(frame.close());
                }
            }
        }
    }

    /// Field of an object result, if this is one
    pub fn get(&self, key: &str) -> Option<&ResultValue> {
        match self {
            ResultValue::Object(fields) => fields.get(key),
            _ => None,
        }
    }
}

/// A container being copied: children still to visit, in reverse order,
/// and what has been built from the ones already visited
struct Frame {
    address: Address,
    pending: Vec<(Option<String>, Value)>,
    key: Option<String>,
    built: Built,
}

enum Built {
    /// A box copies out as its content
    Boxed(Option<ResultValue>),
    List(Vec<ResultValue>),
    Object(BTreeMap<String, ResultValue>),
}

enum Opened {
    Leaf(ResultValue),
    Frame(Frame),
}

impl Frame {
    fn open(address: Address, cell: &HeapValue) -> Opened {
        let (built, mut pending): (Built, Vec<(Option<String>, Value)>) = match cell {
            HeapValue::Boxed(inner) => (Built::Boxed(None), vec![(None, inner.clone())]),
            HeapValue::List(items) => (
                Built::List(Vec::with_capacity(items.len())),
                items.iter().map(|item| (None, item.clone())).collect(),
            ),
            HeapValue::Object(fields) => (
                Built::Object(BTreeMap::new()),
                fields
                    .iter()
                    .map(|(key, item)| (Some(key.clone()), item.clone()))
                    .collect(),
            ),
            HeapValue::Context(ctx) => (
                Built::Object(BTreeMap::new()),
                ctx.bindings
                    .iter()
                    .map(|(key, binding)| (Some(key.clone()), binding.value.clone()))
                    .collect(),
            ),
            HeapValue::Set(members) => {
                let mut keys: Vec<_> = members.iter().collect();
                keys.sort();
                (
                    Built::List(Vec::with_capacity(keys.len())),
                    keys.into_iter().map(|key| (None, key.to_value())).collect(),
                )
            }
            HeapValue::Function(function) => {
                return Opened::Leaf(ResultValue::Str(match function {
                    FunctionValue::User { .. } => format!("<function {}>", function.name()),
                    FunctionValue::Builtin(builtin) => format!("<builtin {}>", builtin.name()),
                }))
            }
            HeapValue::Iterator(_) => return Opened::Leaf(ResultValue::Str("<iterator>".to_string())),
        };
        pending.reverse();
        Opened::Frame(Frame {
            address,
            pending,
            key: None,
            built,
        })
    }

    fn accept(&mut self, value: ResultValue) {
        match &mut self.built {
            Built::Boxed(slot) => *slot = Some(value),
            Built::List(items) => items.push(value),
            Built::Object(fields) => {
                if let Some(key) = self.key.take() {
                    fields.insert(key, value);
                }
            }
        }
    }

    fn close(self) -> ResultValue {
        match self.built {
            Built::Boxed(inner) => inner.unwrap_or(ResultValue::Nil),
            Built::List(items) => ResultValue::List(items),
            Built::Object(fields) => ResultValue::Object(fields),
        }
    }
}

enum Piece<'a> {
    Value(&'a ResultValue),
    Key(&'a str),
    Text(&'static str),
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pieces = vec![Piece::Value(self)];
        while let Some(piece) = pieces.pop() {
            let value = match piece {
                Piece::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Piece::Key(key) => {
                    write!(f, "{}: ", key)?;
                    continue;
                }
                Piece::Value(value) => value,
            };
            match value {
                ResultValue::Nil => write!(f, "nil")?,
                ResultValue::Bool(b) => write!(f, "{}", b)?,
                ResultValue::Int(n) => write!(f, "{}", n)?,
                ResultValue::Float(n) => write!(f, "{}", n)?,
                ResultValue::Str(s) => write!(f, "{:?}", s)?,
                ResultValue::List(items) => {
                    f.write_str("[")?;
                    pieces.push(Piece::Text("]"));
                    for (i, item) in items.iter().enumerate().rev() {
                        pieces.push(Piece::Value(item));
                        if i > 0 {
                            pieces.push(Piece::Text(", "));
                        }
                    }
                }
                ResultValue::Object(fields) => {
                    f.write_str("{")?;
                    pieces.push(Piece::Text("}"));
                    for (i, (key, item)) in fields.iter().enumerate().rev() {
                        pieces.push(Piece::Value(item));
                        pieces.push(Piece::Key(key));
                        if i > 0 {
                            pieces.push(Piece::Text(", "));
                        }
                    }
                }
                ResultValue::Cycle { reference } => write!(f, "<cycle {}>", reference)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_nested_values_copy_out() {
        let mut heap = Heap::new();
        let inner = heap.allocate(HeapValue::List(vec![Value::Int(1), Value::Str("a".into())]));
        let mut fields = FxHashMap::default();
        fields.insert("xs".to_string(), Value::Ref(inner));
        fields.insert("ok".to_string(), Value::Bool(true));
        let outer = heap.allocate(HeapValue::Object(fields));

        let result = ResultValue::from_value(&heap, &Value::Ref(outer), Span::default()).unwrap();
        assert_eq!(result.to_string(), r#"{ok: true, xs: [1, "a"]}"#);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({"ok": true, "xs": [1, "a"]})
        );
    }

    #[test]
    fn test_cycles_become_references() {
        let mut heap = Heap::new();
        let list = heap.allocate(HeapValue::List(Vec::new()));
        if let HeapValue::List(items) = heap.write_for_mutation(list).unwrap() {
            items.push(Value::Ref(list));
        }

        let result = ResultValue::from_value(&heap, &Value::Ref(list), Span::default()).unwrap();
        assert_eq!(
            result,
            ResultValue::List(vec![ResultValue::Cycle {
                reference: list.to_string()
            }])
        );
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!([{"$ref": list.to_string()}])
        );
    }

    fn nested_lists(heap: &mut Heap, depth: usize) -> Value {
        let mut value = Value::Nil;
        for _ in 0..depth {
            value = Value::Ref(heap.allocate(HeapValue::List(vec![value])));
        }
        value
    }

    #[test]
    fn test_deep_values_copy_out_without_recursion() {
        let mut heap = Heap::new();
        let value = nested_lists(&mut heap, MAX_RESULT_DEPTH);

        let result = ResultValue::from_value(&heap, &value, Span::default()).unwrap();
        let text = result.to_string();
        assert_eq!(text.len(), 2 * MAX_RESULT_DEPTH + 3);
        assert!(text.starts_with("[[[") && text.ends_with("nil]]]"));
    }

    #[test]
    fn test_too_deep_values_are_rejected() {
        let mut heap = Heap::new();
        let value = nested_lists(&mut heap, MAX_RESULT_DEPTH + 1);
        let span = Span {
            start: 4,
            end: 9,
            line: 1,
            column: 5,
        };

        let err = ResultValue::from_value(&heap, &value, span).unwrap_err();
        assert_eq!(
            err,
            Interrupt::Abort(RuntimeError::NestingTooDeep {
                limit: MAX_RESULT_DEPTH,
                span
            })
        );
    }

    #[test]
    fn test_shared_values_are_not_cycles() {
        let mut heap = Heap::new();
        let shared = heap.allocate(HeapValue::List(vec![Value::Int(7)]));
        let pair = heap.allocate(HeapValue::List(vec![Value::Ref(shared), Value::Ref(shared)]));

        let result = ResultValue::from_value(&heap, &Value::Ref(pair), Span::default()).unwrap();
        assert_eq!(result.to_string(), "[[7], [7]]");
    }
}
