//! Stateful iterators
//!
//! Iterators are heap values like any other, so advancing one goes through
//! [`Heap::clone_on_generation_shift`]: an iterator frozen in an older
//! generation is never mutated in place. Iteration over unordered
//! containers (sets, object keys, context bindings) works on a sorted
//! snapshot taken at creation, so replays after backtracking visit elements
//! in the same order.

use super::heap::Heap;
use super::value::{Address, HeapValue, Key, Value};
use crate::interpreter::errors::EngineFault;

#[derive(Debug, Clone, PartialEq)]
pub enum IterSource {
    /// Live list; elements are read through the heap at each step
    List(Address),
    /// Elements captured at creation (all primitive)
    Snapshot(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IteratorState {
    pub source: IterSource,
    pub position: usize,
    pub size: usize,
}

impl IteratorState {
    /// Build an iterator over `value`, or `None` if it is not iterable.
    /// A list source takes a new reference on the list.
    pub fn over(heap: &mut Heap, value: &Value) -> Result<Option<IteratorState>, EngineFault> {
        let snapshot = |items: Vec<Value>| {
            Some(IteratorState {
                size: items.len(),
                source: IterSource::Snapshot(items),
                position: 0,
            })
        };

        let address = match value {
            Value::Str(s) => {
                return Ok(snapshot(
                    s.chars().map(|c| Value::Str(c.to_string())).collect(),
                ))
            }
            Value::Ref(address) => *address,
            _ => return Ok(None),
        };

        let state = match heap.read(address)? {
            HeapValue::List(items) => Some(IteratorState {
                source: IterSource::List(address),
                position: 0,
                size: items.len(),
            }),
            HeapValue::Set(members) => {
                let mut keys: Vec<&Key> = members.iter().collect();
                keys.sort();
                snapshot(keys.into_iter().map(Key::to_value).collect())
            }
            HeapValue::Object(fields) => {
                let mut names: Vec<&String> = fields.keys().collect();
                names.sort();
                snapshot(names.into_iter().map(|n| Value::Str(n.clone())).collect())
            }
            HeapValue::Context(ctx) => snapshot(
                ctx.sorted_names()
                    .into_iter()
                    .map(|n| Value::Str(n.clone()))
                    .collect(),
            ),
            _ => None,
        };

        if matches!(
            state,
            Some(IteratorState {
                source: IterSource::List(_),
                ..
            })
        ) {
            heap.increase_reference_count(address)?;
        }
        Ok(state)
    }

    pub fn is_ended(&self) -> bool {
        self.position >= self.size
    }

    /// Element at the cursor (borrowed; retain before storing)
    pub fn current(&self, heap: &Heap) -> Result<Option<Value>, EngineFault> {
        if self.is_ended() {
            return Ok(None);
        }
        match &self.source {
            IterSource::Snapshot(items) => Ok(items.get(self.position).cloned()),
            IterSource::List(address) => match heap.read(*address)? {
                HeapValue::List(items) => Ok(items.get(self.position).cloned()),
                other => Err(EngineFault::UnexpectedHeapValue {
                    address: *address,
                    expected: "list",
                    found: other.type_name(),
                }),
            },
        }
    }

    pub fn advance(&mut self) {
        if !self.is_ended() {
            self.position += 1;
        }
    }

    pub fn restart(&mut self) {
        self.position = 0;
    }

    pub fn children(&self) -> Vec<Address> {
        match &self.source {
            IterSource::List(address) => vec![*address],
            IterSource::Snapshot(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn test_list_iteration() {
        let mut heap = Heap::new();
        let list = heap.allocate(HeapValue::List(vec![Value::Int(1), Value::Int(2)]));
        let mut iter = IteratorState::over(&mut heap, &Value::Ref(list))
            .unwrap()
            .unwrap();
        assert_eq!(heap.reference_count(list).unwrap(), 2);

        assert_eq!(iter.current(&heap).unwrap(), Some(Value::Int(1)));
        iter.advance();
        assert_eq!(iter.current(&heap).unwrap(), Some(Value::Int(2)));
        iter.advance();
        assert!(iter.is_ended());
        iter.restart();
        assert_eq!(iter.current(&heap).unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_set_order_is_sorted() {
        let mut heap = Heap::new();
        let members: FxHashSet<Key> = [Key::Int(3), Key::Int(1), Key::Int(2)].into_iter().collect();
        let set = heap.allocate(HeapValue::Set(members));
        let iter = IteratorState::over(&mut heap, &Value::Ref(set))
            .unwrap()
            .unwrap();

        assert_eq!(
            iter.source,
            IterSource::Snapshot(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_not_iterable() {
        let mut heap = Heap::new();
        assert_eq!(IteratorState::over(&mut heap, &Value::Int(3)).unwrap(), None);
    }

    #[test]
    fn test_advance_after_freeze_clones_iterator() {
        let mut heap = Heap::new();
        let state = IteratorState::over(&mut heap, &Value::Str("ab".to_string()))
            .unwrap()
            .unwrap();
        let iter = heap.allocate(HeapValue::Iterator(state));
        let frozen = heap.current_generation();
        heap.new_generation();

        heap.clone_on_generation_shift(iter).unwrap().advance();

        match heap.read_at(frozen, iter).unwrap() {
            HeapValue::Iterator(old) => assert_eq!(old.position, 0),
            other => panic!("Expected iterator, got {:?}", other),
        }
        match heap.read(iter).unwrap() {
            HeapValue::Iterator(new) => assert_eq!(new.position, 1),
            other => panic!("Expected iterator, got {:?}", other),
        }
    }
}
