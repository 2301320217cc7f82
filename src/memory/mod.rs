//! Memory model for the analyzer
//!
//! This module provides the core memory abstractions:
//! - [`value`]: Runtime values and heap cell contents
//! - [`heap`]: The versioned, reference-counted heap (generation chain)
//! - [`stack`]: The named execution stack used by the node protocol
//! - [`context`]: Heap-resident execution contexts (lexical scopes)
//! - [`iterator`]: Heap-resident iterators that survive rollback
//!
//! # Ownership
//!
//! Every `Value::Ref` stored in a stack entry, a context binding, a container
//! element or an iterator source owns one reference on its cell. Frozen
//! copies of the stack own nothing: they are only ever reinstated together
//! with the generation they were captured with, whose counts already include
//! them.

pub mod context;
pub mod heap;
pub mod iterator;
pub mod stack;
pub mod value;

pub use heap::{GenerationId, Heap};
pub use stack::ExecutionStack;
pub use value::{Address, HeapValue, Value};
