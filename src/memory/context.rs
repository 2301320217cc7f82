//! Execution contexts
//!
//! A context is a heap-resident lexical scope. Contexts form a tree through
//! their `prototype` link (the enclosing scope), independent of the heap's
//! generation chain. Besides user bindings a context carries hidden
//! bookkeeping: the caller's context, the resumption point to return to and
//! the step counter used by multi-step builtins.
//!
//! The helpers here resolve and update bindings through the prototype
//! chain; the analyzer wraps them with source-located errors.

use super::heap::Heap;
use super::value::{Address, HeapValue, Value};
use crate::compiler::node::ResumptionPoint;
use crate::interpreter::errors::EngineFault;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Root,
    Module,
    Function,
    Pattern,
    Block,
    Builtin,
    Iteration,
}

impl ContextKind {
    pub fn label(self) -> &'static str {
        match self {
            ContextKind::Root => "root",
            ContextKind::Module => "module",
            ContextKind::Function => "function",
            ContextKind::Pattern => "pattern",
            ContextKind::Block => "block",
            ContextKind::Builtin => "builtin",
            ContextKind::Iteration => "iteration",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    pub constant: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub kind: ContextKind,
    pub prototype: Option<Address>,
    pub bindings: FxHashMap<String, Binding>,
    /// Hidden: context that was current when this one was called
    pub caller: Option<Address>,
    /// Hidden: where a function returns to
    pub return_point: Option<ResumptionPoint>,
    /// Hidden: progress of a multi-step builtin
    pub builtin_step: u32,
}

impl Context {
    pub fn new(kind: ContextKind, prototype: Option<Address>) -> Self {
        Context {
            kind,
            prototype,
            bindings: FxHashMap::default(),
            caller: None,
            return_point: None,
            builtin_step: 0,
        }
    }

    /// Addresses this context holds a reference on
    pub fn children(&self) -> Vec<Address> {
        self.prototype
            .iter()
            .chain(self.caller.iter())
            .copied()
            .chain(self.bindings.values().filter_map(|b| b.value.as_address()))
            .collect()
    }

    /// Binding names in a stable order
    pub fn sorted_names(&self) -> Vec<&String> {
        let mut names: Vec<&String> = self.bindings.keys().collect();
        names.sort();
        names
    }
}

/// Result of assigning through the prototype chain
#[derive(Debug, Clone, PartialEq)]
pub enum AssignOutcome {
    /// The previous value, now owned by the caller
    Assigned(Value),
    Constant,
    Undefined,
}

pub fn read_context(heap: &Heap, address: Address) -> Result<&Context, EngineFault> {
    match heap.read(address)? {
        HeapValue::Context(ctx) => Ok(ctx),
        other => Err(EngineFault::UnexpectedHeapValue {
            address,
            expected: "context",
            found: other.type_name(),
        }),
    }
}

pub fn context_mut(heap: &mut Heap, address: Address) -> Result<&mut Context, EngineFault> {
    match heap.write_for_mutation(address)? {
        HeapValue::Context(ctx) => Ok(ctx),
        other => Err(EngineFault::UnexpectedHeapValue {
            address,
            expected: "context",
            found: other.type_name(),
        }),
    }
}

/// Find the context in the prototype chain that binds `name`
pub fn resolve(heap: &Heap, start: Address, name: &str) -> Result<Option<Address>, EngineFault> {
    let mut current = Some(start);
    while let Some(address) = current {
        let ctx = read_context(heap, address)?;
        if ctx.bindings.contains_key(name) {
            return Ok(Some(address));
        }
        current = ctx.prototype;
    }
    Ok(None)
}

/// Look `name` up through the prototype chain. The returned value is
/// borrowed: retain it before storing it anywhere.
pub fn lookup(heap: &Heap, start: Address, name: &str) -> Result<Option<Value>, EngineFault> {
    match resolve(heap, start, name)? {
        Some(address) => Ok(read_context(heap, address)?
            .bindings
            .get(name)
            .map(|b| b.value.clone())),
        None => Ok(None),
    }
}

/// Bind `name` in `ctx` itself, taking ownership of `value`. Returns the
/// shadowed value of a previous binding in the same context, if any.
pub fn declare(
    heap: &mut Heap,
    ctx: Address,
    name: &str,
    value: Value,
    constant: bool,
) -> Result<Option<Value>, EngineFault> {
    let context = context_mut(heap, ctx)?;
    Ok(context
        .bindings
        .insert(name.to_string(), Binding { value, constant })
        .map(|old| old.value))
}

/// Overwrite the nearest existing binding of `name`, taking ownership of
/// `value` on success
pub fn assign(
    heap: &mut Heap,
    start: Address,
    name: &str,
    value: Value,
) -> Result<AssignOutcome, EngineFault> {
    let Some(owner) = resolve(heap, start, name)? else {
        return Ok(AssignOutcome::Undefined);
    };

    let context = context_mut(heap, owner)?;
    match context.bindings.get_mut(name) {
        Some(binding) if binding.constant => Ok(AssignOutcome::Constant),
        Some(binding) => Ok(AssignOutcome::Assigned(std::mem::replace(
            &mut binding.value,
            value,
        ))),
        None => Ok(AssignOutcome::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_context(heap: &mut Heap, prototype: Option<Address>) -> Address {
        heap.allocate(HeapValue::Context(Context::new(ContextKind::Block, prototype)))
    }

    #[test]
    fn test_lookup_walks_prototypes() {
        let mut heap = Heap::new();
        let outer = new_context(&mut heap, None);
        let inner = new_context(&mut heap, Some(outer));
        declare(&mut heap, outer, "x", Value::Int(1), false).unwrap();

        assert_eq!(lookup(&heap, inner, "x").unwrap(), Some(Value::Int(1)));
        assert_eq!(lookup(&heap, inner, "y").unwrap(), None);
    }

    #[test]
    fn test_shadowing_does_not_touch_outer() {
        let mut heap = Heap::new();
        let outer = new_context(&mut heap, None);
        let inner = new_context(&mut heap, Some(outer));
        declare(&mut heap, outer, "x", Value::Int(1), false).unwrap();
        declare(&mut heap, inner, "x", Value::Int(2), false).unwrap();

        assert_eq!(lookup(&heap, inner, "x").unwrap(), Some(Value::Int(2)));
        assert_eq!(lookup(&heap, outer, "x").unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_assign_respects_constants() {
        let mut heap = Heap::new();
        let outer = new_context(&mut heap, None);
        let inner = new_context(&mut heap, Some(outer));
        declare(&mut heap, outer, "k", Value::Int(1), true).unwrap();
        declare(&mut heap, outer, "v", Value::Int(1), false).unwrap();

        assert_eq!(
            assign(&mut heap, inner, "k", Value::Int(2)).unwrap(),
            AssignOutcome::Constant
        );
        assert_eq!(
            assign(&mut heap, inner, "v", Value::Int(2)).unwrap(),
            AssignOutcome::Assigned(Value::Int(1))
        );
        assert_eq!(
            assign(&mut heap, inner, "nope", Value::Nil).unwrap(),
            AssignOutcome::Undefined
        );
        assert_eq!(lookup(&heap, outer, "v").unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn test_binding_changes_roll_back() {
        let mut heap = Heap::new();
        let ctx = new_context(&mut heap, None);
        declare(&mut heap, ctx, "x", Value::Int(1), false).unwrap();
        let frozen = heap.current_generation();
        heap.new_generation();

        assign(&mut heap, ctx, "x", Value::Int(2)).unwrap();
        heap.discard_newer_than(frozen).unwrap();
        assert_eq!(lookup(&heap, ctx, "x").unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_children_include_hidden_links() {
        let mut ctx = Context::new(ContextKind::Function, Some(Address(1)));
        ctx.caller = Some(Address(2));
        ctx.bindings.insert(
            "f".to_string(),
            Binding {
                value: Value::Ref(Address(3)),
                constant: false,
            },
        );
        assert_eq!(ctx.children(), vec![Address(1), Address(2), Address(3)]);
    }
}
