//! Scope handling for the analyzer
//!
//! The current context is the most recent `Context` entry on the execution
//! stack, or the root context before the module has entered its own. It is
//! passed around explicitly; there is no ambient "current scope" state.

use crate::interpreter::engine::{Analyzer, StepResult};
use crate::interpreter::errors::{EngineFault, Interrupt, RuntimeError};
use crate::memory::context::{self, AssignOutcome, Context, ContextKind};
use crate::memory::stack::{Slot, CONTEXT};
use crate::memory::value::{Address, HeapValue, Value};
use crate::parser::ast::Span;
use tracing::debug;

impl Analyzer {
    pub(crate) fn current_context(&self) -> Result<Address, EngineFault> {
        let address = if self.stack.contains(CONTEXT) {
            self.stack
                .get_value(CONTEXT)?
                .as_address()
                .ok_or(EngineFault::InvalidStackSlot {
                    name: CONTEXT,
                    expected: "a context reference",
                })?
        } else {
            self.root_context.ok_or(EngineFault::NotPrepared)?
        };

        if self.heap.is_freed(address) {
            return Err(EngineFault::DeadContext { address });
        }
        Ok(address)
    }

    /// Allocate a context whose prototype is `prototype`, returning the
    /// owned reference
    pub(crate) fn create_context(
        &mut self,
        kind: ContextKind,
        prototype: Address,
    ) -> Result<Address, EngineFault> {
        self.heap.increase_reference_count(prototype)?;
        let address = self
            .heap
            .allocate(HeapValue::Context(Context::new(kind, Some(prototype))));
        self.contexts_created += 1;
        debug!(%address, kind = kind.label(), %prototype, "created context");
        Ok(address)
    }

    /// Open a nested scope on top of the current one
    pub(crate) fn enter_context(&mut self, kind: ContextKind) -> Result<Address, EngineFault> {
        let parent = self.current_context()?;
        let address = self.create_context(kind, parent)?;
        self.stack
            .push_named(CONTEXT, Slot::Value(Value::Ref(address)));
        Ok(address)
    }

    /// Close the innermost scope, releasing the stack's reference on it
    pub(crate) fn leave_context(&mut self) -> Result<(), EngineFault> {
        let context = self.stack.remove_value(CONTEXT)?;
        let freed = self.heap.release(&context)?;
        debug!(context = %context, freed, "left context");
        Ok(())
    }

    /// Bind `name` in the current context, taking ownership of `value`
    pub(crate) fn declare(&mut self, name: &str, value: Value, constant: bool) -> StepResult {
        let ctx = self.current_context()?;
        self.declare_in(ctx, name, value, constant)
    }

    pub(crate) fn declare_in(
        &mut self,
        ctx: Address,
        name: &str,
        value: Value,
        constant: bool,
    ) -> StepResult {
        if let Some(shadowed) = context::declare(&mut self.heap, ctx, name, value, constant)? {
            self.heap.release(&shadowed)?;
        }
        Ok(())
    }

    /// Resolve `name` from the current context. The value is borrowed.
    pub(crate) fn lookup(&self, name: &str, span: Span) -> Result<Value, Interrupt> {
        let ctx = self.current_context()?;
        match context::lookup(&self.heap, ctx, name)? {
            Some(value) => Ok(value),
            None => Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
                span,
            }
            .into()),
        }
    }

    /// Overwrite an existing binding, taking ownership of `value`
    pub(crate) fn assign(&mut self, name: &str, value: Value, span: Span) -> StepResult {
        let ctx = self.current_context()?;
        match context::assign(&mut self.heap, ctx, name, value.clone())? {
            AssignOutcome::Assigned(old) => {
                self.heap.release(&old)?;
                Ok(())
            }
            AssignOutcome::Constant => {
                self.heap.release(&value)?;
                Err(RuntimeError::ConstantAssignment {
                    name: name.to_string(),
                    span,
                }
                .into())
            }
            AssignOutcome::Undefined => {
                self.heap.release(&value)?;
                Err(RuntimeError::UndefinedVariable {
                    name: name.to_string(),
                    span,
                }
                .into())
            }
        }
    }
}
