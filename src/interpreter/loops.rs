//! Loop execution (`while`, `for`).
//!
//! Loops consume control tokens that are untagged or carry the loop's own
//! tag (except `return`): `exit` leaves the loop, `next` moves on to the
//! next iteration, `redo` reruns the body without re-checking or advancing,
//! `restart` starts over (re-checking the condition, or rewinding the
//! iterator). Anything else is relayed after the loop cleans up.

use crate::compiler::node::{NodeId, Signal};
use crate::interpreter::engine::{Analyzer, StepResult};
use crate::interpreter::errors::{EngineFault, RuntimeError};
use crate::memory::context::ContextKind;
use crate::memory::iterator::IteratorState;
use crate::memory::stack::{Slot, ITERATOR};
use crate::memory::value::{Address, HeapValue, Value};
use crate::parser::ast::{ControlKind, Span};

/// Internal state of `for`: fetch the next element
const NEXT_ELEMENT: u32 = 0;

impl Analyzer {
    pub(crate) fn step_while(
        &mut self,
        id: NodeId,
        tag: Option<&str>,
        condition: NodeId,
        body: NodeId,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start | Signal::Child(1) => {
                self.goto(condition, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                let value = self.stack.pop_value()?;
                let truthy = value.is_truthy();
                self.heap.release(&value)?;
                if truthy {
                    self.goto(body, Signal::Start);
                    Ok(())
                } else {
                    self.finish(id)
                }
            }
            Signal::Control(kind) => {
                if self.take_control(tag, true)?.is_none() {
                    return self.relay_control(id, kind);
                }
                match kind {
                    ControlKind::Exit => self.finish(id),
                    ControlKind::Next | ControlKind::Restart => {
                        self.goto(condition, Signal::Start);
                        Ok(())
                    }
                    ControlKind::Redo => {
                        self.goto(body, Signal::Start);
                        Ok(())
                    }
                    ControlKind::Return => Err(self.invalid_signal(id, signal)),
                }
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn step_for(
        &mut self,
        id: NodeId,
        tag: Option<&str>,
        var: &str,
        iterable: NodeId,
        body: NodeId,
        span: Span,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                self.goto(iterable, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                let value = self.stack.pop_value()?;
                let Some(state) = IteratorState::over(&mut self.heap, &value)? else {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "iterable".to_string(),
                        found: value.type_name().to_string(),
                        span,
                    }
                    .into());
                };
                self.heap.release(&value)?;
                let iterator = self.heap.allocate(HeapValue::Iterator(state));
                self.stack
                    .push_named(ITERATOR, Slot::Value(Value::Ref(iterator)));
                self.enter_context(ContextKind::Iteration)?;
                self.goto(id, Signal::Internal(NEXT_ELEMENT));
                Ok(())
            }
            Signal::Internal(NEXT_ELEMENT) => self.next_element(id, var, body),
            Signal::Child(1) => {
                self.goto(id, Signal::Internal(NEXT_ELEMENT));
                Ok(())
            }
            Signal::Control(kind) => {
                if self.take_control(tag, true)?.is_none() {
                    self.end_for()?;
                    return self.relay_control(id, kind);
                }
                match kind {
                    ControlKind::Exit => {
                        self.end_for()?;
                        self.finish(id)
                    }
                    ControlKind::Next => {
                        self.goto(id, Signal::Internal(NEXT_ELEMENT));
                        Ok(())
                    }
                    ControlKind::Redo => {
                        self.goto(body, Signal::Start);
                        Ok(())
                    }
                    ControlKind::Restart => {
                        let iterator = self.loop_iterator()?;
                        self.heap.clone_on_generation_shift(iterator)?.restart();
                        self.goto(id, Signal::Internal(NEXT_ELEMENT));
                        Ok(())
                    }
                    ControlKind::Return => Err(self.invalid_signal(id, signal)),
                }
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    fn loop_iterator(&self) -> Result<Address, EngineFault> {
        self.stack
            .get_value(ITERATOR)?
            .as_address()
            .ok_or(EngineFault::InvalidStackSlot {
                name: ITERATOR,
                expected: "an iterator reference",
            })
    }

    /// Bind the next element to `var` and run the body, or end the loop
    fn next_element(&mut self, id: NodeId, var: &str, body: NodeId) -> StepResult {
        let iterator = self.loop_iterator()?;
        let element = match self.heap.read(iterator)? {
            HeapValue::Iterator(state) => state.current(&self.heap)?,
            other => {
                return Err(EngineFault::UnexpectedHeapValue {
                    address: iterator,
                    expected: "iterator",
                    found: other.type_name(),
                }
                .into())
            }
        };

        let Some(element) = element else {
            self.end_for()?;
            return self.finish(id);
        };

        self.heap.clone_on_generation_shift(iterator)?.advance();
        self.heap.retain(&element)?;
        self.declare(var, element, false)?;
        self.goto(body, Signal::Start);
        Ok(())
    }

    /// Drop the iteration context and the iterator
    fn end_for(&mut self) -> Result<(), EngineFault> {
        self.leave_context()?;
        let iterator = self.stack.remove_value(ITERATOR)?;
        self.heap.release(&iterator)?;
        Ok(())
    }
}
