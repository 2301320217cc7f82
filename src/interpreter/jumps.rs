//! Control statements (`exit`, `next`, `redo`, `restart`, `return`).
//!
//! A control statement pushes a [`ControlToken`] under the reserved
//! `Control` name and sends `Control(kind)` to its parent. Each composite
//! node on the way up either consumes the token or tears down its own stack
//! entries and relays the signal further. Tags are matched at runtime.

use crate::compiler::node::{NodeId, Signal};
use crate::interpreter::engine::{Analyzer, StepResult};
use crate::interpreter::errors::EngineFault;
use crate::memory::stack::{ControlToken, Slot, CONTROL};
use crate::memory::value::Value;
use crate::parser::ast::ControlKind;
use tracing::trace;

impl Analyzer {
    pub(crate) fn step_control(
        &mut self,
        id: NodeId,
        kind: ControlKind,
        tag: Option<&str>,
        value: Option<NodeId>,
        signal: Signal,
    ) -> StepResult {
        let value = match (signal, value) {
            (Signal::Start, Some(value)) => {
                self.goto(value, Signal::Start);
                return Ok(());
            }
            (Signal::Start, None) => Value::Nil,
            (Signal::Child(0), Some(_)) => self.stack.pop_value()?,
            (other, _) => return Err(self.invalid_signal(id, other)),
        };

        self.stack.push_named(
            CONTROL,
            Slot::Control(ControlToken {
                kind,
                tag: tag.map(str::to_string),
                value,
                source: id,
            }),
        );
        self.relay_control(id, kind)
    }

    /// Pass `Control(kind)` on to the parent of `id`
    pub(crate) fn relay_control(&mut self, id: NodeId, kind: ControlKind) -> StepResult {
        let parent = self.node(id)?.parent.ok_or_else(|| EngineFault::MalformedTree {
            detail: format!("control signal reached parentless node {}", id),
        })?;
        trace!(from = %id, to = %parent, %kind, "relaying control");
        self.goto(parent, Signal::Control(kind));
        Ok(())
    }

    /// Take the pending token if a consumer with `tag` may handle it.
    /// `loop_consumer` is set for loops, which also accept untagged tokens;
    /// tagged blocks only accept tokens naming them.
    pub(crate) fn take_control(
        &mut self,
        tag: Option<&str>,
        loop_consumer: bool,
    ) -> Result<Option<ControlToken>, EngineFault> {
        let token = self.stack.control_token()?;
        let accepted = token.kind != ControlKind::Return
            && match &token.tag {
                None => loop_consumer,
                Some(_) => tag.is_some() && token.targets(tag),
            };
        if !accepted {
            return Ok(None);
        }

        match self.stack.remove(CONTROL)? {
            Slot::Control(token) => {
                self.heap.release(&token.value)?;
                Ok(Some(token))
            }
            _ => Err(EngineFault::InvalidStackSlot {
                name: CONTROL,
                expected: "a control token",
            }),
        }
    }

    /// Tagged blocks consume tokens naming them: `exit`/`next` leave the
    /// block, `redo`/`restart` run it again
    pub(crate) fn block_control(
        &mut self,
        id: NodeId,
        tag: Option<&str>,
        scoped: bool,
        kind: ControlKind,
    ) -> StepResult {
        if scoped {
            self.leave_context()?;
        }
        if tag.is_none() || self.take_control(tag, false)?.is_none() {
            return self.relay_control(id, kind);
        }

        match kind {
            ControlKind::Exit | ControlKind::Next => self.finish(id),
            ControlKind::Redo | ControlKind::Restart => {
                self.goto(id, Signal::Start);
                Ok(())
            }
            ControlKind::Return => Err(self.invalid_signal(id, Signal::Control(kind))),
        }
    }
}
