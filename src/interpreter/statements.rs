//! Statement handlers: module, blocks, declarations, assignment, `if` and
//! expression statements.

use crate::compiler::node::{AssignTarget, NodeId, Signal};
use crate::interpreter::engine::{Analyzer, StepResult};
use crate::interpreter::errors::{EngineFault, RuntimeError};
use crate::memory::context::ContextKind;
use crate::memory::value::{HeapValue, Key, Value};
use crate::parser::ast::{BinOp, Span};

impl Analyzer {
    /// The module runs its statements in a module context, then the entry
    /// call. The module context stays alive after the run.
    pub(crate) fn step_module(&mut self, id: NodeId, body: &[NodeId], signal: Signal) -> StepResult {
        match signal {
            Signal::Start => {
                self.enter_context(ContextKind::Module)?;
                self.step_sequence_child(id, body, 0)
            }
            Signal::Child(i) => self.step_sequence_child(id, body, i as usize + 1),
            Signal::Control(_) => Err(self.unhandled_control()?.into()),
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Go to `body[next]`, or finish when it is past the end
    pub(crate) fn step_sequence_child(
        &mut self,
        id: NodeId,
        body: &[NodeId],
        next: usize,
    ) -> StepResult {
        match body.get(next) {
            Some(child) => {
                self.goto(*child, Signal::Start);
                Ok(())
            }
            None => self.finish(id),
        }
    }

    pub(crate) fn step_block(
        &mut self,
        id: NodeId,
        tag: Option<&str>,
        body: &[NodeId],
        scoped: bool,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                if scoped {
                    self.enter_context(ContextKind::Block)?;
                }
                self.block_next(id, body, 0, scoped)
            }
            Signal::Child(i) => self.block_next(id, body, i as usize + 1, scoped),
            Signal::Control(kind) => self.block_control(id, tag, scoped, kind),
            other => Err(self.invalid_signal(id, other)),
        }
    }

    fn block_next(&mut self, id: NodeId, body: &[NodeId], next: usize, scoped: bool) -> StepResult {
        if next >= body.len() && scoped {
            self.leave_context()?;
        }
        self.step_sequence_child(id, body, next)
    }

    pub(crate) fn step_if(
        &mut self,
        id: NodeId,
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                self.goto(condition, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                let value = self.stack.pop_value()?;
                let truthy = value.is_truthy();
                self.heap.release(&value)?;
                match (truthy, else_branch) {
                    (true, _) => self.goto(then_branch, Signal::Start),
                    (false, Some(else_branch)) => self.goto(else_branch, Signal::Start),
                    (false, None) => return self.finish(id),
                }
                Ok(())
            }
            Signal::Child(1) | Signal::Child(2) => self.finish(id),
            Signal::Control(kind) => self.relay_control(id, kind),
            other => Err(self.invalid_signal(id, other)),
        }
    }

    pub(crate) fn step_declare(
        &mut self,
        id: NodeId,
        name: &str,
        constant: bool,
        init: Option<NodeId>,
        signal: Signal,
    ) -> StepResult {
        match (signal, init) {
            (Signal::Start, Some(init)) => {
                self.goto(init, Signal::Start);
                Ok(())
            }
            (Signal::Start, None) => {
                self.declare(name, Value::Nil, constant)?;
                self.finish(id)
            }
            (Signal::Child(0), Some(_)) => {
                let value = self.stack.pop_value()?;
                self.declare(name, value, constant)?;
                self.finish(id)
            }
            (other, _) => Err(self.invalid_signal(id, other)),
        }
    }

    pub(crate) fn step_expr_statement(&mut self, id: NodeId, expr: NodeId, signal: Signal) -> StepResult {
        match signal {
            Signal::Start => {
                self.goto(expr, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                let value = self.stack.pop_value()?;
                self.heap.release(&value)?;
                self.finish(id)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Operands of the target are evaluated first (object, then index),
    /// then the assigned value, which reports as `Child(operand_count)`
    pub(crate) fn step_assign(
        &mut self,
        id: NodeId,
        target: &AssignTarget,
        op: Option<BinOp>,
        value: NodeId,
        span: Span,
        signal: Signal,
    ) -> StepResult {
        let operands: Vec<NodeId> = match target {
            AssignTarget::Name(_) => vec![],
            AssignTarget::Index { object, index } => vec![*object, *index],
            AssignTarget::Field { object, .. } => vec![*object],
        };
        let count = target.operand_count();

        match signal {
            Signal::Start => {
                self.goto(operands.first().copied().unwrap_or(value), Signal::Start);
                Ok(())
            }
            Signal::Child(i) if i < count => {
                let next = operands.get(i as usize + 1).copied().unwrap_or(value);
                self.goto(next, Signal::Start);
                Ok(())
            }
            Signal::Child(i) if i == count => {
                let value = self.stack.pop_value()?;
                match target {
                    AssignTarget::Name(name) => {
                        let value = match op {
                            Some(op) => {
                                let current = self.lookup(name, span)?;
                                let combined = self.binary_value(op, &current, &value, span)?;
                                self.heap.release(&value)?;
                                combined
                            }
                            None => value,
                        };
                        self.assign(name, value, span)?;
                    }
                    AssignTarget::Index { .. } => {
                        let index = self.stack.pop_value()?;
                        let object = self.stack.pop_value()?;
                        self.assign_index(&object, &index, value, op, span)?;
                        self.heap.release(&index)?;
                        self.heap.release(&object)?;
                    }
                    AssignTarget::Field { name, .. } => {
                        let object = self.stack.pop_value()?;
                        let key = Value::Str(name.clone());
                        self.assign_index(&object, &key, value, op, span)?;
                        self.heap.release(&object)?;
                    }
                }
                self.finish(id)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Store `value` (owned) into a list slot, object field or context
    /// binding, combining with the old value first for compound assignment
    fn assign_index(
        &mut self,
        object: &Value,
        index: &Value,
        value: Value,
        op: Option<BinOp>,
        span: Span,
    ) -> StepResult {
        let Value::Ref(address) = object else {
            return Err(RuntimeError::TypeMismatch {
                expected: "list or object".to_string(),
                found: object.type_name().to_string(),
                span,
            }
            .into());
        };

        let value = match op {
            Some(op) => {
                let current = self.index_value(object, index, span)?;
                let combined = self.binary_value(op, &current, &value, span)?;
                self.heap.release(&current)?;
                self.heap.release(&value)?;
                combined
            }
            None => value,
        };

        // Pattern results are contexts; their bindings behave like fields
        if matches!(self.heap.read(*address)?, HeapValue::Context(_)) {
            return match index {
                Value::Str(key) => self.declare_in(*address, key, value, false),
                other => Err(RuntimeError::TypeMismatch {
                    expected: "string key".to_string(),
                    found: other.type_name().to_string(),
                    span,
                }
                .into()),
            };
        }

        let old = match self.heap.write_for_mutation(*address)? {
            HeapValue::List(items) => {
                let len = items.len();
                let slot = match index {
                    Value::Int(i) => list_slot(*i, len),
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "int".to_string(),
                            found: other.type_name().to_string(),
                            span,
                        }
                        .into())
                    }
                };
                match slot {
                    Some(slot) => std::mem::replace(&mut items[slot], value),
                    None => {
                        return Err(RuntimeError::IndexOutOfBounds {
                            index: index.as_int().unwrap_or_default(),
                            len,
                            span,
                        }
                        .into())
                    }
                }
            }
            HeapValue::Object(fields) => match index {
                Value::Str(key) => fields.insert(key.clone(), value).unwrap_or_default(),
                other => {
                    return Err(RuntimeError::TypeMismatch {
                        expected: "string key".to_string(),
                        found: other.type_name().to_string(),
                        span,
                    }
                    .into())
                }
            },
            HeapValue::Set(members) => {
                // `s[k] = true` adds, `s[k] = false` removes
                let key = Key::from_value(index).ok_or_else(|| RuntimeError::TypeMismatch {
                    expected: "hashable key".to_string(),
                    found: index.type_name().to_string(),
                    span,
                })?;
                if value.is_truthy() {
                    members.insert(key);
                } else {
                    members.remove(&key);
                }
                value
            }
            other => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "list or object".to_string(),
                    found: other.type_name().to_string(),
                    span,
                }
                .into())
            }
        };
        self.heap.release(&old)?;
        Ok(())
    }

    /// Fault for a control signal that found no consumer
    pub(crate) fn unhandled_control(&mut self) -> Result<EngineFault, EngineFault> {
        let token = self.stack.control_token()?.clone();
        Ok(EngineFault::UnhandledControlStatementSignal {
            kind: token.kind,
            tag: token.tag,
            span: self.span_of(token.source),
        })
    }
}

/// Resolve a possibly negative index against a list length
pub(crate) fn list_slot(index: i64, len: usize) -> Option<usize> {
    let slot = if index < 0 {
        len as i64 + index
    } else {
        index
    };
    (0..len as i64).contains(&slot).then_some(slot as usize)
}
