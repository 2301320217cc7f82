//! Calls, the entry point and function/pattern invocation.
//!
//! A call evaluates its callee (kept under `Callee`) and merges its
//! arguments into one `Arguments` bundle. User functions are entered by
//! pushing a `ReturnPoint` and sending `Internal(INVOKE)` to the function
//! node, which creates the callee context, binds parameters, evaluates the
//! missing defaults and runs the body. Returning sends the result back to
//! the saved point. Builtins run in a builtin context, one step at a time.

use crate::compiler::node::{ArgKind, FunctionNode, NodeId, ResumptionPoint, Signal};
use crate::interpreter::builtins::BuiltinOutcome;
use crate::interpreter::engine::{Analyzer, StepResult};
use crate::interpreter::errors::{EngineFault, Interrupt, RuntimeError};
use crate::memory::context::{self, ContextKind};
use crate::memory::stack::{
    ArgumentBundle, Slot, ANONYMOUS, ARGUMENTS, CALLEE, CONTEXT, CONTROL, PARAMETER, RETURN_POINT,
};
use crate::memory::value::{Address, FunctionValue, HeapValue, Value};
use crate::parser::ast::{ControlKind, Span};
use tracing::trace;

/// Call/entry: callee and arguments are ready
pub(crate) const INVOKE: u32 = 0;
/// Call/entry: run one step of a builtin
const BUILTIN_STEP: u32 = 1;
/// Call/entry: the callee's result is on the stack
const RETURNED: u32 = 2;
/// Function: bind the next missing parameter from its default
const NEXT_DEFAULT: u32 = 1;

impl Analyzer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn step_call(
        &mut self,
        id: NodeId,
        callee: NodeId,
        args: &[NodeId],
        kinds: &[ArgKind],
        span: Span,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                self.goto(callee, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                self.stack.rename(ANONYMOUS, CALLEE)?;
                self.stack
                    .push_named(ARGUMENTS, Slot::Arguments(ArgumentBundle::default()));
                self.next_argument(id, args, 0);
                Ok(())
            }
            Signal::Child(i) => {
                let index = i as usize - 1;
                let value = self.stack.pop_value()?;
                let kind = kinds.get(index).ok_or_else(|| EngineFault::MalformedTree {
                    detail: format!("call {} has no kind for argument {}", id, index),
                })?;
                self.add_argument(kind, value, span)?;
                self.next_argument(id, args, index + 1);
                Ok(())
            }
            Signal::Internal(INVOKE) => self.invoke(id, span),
            Signal::Internal(BUILTIN_STEP) => self.builtin_step(id, span),
            Signal::Internal(RETURNED) => {
                let result = self.stack.pop_value()?;
                let callee = self.stack.remove_value(CALLEE)?;
                self.heap.release(&callee)?;
                self.stack.push(result);
                self.finish(id)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Call the configured entry point with no arguments and keep its result
    pub(crate) fn step_entry(&mut self, id: NodeId, span: Span, signal: Signal) -> StepResult {
        match signal {
            Signal::Start => {
                let name = self.entry_point.clone();
                let callee = match self.lookup(&name, span) {
                    Ok(value) => value,
                    Err(Interrupt::Fail(_)) => {
                        return Err(RuntimeError::EntryPointNotFound { name, span }.into())
                    }
                    Err(other) => return Err(other),
                };
                self.heap.retain(&callee)?;
                self.stack.push_named(CALLEE, Slot::Value(callee));
                self.stack
                    .push_named(ARGUMENTS, Slot::Arguments(ArgumentBundle::default()));
                self.goto(id, Signal::Internal(INVOKE));
                Ok(())
            }
            Signal::Internal(INVOKE) => self.invoke(id, span),
            Signal::Internal(BUILTIN_STEP) => self.builtin_step(id, span),
            Signal::Internal(RETURNED) => {
                let result = self.stack.pop_value()?;
                let callee = self.stack.remove_value(CALLEE)?;
                self.heap.release(&callee)?;
                self.set_result_value(result)?;
                self.finish(id)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    fn next_argument(&mut self, id: NodeId, args: &[NodeId], next: usize) {
        match args.get(next) {
            Some(arg) => self.goto(*arg, Signal::Start),
            None => self.goto(id, Signal::Internal(INVOKE)),
        }
    }

    /// Merge one evaluated argument (owned) into the pending bundle
    fn add_argument(&mut self, kind: &ArgKind, value: Value, span: Span) -> StepResult {
        match kind {
            ArgKind::Positional => {
                self.stack.arguments_mut(ARGUMENTS)?.positional.push(value);
                Ok(())
            }
            ArgKind::Named(name) => self.add_named(name.clone(), value, span),
            ArgKind::Spread => {
                let (positional, mut named) = match &value {
                    Value::Ref(address) => match self.heap.read(*address)? {
                        HeapValue::List(items) => (items.clone(), Vec::new()),
                        HeapValue::Object(fields) => (
                            Vec::new(),
                            fields
                                .iter()
                                .map(|(k, v)| (k.clone(), v.clone()))
                                .collect::<Vec<_>>(),
                        ),
                        other => {
                            return Err(RuntimeError::TypeMismatch {
                                expected: "list or object to spread".to_string(),
                                found: other.type_name().to_string(),
                                span,
                            }
                            .into())
                        }
                    },
                    other => {
                        return Err(RuntimeError::TypeMismatch {
                            expected: "list or object to spread".to_string(),
                            found: other.type_name().to_string(),
                            span,
                        }
                        .into())
                    }
                };
                named.sort_by(|a, b| a.0.cmp(&b.0));

                for item in positional.iter().chain(named.iter().map(|(_, v)| v)) {
                    self.heap.retain(item)?;
                }
                self.stack
                    .arguments_mut(ARGUMENTS)?
                    .positional
                    .extend(positional);
                for (name, item) in named {
                    self.add_named(name, item, span)?;
                }
                self.heap.release(&value)?;
                Ok(())
            }
        }
    }

    fn add_named(&mut self, name: String, value: Value, span: Span) -> StepResult {
        let bundle = self.stack.arguments_mut(ARGUMENTS)?;
        if bundle.named.iter().any(|(n, _)| *n == name) {
            self.heap.release(&value)?;
            return Err(RuntimeError::BadArgument {
                message: format!("argument '{}' given twice", name),
                span,
            }
            .into());
        }
        bundle.named.push((name, value));
        Ok(())
    }

    fn callee_function(&self) -> Result<(Address, FunctionValue), EngineFault> {
        let callee = self.stack.get_value(CALLEE)?;
        let address = callee.as_address().ok_or(EngineFault::InvalidStackSlot {
            name: CALLEE,
            expected: "a function reference",
        })?;
        match self.heap.read(address)? {
            HeapValue::Function(function) => Ok((address, function.clone())),
            other => Err(EngineFault::UnexpectedHeapValue {
                address,
                expected: "function",
                found: other.type_name(),
            }),
        }
    }

    fn invoke(&mut self, id: NodeId, span: Span) -> StepResult {
        let callee = self.stack.get_value(CALLEE)?.clone();
        let function = match &callee {
            Value::Ref(address) => match self.heap.read(*address)? {
                HeapValue::Function(function) => Some(function.clone()),
                _ => None,
            },
            _ => None,
        };

        match function {
            Some(FunctionValue::User { node, name, .. }) => {
                trace!(caller = %id, callee = %node, name = ?name, "invoking function");
                self.stack.push_named(
                    RETURN_POINT,
                    Slot::Resume(ResumptionPoint::new(id, Signal::Internal(RETURNED))),
                );
                self.goto(node, Signal::Internal(INVOKE));
                Ok(())
            }
            Some(FunctionValue::Builtin(builtin)) => {
                let root = self.root_context.ok_or(EngineFault::NotPrepared)?;
                let ctx = self.create_context(ContextKind::Builtin, root)?;
                self.stack.push_named(CONTEXT, Slot::Value(Value::Ref(ctx)));
                trace!(caller = %id, builtin = builtin.name(), "invoking builtin");
                self.goto(id, Signal::Internal(BUILTIN_STEP));
                Ok(())
            }
            None => {
                let found = match &callee {
                    Value::Ref(address) => self.heap.read(*address)?.type_name(),
                    other => other.type_name(),
                };
                Err(RuntimeError::NotCallable {
                    found: found.to_string(),
                    span,
                }
                .into())
            }
        }
    }

    fn builtin_step(&mut self, id: NodeId, span: Span) -> StepResult {
        let builtin = match self.callee_function()? {
            (_, FunctionValue::Builtin(builtin)) => builtin,
            (address, _) => {
                return Err(EngineFault::UnexpectedHeapValue {
                    address,
                    expected: "builtin function",
                    found: "function",
                }
                .into())
            }
        };

        match self.run_builtin(builtin, span)? {
            BuiltinOutcome::Pending => {
                self.goto(id, Signal::Internal(BUILTIN_STEP));
                Ok(())
            }
            BuiltinOutcome::Done(value) => {
                self.leave_context()?;
                let bundle = self.stack.remove_arguments(ARGUMENTS)?;
                for arg in bundle.values() {
                    self.heap.release(arg)?;
                }
                self.stack.push(value);
                self.goto(id, Signal::Internal(RETURNED));
                Ok(())
            }
        }
    }

    /// Function and pattern literals: `Start` creates the closure,
    /// `Internal(INVOKE)` runs a call prepared by a call node
    pub(crate) fn step_function(
        &mut self,
        id: NodeId,
        function: &FunctionNode,
        span: Span,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                let captured = self.current_context()?;
                self.heap.increase_reference_count(captured)?;
                let closure = self.heap.allocate(HeapValue::Function(FunctionValue::User {
                    node: id,
                    captured,
                    name: function.name.clone(),
                }));
                self.stack.push(Value::Ref(closure));
                self.finish(id)
            }
            Signal::Internal(INVOKE) => {
                self.enter_function(function, span)?;
                self.goto(id, Signal::Internal(NEXT_DEFAULT));
                Ok(())
            }
            Signal::Internal(NEXT_DEFAULT) => self.next_default(function, span),
            Signal::Child(0) => self.return_from(Value::Nil, false, function.is_pattern),
            Signal::Child(i) => {
                let param = i as usize - 1;
                let value = self.stack.pop_value()?;
                let name = function.params.get(param).ok_or_else(|| EngineFault::MalformedTree {
                    detail: format!("function {} has no parameter {}", id, param),
                })?;
                self.declare(name, value, false)?;
                self.stack.replace(PARAMETER, Slot::Position(param + 1))?;
                self.goto(id, Signal::Internal(NEXT_DEFAULT));
                Ok(())
            }
            Signal::Control(ControlKind::Return) => {
                let value = match self.stack.remove(CONTROL)? {
                    Slot::Control(token) => token.value,
                    _ => {
                        return Err(EngineFault::InvalidStackSlot {
                            name: CONTROL,
                            expected: "a control token",
                        }
                        .into())
                    }
                };
                self.return_from(value, true, function.is_pattern)
            }
            Signal::Control(_) => Err(self.unhandled_control()?.into()),
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Create the callee context and bind the supplied arguments
    fn enter_function(&mut self, function: &FunctionNode, span: Span) -> StepResult {
        let bundle = self.stack.remove_arguments(ARGUMENTS)?;
        let captured = match self.callee_function()? {
            (_, FunctionValue::User { captured, .. }) => captured,
            (address, _) => {
                return Err(EngineFault::UnexpectedHeapValue {
                    address,
                    expected: "user function",
                    found: "builtin",
                }
                .into())
            }
        };
        let return_point = self.stack.get_resume(RETURN_POINT)?;
        let caller = self.current_context()?;

        let kind = if function.is_pattern {
            ContextKind::Pattern
        } else {
            ContextKind::Function
        };
        let ctx = self.create_context(kind, captured)?;
        self.heap.increase_reference_count(caller)?;
        {
            let context = context::context_mut(&mut self.heap, ctx)?;
            context.caller = Some(caller);
            context.return_point = Some(return_point);
        }
        self.stack.push_named(CONTEXT, Slot::Value(Value::Ref(ctx)));

        if bundle.positional.len() > function.params.len() {
            let message = format!(
                "{} takes {} argument(s) but {} were given",
                function.name.as_deref().unwrap_or("function"),
                function.params.len(),
                bundle.positional.len()
            );
            for value in bundle.values() {
                self.heap.release(value)?;
            }
            return Err(RuntimeError::BadArgument { message, span }.into());
        }

        let mut pending = bundle.named.into_iter();
        for (param, value) in function.params.iter().zip(bundle.positional) {
            self.declare_in(ctx, param, value, false)?;
        }
        while let Some((name, value)) = pending.next() {
            let problem = if !function.params.contains(&name) {
                Some(format!("unknown parameter '{}'", name))
            } else if context::read_context(&self.heap, ctx)?.bindings.contains_key(&name) {
                Some(format!("argument '{}' given twice", name))
            } else {
                None
            };
            if let Some(message) = problem {
                self.heap.release(&value)?;
                for (_, rest) in pending.by_ref() {
                    self.heap.release(&rest)?;
                }
                return Err(RuntimeError::BadArgument { message, span }.into());
            }
            self.declare_in(ctx, &name, value, false)?;
        }

        self.stack.push_named(PARAMETER, Slot::Position(0));
        Ok(())
    }

    /// Evaluate the default of the first unbound parameter, or start the body
    fn next_default(&mut self, function: &FunctionNode, span: Span) -> StepResult {
        let from = self.stack.get_position(PARAMETER)?;
        let ctx = self.current_context()?;
        let bindings = &context::read_context(&self.heap, ctx)?.bindings;
        let missing = function
            .params
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, param)| !bindings.contains_key(*param))
            .map(|(j, param)| (j, param.clone()));

        match missing {
            Some((j, param)) => match function.defaults.get(j).copied().flatten() {
                Some(default) => {
                    self.stack.replace(PARAMETER, Slot::Position(j))?;
                    self.goto(default, Signal::Start);
                    Ok(())
                }
                None => Err(RuntimeError::BadArgument {
                    message: format!("missing argument for parameter '{}'", param),
                    span,
                }
                .into()),
            },
            None => {
                self.stack.remove(PARAMETER)?;
                self.goto(function.body, Signal::Start);
                Ok(())
            }
        }
    }

    /// Leave the callee context and resume the caller with the result.
    /// A pattern without an explicit `return` produces its own context.
    fn return_from(&mut self, value: Value, explicit: bool, is_pattern: bool) -> StepResult {
        let ctx = self
            .stack
            .remove_value(CONTEXT)?
            .as_address()
            .ok_or(EngineFault::InvalidStackSlot {
                name: CONTEXT,
                expected: "a context reference",
            })?;

        let caller = {
            let context = context::context_mut(&mut self.heap, ctx)?;
            context.return_point = None;
            context.caller.take()
        };
        if let Some(caller) = caller {
            self.heap.release(&Value::Ref(caller))?;
        }

        let result = if explicit {
            value
        } else if is_pattern {
            self.heap.increase_reference_count(ctx)?;
            Value::Ref(ctx)
        } else {
            value
        };

        self.heap.release(&Value::Ref(ctx))?;
        let return_point = self.stack.remove_resume(RETURN_POINT)?;
        self.stack.push(result);
        self.goto_point(return_point);
        Ok(())
    }

    /// Arguments of the running builtin. The bundle keeps ownership.
    pub(crate) fn builtin_arguments(&self) -> Result<ArgumentBundle, EngineFault> {
        match self.stack.get(ARGUMENTS)? {
            Slot::Arguments(bundle) => Ok(bundle.clone()),
            _ => Err(EngineFault::InvalidStackSlot {
                name: ARGUMENTS,
                expected: "arguments",
            }),
        }
    }
}
