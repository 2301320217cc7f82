//! Pattern lexemes: terminals, sequences, alternation, quantifiers,
//! captures and the committed regions (lookahead, atomic groups).
//!
//! Terminals move the input cursor or fail with `NoMatch`. Every choice
//! point freezes the untried way forward before committing to the first
//! one, so failure anywhere later resumes there with the heap, stack and
//! cursor exactly as they were.

use crate::compiler::node::{NodeId, Signal};
use crate::interpreter::engine::{Analyzer, StepResult};
use crate::interpreter::errors::{EngineFault, Failure, Interrupt};
use crate::memory::stack::{Slot, BARRIER, CAPTURE_START, REPETITIONS};
use crate::memory::value::Value;
use crate::parser::ast::Span;
use tracing::trace;

/// Quantifier: try one more repetition (or stop, if allowed)
const ATTEMPT: u32 = 0;
/// Lazy quantifier: a deferred extra repetition was requested
const CONTINUE: u32 = 1;
/// Quantifier: stop repeating
const DONE: u32 = 2;

/// Region: the protected inner lexeme failed
const REGION_FAILED: u32 = 0;

impl Analyzer {
    pub(crate) fn step_text(&mut self, id: NodeId, text: &[char], span: Span) -> StepResult {
        let position = self.position()?;
        let end = position + text.len();
        if self.input.get(position..end) == Some(text) {
            self.set_position(end)?;
            self.finish(id)
        } else {
            Err(Interrupt::no_match(span))
        }
    }

    /// Match one character accepted by `accepts`
    pub(crate) fn step_char(
        &mut self,
        id: NodeId,
        span: Span,
        accepts: impl Fn(char) -> bool,
    ) -> StepResult {
        let position = self.position()?;
        match self.input.get(position) {
            Some(c) if accepts(*c) => {
                self.set_position(position + 1)?;
                self.finish(id)
            }
            _ => Err(Interrupt::no_match(span)),
        }
    }

    pub(crate) fn step_end(&mut self, id: NodeId, span: Span) -> StepResult {
        if self.position()? == self.input.len() {
            self.finish(id)
        } else {
            Err(Interrupt::no_match(span))
        }
    }

    pub(crate) fn step_sequence(&mut self, id: NodeId, items: &[NodeId], signal: Signal) -> StepResult {
        match signal {
            Signal::Start => self.step_sequence_child(id, items, 0),
            Signal::Child(i) => self.step_sequence_child(id, items, i as usize + 1),
            Signal::Control(kind) => self.relay_control(id, kind),
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Branch `i` runs with branch `i + 1` frozen behind it
    pub(crate) fn step_alternation(
        &mut self,
        id: NodeId,
        branches: &[NodeId],
        signal: Signal,
    ) -> StepResult {
        let branch = match signal {
            Signal::Start => 0,
            Signal::Alternative(i) => i as usize,
            Signal::Child(_) => return self.finish(id),
            Signal::Control(kind) => return self.relay_control(id, kind),
            other => return Err(self.invalid_signal(id, other)),
        };

        let Some(node) = branches.get(branch).copied() else {
            return Err(Interrupt::no_match(self.span_of(id)));
        };
        if branch + 1 < branches.len() {
            self.freeze(id, Signal::Alternative(branch as u32 + 1))?;
        }
        self.goto(node, Signal::Start);
        Ok(())
    }

    /// Repetition with a `Repetitions` counter. Greedy quantifiers freeze
    /// "stop here" (`Alternative(0)`) before each optional repetition; lazy
    /// ones stop first and freeze "one more" (`Internal(CONTINUE)`).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn step_quantifier(
        &mut self,
        id: NodeId,
        inner: NodeId,
        min: u32,
        max: Option<u32>,
        lazy: bool,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                let position = self.position()?;
                self.stack.push_named(
                    REPETITIONS,
                    Slot::Counter {
                        count: 0,
                        position,
                    },
                );
                self.goto(id, Signal::Internal(ATTEMPT));
                Ok(())
            }
            Signal::Internal(ATTEMPT) => {
                let (count, _) = self.stack.get_counter(REPETITIONS)?;
                if max == Some(count) {
                    return self.end_quantifier(id);
                }
                if count >= min {
                    if lazy {
                        self.freeze(id, Signal::Internal(CONTINUE))?;
                        return self.end_quantifier(id);
                    }
                    self.freeze(id, Signal::Alternative(0))?;
                }
                self.repeat(inner, count)
            }
            Signal::Internal(CONTINUE) => {
                let (count, _) = self.stack.get_counter(REPETITIONS)?;
                self.repeat(inner, count)
            }
            Signal::Child(0) => {
                let (count, start) = self.stack.get_counter(REPETITIONS)?;
                let position = self.position()?;
                let count = count + 1;
                self.stack.replace(REPETITIONS, Slot::Counter { count, position })?;
                // An empty repetition would repeat forever
                if position == start && count >= min {
                    trace!(node = %id, count, "empty repetition, stopping");
                    return self.end_quantifier(id);
                }
                self.goto(id, Signal::Internal(ATTEMPT));
                Ok(())
            }
            Signal::Internal(DONE) | Signal::Alternative(0) => self.end_quantifier(id),
            Signal::Control(kind) => {
                self.stack.remove(REPETITIONS)?;
                self.relay_control(id, kind)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Run the inner lexeme once more, remembering where it started
    fn repeat(&mut self, inner: NodeId, count: u32) -> StepResult {
        let position = self.position()?;
        self.stack
            .replace(REPETITIONS, Slot::Counter { count, position })?;
        self.goto(inner, Signal::Start);
        Ok(())
    }

    fn end_quantifier(&mut self, id: NodeId) -> StepResult {
        self.stack.remove(REPETITIONS)?;
        self.finish(id)
    }

    /// Bind the matched text, or the value an inner call produced, in the
    /// current context
    pub(crate) fn step_capture(
        &mut self,
        id: NodeId,
        name: &str,
        inner: NodeId,
        keeps_value: bool,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                let position = self.position()?;
                self.stack
                    .push_named(CAPTURE_START, Slot::Position(position));
                self.goto(inner, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                let value = if keeps_value {
                    Some(self.stack.pop_value()?)
                } else {
                    None
                };
                let start = match self.stack.remove(CAPTURE_START)? {
                    Slot::Position(start) => start,
                    _ => {
                        return Err(EngineFault::InvalidStackSlot {
                            name: CAPTURE_START,
                            expected: "a position",
                        }
                        .into())
                    }
                };
                let value = match value {
                    Some(value) => value,
                    None => {
                        let end = self.position()?;
                        let text: String = self.input.get(start..end).unwrap_or_default().iter().collect();
                        Value::Str(text)
                    }
                };
                trace!(node = %id, name, "captured");
                self.declare(name, value, false)?;
                self.finish(id)
            }
            Signal::Control(kind) => {
                self.stack.remove(CAPTURE_START)?;
                self.relay_control(id, kind)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Lookahead (`negate` set) or atomic group (`negate` is `None`).
    ///
    /// A `Barrier` records the alternative count, cursor and generation at
    /// entry, and a `REGION_FAILED` alternative is frozen under the inner
    /// lexeme. When the inner lexeme succeeds, every alternative it left is
    /// cut and its generations are collapsed: the region is committed.
    pub(crate) fn step_region(
        &mut self,
        id: NodeId,
        inner: NodeId,
        negate: Option<bool>,
        span: Span,
        signal: Signal,
    ) -> StepResult {
        match signal {
            Signal::Start => {
                let barrier = Slot::Barrier {
                    mark: self.alternatives.len(),
                    position: self.position()?,
                    generation: self.heap.current_generation(),
                };
                self.stack.push_named(BARRIER, barrier);
                self.freeze(id, Signal::Internal(REGION_FAILED))?;
                self.goto(inner, Signal::Start);
                Ok(())
            }
            Signal::Child(0) => {
                let position = self.commit_region()?;
                match negate {
                    None => self.finish(id),
                    Some(false) => {
                        self.set_position(position)?;
                        self.finish(id)
                    }
                    Some(true) => Err(Interrupt::no_match(span)),
                }
            }
            Signal::Internal(REGION_FAILED) => {
                self.stack.remove(BARRIER)?;
                match (negate, &self.last_failure) {
                    // A program error inside `not(...)` is not a non-match
                    (Some(true), Some(Failure::Error(err))) => {
                        Err(Interrupt::Fail(Failure::Error(err.clone())))
                    }
                    (Some(true), _) => self.finish(id),
                    _ => Err(Interrupt::no_match(span)),
                }
            }
            Signal::Control(kind) => {
                self.commit_region()?;
                self.relay_control(id, kind)
            }
            other => Err(self.invalid_signal(id, other)),
        }
    }

    /// Remove the barrier and cut everything frozen inside the region.
    /// Returns the cursor position at region entry.
    fn commit_region(&mut self) -> Result<usize, EngineFault> {
        match self.stack.remove(BARRIER)? {
            Slot::Barrier {
                mark,
                position,
                generation,
            } => {
                self.cut_alternatives(mark, generation)?;
                Ok(position)
            }
            _ => Err(EngineFault::InvalidStackSlot {
                name: BARRIER,
                expected: "a barrier",
            }),
        }
    }
}
