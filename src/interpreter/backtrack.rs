//! Backtracking: freezing alternatives, restoring them, cutting regions.
//!
//! A frozen alternative pairs the current heap generation with a copy of
//! the execution stack and the point to resume at. Freezing then opens a
//! new generation, so everything done afterwards can be discarded as a
//! whole. Restoring truncates the generation chain back to the frozen one
//! and opens a fresh generation on top of it before resuming.

use crate::compiler::node::{NodeId, ResumptionPoint, Signal};
use crate::interpreter::engine::{Analyzer, Mode, StepOutcome, StepResult};
use crate::interpreter::errors::{AnalysisError, EngineFault, Failure, Interrupt, RuntimeError};
use crate::memory::heap::GenerationId;
use crate::snapshot::FrozenAlternative;
use tracing::debug;

impl Analyzer {
    /// Record an untried way forward at `(node, signal)`
    pub(crate) fn freeze(&mut self, node: NodeId, signal: Signal) -> StepResult {
        let alternative = FrozenAlternative {
            generation: self.heap.current_generation(),
            stack: self.stack.snapshot(),
            resume: ResumptionPoint::new(node, signal),
            output_len: self.output.len(),
        };
        let generation = alternative.generation;

        if self.alternatives.push(alternative).is_err() {
            return Err(Interrupt::Abort(RuntimeError::AlternativeLimitExceeded {
                limit: self.alternatives.limit(),
                span: self.span_of(node),
            }));
        }

        let opened = self.heap.new_generation();
        debug!(
            %node,
            %signal,
            frozen = %generation,
            %opened,
            pending = self.alternatives.len(),
            "froze alternative"
        );
        Ok(())
    }

    /// The current path failed. Switch to backward mode if an alternative
    /// is pending, otherwise end the run.
    pub(crate) fn init_backtracking(
        &mut self,
        failure: Failure,
    ) -> Result<Option<StepOutcome>, AnalysisError> {
        match &failure {
            Failure::NoMatch(span) => debug!(at = %span, "path failed"),
            Failure::Error(err) => debug!(error = %err, "program error, trying alternatives"),
        }
        self.last_failure = Some(failure);

        if self.alternatives.is_empty() {
            return self.exhausted().map(Some);
        }
        self.mode = Mode::Backward;
        Ok(None)
    }

    /// Restore the most recent alternative. Returns `false` if none is left.
    pub(crate) fn backtrack(&mut self) -> Result<bool, EngineFault> {
        let Some(alternative) = self.alternatives.pop() else {
            return Ok(false);
        };

        let discarded = self.heap.discard_newer_than(alternative.generation)?;
        self.heap.new_generation();
        // Live entries belong to the discarded generations; dropping them
        // releases nothing
        self.stack.restore(alternative.stack);
        self.output.truncate(alternative.output_len);
        self.next = Some(alternative.resume);
        self.mode = Mode::Forward;
        self.backtracks += 1;

        debug!(
            to = %alternative.generation,
            discarded,
            resume = %alternative.resume,
            pending = self.alternatives.len(),
            "backtracked"
        );
        Ok(true)
    }

    /// Commit a region: drop every alternative above `mark` and merge the
    /// generations opened since `generation`
    pub(crate) fn cut_alternatives(
        &mut self,
        mark: usize,
        generation: GenerationId,
    ) -> Result<(), EngineFault> {
        let dropped = self.alternatives.cut(mark);
        self.heap.collapse_to(generation)?;
        debug!(mark, dropped, to = %generation, "cut alternatives");
        Ok(())
    }
}
