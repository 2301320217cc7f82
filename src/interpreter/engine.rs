// Execution engine for the retrace analyzer

use crate::compiler::node::{CompiledProgram, Node, NodeId, NodeKind, ResumptionPoint, Signal};
use crate::interpreter::builtins::Builtin;
use crate::interpreter::constants::*;
use crate::interpreter::errors::{AnalysisError, EngineFault, Failure, Interrupt};
use crate::interpreter::result::{MatchResult, ResultValue};
use crate::memory::context::{self, Context, ContextKind};
use crate::memory::stack::ExecutionStack;
use crate::memory::value::{Address, FunctionValue, HeapValue, Value};
use crate::memory::Heap;
use crate::parser::ast::Span;
use crate::snapshot::{AlternativeStack, Output};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Outcome of one trampoline step as seen by a node handler
pub(crate) type StepResult = Result<(), Interrupt>;

/// Engine limits, fixed for the lifetime of an analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Ceiling on pending alternatives; exceeding it aborts the run
    pub max_alternatives: usize,
    /// Abort (as a timeout) after this many steps
    pub step_limit: Option<u64>,
    /// Fewest allocations between two runs of the cycle collector; the
    /// gap grows to twice the cells surviving the last run
    pub gc_threshold: usize,
    /// Emit a trace event for every step
    pub trace_steps: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
            step_limit: None,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            trace_steps: false,
        }
    }
}

/// Direction of the trampoline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Forward,
    /// The next step restores the most recent alternative
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Not prepared yet
    Ready,
    Running,
    Matched,
    NoMatch,
    Errored,
    Faulted,
    TimedOut,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, RunStatus::Ready | RunStatus::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Ready => "ready",
            RunStatus::Running => "running",
            RunStatus::Matched => "matched",
            RunStatus::NoMatch => "no match",
            RunStatus::Errored => "error",
            RunStatus::Faulted => "internal error",
            RunStatus::TimedOut => "timed out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// The run ended; `true` if it matched
    Finished(bool),
}

/// The analyzer: owns the heap, the execution stack and the pending
/// alternatives for one run over a compiled program
pub struct Analyzer {
    pub(crate) program: Rc<CompiledProgram>,
    pub(crate) config: AnalyzerConfig,

    pub(crate) heap: Heap,
    pub(crate) stack: ExecutionStack,
    pub(crate) alternatives: AlternativeStack,
    pub(crate) output: Output,

    /// Input being matched, as characters
    pub(crate) input: Vec<char>,
    /// Heap box holding the match position, so rollback restores it
    pub(crate) cursor: Option<Address>,
    /// Root context holding the builtins
    pub(crate) root_context: Option<Address>,
    pub(crate) entry_point: String,

    /// Where the next forward step goes
    pub(crate) next: Option<ResumptionPoint>,
    /// Point handled by the most recent step
    pub(crate) last_point: Option<ResumptionPoint>,
    pub(crate) mode: Mode,
    pub(crate) status: RunStatus,
    pub(crate) steps: u64,
    pub(crate) backtracks: u64,
    pub(crate) last_failure: Option<Failure>,

    /// Value returned by the entry point (owned)
    pub(crate) result_value: Option<Value>,
    pub(crate) result: Option<MatchResult>,
    pub(crate) contexts_created: usize,
    /// Allocations that trigger the next cycle collection
    pub(crate) next_collection: usize,
}

impl Analyzer {
    /// Create an analyzer for a compiled program
    pub fn new(program: impl Into<Rc<CompiledProgram>>, config: AnalyzerConfig) -> Self {
        let next_collection = config.gc_threshold;
        Analyzer {
            program: program.into(),
            alternatives: AlternativeStack::new(config.max_alternatives),
            config,
            heap: Heap::new(),
            stack: ExecutionStack::new(),
            output: Output::new(),
            input: Vec::new(),
            cursor: None,
            root_context: None,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            next: None,
            last_point: None,
            mode: Mode::Forward,
            status: RunStatus::Ready,
            steps: 0,
            backtracks: 0,
            last_failure: None,
            result_value: None,
            result: None,
            contexts_created: 0,
            next_collection,
        }
    }

    /// Select the top-level function or pattern the run begins with
    pub fn set_entry_point(&mut self, name: impl Into<String>) {
        self.entry_point = name.into();
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Reset all run state and position the trampoline at the module root
    pub fn prepare(&mut self, input: &str) {
        self.heap = Heap::new();
        self.stack = ExecutionStack::new();
        self.alternatives = AlternativeStack::new(self.config.max_alternatives);
        self.output = Output::new();
        self.input = input.chars().collect();
        self.mode = Mode::Forward;
        self.status = RunStatus::Running;
        self.steps = 0;
        self.backtracks = 0;
        self.last_failure = None;
        self.last_point = None;
        self.result_value = None;
        self.result = None;
        self.next_collection = self.config.gc_threshold;

        let mut root = Context::new(ContextKind::Root, None);
        for builtin in Builtin::ALL {
            let function = self
                .heap
                .allocate(HeapValue::Function(FunctionValue::Builtin(builtin)));
            root.bindings.insert(
                builtin.name().to_string(),
                context::Binding {
                    value: Value::Ref(function),
                    constant: true,
                },
            );
        }
        self.root_context = Some(self.heap.allocate(HeapValue::Context(root)));
        self.contexts_created = 1;
        self.cursor = Some(self.heap.allocate(HeapValue::Boxed(Value::Int(0))));

        self.next = Some(ResumptionPoint::new(self.program.root, Signal::Start));
        info!(
            entry = %self.entry_point,
            input_len = self.input.len(),
            nodes = self.program.len(),
            "prepared analysis"
        );
    }

    /// Run to completion. `Ok(false)` means no match or timeout; program
    /// errors that escaped backtracking and engine faults are `Err`.
    pub fn start(&mut self, input: &str, timeout: Option<Duration>) -> Result<bool, AnalysisError> {
        self.prepare(input);
        self.run(timeout)
    }

    /// Step a prepared analyzer until the run ends, the step limit is hit
    /// or `timeout` elapses. Resumes from wherever stepping left off.
    pub fn run(&mut self, timeout: Option<Duration>) -> Result<bool, AnalysisError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(limit) = self.config.step_limit {
                if self.steps >= limit {
                    warn!(steps = self.steps, "step limit reached");
                    self.status = RunStatus::TimedOut;
                    return Ok(false);
                }
            }
            if self.steps % DEADLINE_CHECK_INTERVAL == 0 {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        warn!(steps = self.steps, "analysis timed out");
                        self.status = RunStatus::TimedOut;
                        return Ok(false);
                    }
                }
            }

            match self.step_once()? {
                StepOutcome::Continue => {}
                StepOutcome::Finished(matched) => return Ok(matched),
            }
        }
    }

    /// Perform exactly one trampoline step. The analyzer is a valid
    /// suspension point between any two calls.
    pub fn step_once(&mut self) -> Result<StepOutcome, AnalysisError> {
        match self.status {
            RunStatus::Ready => {
                return Err(AnalysisError::Fault {
                    fault: EngineFault::NotPrepared,
                    span: None,
                })
            }
            RunStatus::Running => {}
            status => return Ok(StepOutcome::Finished(status == RunStatus::Matched)),
        }

        self.steps += 1;

        if self.mode == Mode::Backward {
            return match self.backtrack() {
                Ok(true) => Ok(StepOutcome::Continue),
                Ok(false) => self.exhausted(),
                Err(fault) => Err(self.fault(fault, None)),
            };
        }

        let point = match self.next.take() {
            Some(point) => point,
            None => {
                return Err(self.fault(
                    EngineFault::MalformedTree {
                        detail: "no resumption point to continue from".to_string(),
                    },
                    None,
                ))
            }
        };
        self.last_point = Some(point);

        if self.config.trace_steps {
            trace!(step = self.steps, point = %point, "step");
        }

        match self.dispatch(point) {
            Ok(()) => {}
            Err(Interrupt::Fail(failure)) => {
                if let Some(outcome) = self.init_backtracking(failure)? {
                    return Ok(outcome);
                }
            }
            Err(Interrupt::Abort(err)) => {
                self.status = RunStatus::Errored;
                info!(error = %err, "analysis aborted");
                return Err(AnalysisError::Runtime(err));
            }
            Err(Interrupt::Fault(fault)) => {
                let span = self.program.node(point.node).map(|n| n.span);
                return Err(self.fault(fault, span));
            }
        }

        if self.status == RunStatus::Matched {
            return Ok(StepOutcome::Finished(true));
        }

        if self.heap.allocations_since_collect() >= self.next_collection {
            self.collect_garbage()?;
        }

        Ok(StepOutcome::Continue)
    }

    /// No alternative left after a failure
    pub(crate) fn exhausted(&mut self) -> Result<StepOutcome, AnalysisError> {
        match self.last_failure.take() {
            Some(Failure::Error(err)) => {
                self.status = RunStatus::Errored;
                info!(error = %err, "analysis failed");
                Err(AnalysisError::Runtime(err))
            }
            _ => {
                self.status = RunStatus::NoMatch;
                info!(steps = self.steps, backtracks = self.backtracks, "no match");
                Ok(StepOutcome::Finished(false))
            }
        }
    }

    pub(crate) fn fault(&mut self, fault: EngineFault, span: Option<Span>) -> AnalysisError {
        self.status = RunStatus::Faulted;
        tracing::error!(%fault, "engine fault");
        AnalysisError::Fault { fault, span }
    }

    /// Run the cycle collector and push the next run out to twice the
    /// surviving cells, so a large live heap is not rescanned every
    /// `gc_threshold` allocations
    fn collect_garbage(&mut self) -> Result<(), AnalysisError> {
        let roots = self.gc_roots();
        if let Err(fault) = self.heap.collect_cycles(&roots) {
            return Err(self.fault(fault, None));
        }
        let live = self.heap.live_count(|_| true);
        self.next_collection = self.config.gc_threshold.max(live.saturating_mul(2));
        debug!(live, next = self.next_collection, "scheduled next cycle collection");
        Ok(())
    }

    fn gc_roots(&self) -> Vec<Address> {
        let mut roots: Vec<Address> = self
            .stack
            .entries()
            .iter()
            .flat_map(|entry| entry.slot.values())
            .filter_map(Value::as_address)
            .collect();
        roots.extend(self.root_context);
        roots.extend(self.cursor);
        roots.extend(self.result_value.as_ref().and_then(Value::as_address));
        roots
    }

    // ===== Trampoline plumbing =====

    /// Continue at `node` with `signal` on the next step
    pub(crate) fn goto(&mut self, node: NodeId, signal: Signal) {
        self.next = Some(ResumptionPoint::new(node, signal));
    }

    pub(crate) fn goto_point(&mut self, point: ResumptionPoint) {
        self.next = Some(point);
    }

    /// Report that `node` finished to its parent; the root finishing ends
    /// the run with a match
    pub(crate) fn finish(&mut self, node: NodeId) -> StepResult {
        let parent = {
            let node = self.node(node)?;
            node.parent.map(|p| (p, node.parent_signal))
        };
        match parent {
            Some((parent, signal)) => {
                self.goto(parent, signal);
                Ok(())
            }
            None => self.complete(self.span_of(node)),
        }
    }

    fn complete(&mut self, span: Span) -> StepResult {
        let value = match &self.result_value {
            Some(value) => ResultValue::from_value(&self.heap, value, span)?,
            None => ResultValue::Nil,
        };
        let length = self.position()?;
        self.result = Some(MatchResult {
            matched: true,
            length,
            value,
            output: self.output.as_str().to_string(),
        });
        self.status = RunStatus::Matched;
        info!(
            steps = self.steps,
            backtracks = self.backtracks,
            length,
            "analysis matched"
        );
        Ok(())
    }

    /// Record the entry point's value; the analyzer owns it from here on
    pub(crate) fn set_result_value(&mut self, value: Value) -> StepResult {
        if let Some(old) = self.result_value.replace(value) {
            self.heap.release(&old)?;
        }
        Ok(())
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, EngineFault> {
        self.program
            .node(id)
            .ok_or_else(|| EngineFault::MalformedTree {
                detail: format!("node {} does not exist", id),
            })
    }

    pub(crate) fn span_of(&self, id: NodeId) -> Span {
        self.program.node(id).map(|n| n.span).unwrap_or_default()
    }

    fn dispatch(&mut self, point: ResumptionPoint) -> StepResult {
        let program = Rc::clone(&self.program);
        let node = program.node(point.node).ok_or_else(|| EngineFault::MalformedTree {
            detail: format!("resumption point {} names a missing node", point),
        })?;
        let id = point.node;
        let signal = point.signal;

        match &node.kind {
            NodeKind::Module { body } => self.step_module(id, body, signal),
            NodeKind::Entry => self.step_entry(id, node.span, signal),

            NodeKind::Literal(literal) => self.step_literal(id, literal),
            NodeKind::List { elements } => self.step_list(id, elements, signal),
            NodeKind::Object { keys, values } => self.step_object(id, keys, values, signal),
            NodeKind::Identifier(name) => self.step_identifier(id, name, node.span),
            NodeKind::Binary { op, left, right } => {
                self.step_binary(id, *op, *left, *right, node.span, signal)
            }
            NodeKind::Unary { op, operand } => self.step_unary(id, *op, *operand, node.span, signal),
            NodeKind::Index { object, index } => {
                self.step_index(id, *object, *index, node.span, signal)
            }
            NodeKind::Field { object, name } => {
                self.step_field(id, *object, name, node.span, signal)
            }
            NodeKind::Call { callee, args, kinds } => {
                self.step_call(id, *callee, args, kinds, node.span, signal)
            }
            NodeKind::Function(function) => self.step_function(id, function, node.span, signal),

            NodeKind::Declare {
                name,
                constant,
                init,
            } => self.step_declare(id, name, *constant, *init, signal),
            NodeKind::Assign { target, op, value } => {
                self.step_assign(id, target, *op, *value, node.span, signal)
            }
            NodeKind::Block { tag, body, scoped } => {
                self.step_block(id, tag.as_deref(), body, *scoped, signal)
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.step_if(id, *condition, *then_branch, *else_branch, signal),
            NodeKind::While {
                tag,
                condition,
                body,
            } => self.step_while(id, tag.as_deref(), *condition, *body, signal),
            NodeKind::For {
                tag,
                var,
                iterable,
                body,
            } => self.step_for(id, tag.as_deref(), var, *iterable, *body, node.span, signal),
            NodeKind::Control { kind, tag, value } => {
                self.step_control(id, *kind, tag.as_deref(), *value, signal)
            }
            NodeKind::ExprStatement { expr } => self.step_expr_statement(id, *expr, signal),
            NodeKind::Fail => Err(Interrupt::no_match(node.span)),

            NodeKind::Text(text) => self.step_text(id, text, node.span),
            NodeKind::CharRange { from, to } => {
                self.step_char(id, node.span, |c| (*from..=*to).contains(&c))
            }
            NodeKind::AnyChar => self.step_char(id, node.span, |_| true),
            NodeKind::EndOfInput => self.step_end(id, node.span),
            NodeKind::Sequence(items) => self.step_sequence(id, items, signal),
            NodeKind::Alternation(branches) => self.step_alternation(id, branches, signal),
            NodeKind::Quantifier {
                inner,
                min,
                max,
                lazy,
            } => self.step_quantifier(id, *inner, *min, *max, *lazy, signal),
            NodeKind::Capture {
                name,
                inner,
                keeps_value,
            } => self.step_capture(id, name, *inner, *keeps_value, signal),
            NodeKind::Lookahead { inner, negate } => {
                self.step_region(id, *inner, Some(*negate), node.span, signal)
            }
            NodeKind::Atomic { inner } => self.step_region(id, *inner, None, node.span, signal),
        }
    }

    /// Fault for a signal a node's state machine does not define
    pub(crate) fn invalid_signal(&self, id: NodeId, signal: Signal) -> Interrupt {
        let node = self.program.node(id).map(|n| n.kind.label()).unwrap_or("unknown");
        Interrupt::Fault(EngineFault::InvalidSignal { node, signal })
    }

    // ===== Input cursor =====

    pub(crate) fn position(&self) -> Result<usize, EngineFault> {
        let cursor = self.cursor.ok_or(EngineFault::NotPrepared)?;
        match self.heap.read(cursor)? {
            HeapValue::Boxed(Value::Int(n)) => Ok(*n as usize),
            other => Err(EngineFault::UnexpectedHeapValue {
                address: cursor,
                expected: "cursor box",
                found: other.type_name(),
            }),
        }
    }

    pub(crate) fn set_position(&mut self, position: usize) -> Result<(), EngineFault> {
        let cursor = self.cursor.ok_or(EngineFault::NotPrepared)?;
        match self.heap.write_for_mutation(cursor)? {
            HeapValue::Boxed(value) => {
                *value = Value::Int(position as i64);
                Ok(())
            }
            other => Err(EngineFault::UnexpectedHeapValue {
                address: cursor,
                expected: "cursor box",
                found: other.type_name(),
            }),
        }
    }

    // ===== Accessors =====

    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Valid after a successful run
    pub fn get_result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    pub fn output(&self) -> &str {
        self.output.as_str()
    }

    pub fn output_buffer(&self) -> &Output {
        &self.output
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn backtracks(&self) -> u64 {
        self.backtracks
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn stack(&self) -> &ExecutionStack {
        &self.stack
    }

    pub fn alternatives(&self) -> &AlternativeStack {
        &self.alternatives
    }

    pub fn input(&self) -> &[char] {
        &self.input
    }

    /// Current match position, if prepared
    pub fn cursor(&self) -> Option<usize> {
        self.position().ok()
    }

    /// The point the next forward step will handle
    pub fn next_point(&self) -> Option<ResumptionPoint> {
        self.next
    }

    /// The point handled by the most recent step
    pub fn last_point(&self) -> Option<ResumptionPoint> {
        self.last_point
    }

    /// Why the current path last failed, while backtracking
    pub fn last_failure(&self) -> Option<&Failure> {
        self.last_failure.as_ref()
    }

    /// Contexts created since `prepare`, including the root
    /// Allocations since the last cycle collection that trigger the next one
    pub fn next_collection(&self) -> usize {
        self.next_collection
    }

    pub fn contexts_created(&self) -> usize {
        self.contexts_created
    }

    /// Contexts still alive in the visible heap
    pub fn live_contexts(&self) -> usize {
        self.heap
            .live_count(|value| matches!(value, HeapValue::Context(_)))
    }
}
