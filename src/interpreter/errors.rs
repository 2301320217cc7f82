//! Error types for the analyzer
//!
//! Two classes are kept apart:
//! - [`EngineFault`]: engine invariant violations (heap corruption, refcount
//!   underflow, broken generation chain, unmatched control signal). Always
//!   fatal, never seen by backtracking.
//! - [`RuntimeError`]: program-level failures carrying a source span. These
//!   travel through [`Interrupt::Fail`] and are retried by backtracking while
//!   alternatives remain.
//!
//! [`AnalysisError`] is what the driver sees when a run aborts.

use crate::compiler::node::Signal;
use crate::memory::heap::GenerationId;
use crate::memory::value::Address;
use crate::parser::ast::{ControlKind, Span};

/// Engine invariant violations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineFault {
    /// Address was never allocated in the visible generation chain
    #[error("heap segmentation fault at {address}")]
    HeapSegmentationFault { address: Address },

    #[error("access to freed heap cell {address}")]
    FreedMemoryAccess { address: Address },

    #[error("reference count underflow on heap cell {address}")]
    ReferenceCountUnderflow { address: Address },

    #[error("broken generation chain at generation {generation}: {detail}")]
    HeapBigNodeLinkFault {
        generation: GenerationId,
        detail: String,
    },

    #[error("cannot roll back past the first generation (requested {generation})")]
    FirstBigNodeRollback { generation: GenerationId },

    #[error("generation {generation} is no longer recoverable")]
    NonRecoverableNodeRollback { generation: GenerationId },

    #[error("execution stack has no entry named '{name}'")]
    StackSlotNotFound { name: &'static str },

    #[error("execution stack entry '{name}' does not hold {expected}")]
    InvalidStackSlot {
        name: &'static str,
        expected: &'static str,
    },

    #[error("heap cell {address} holds a {found}, expected {expected}")]
    UnexpectedHeapValue {
        address: Address,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{node} node cannot handle signal {signal}")]
    InvalidSignal { node: &'static str, signal: Signal },

    #[error("context {address} is no longer alive")]
    DeadContext { address: Address },

    #[error("analyzer has not been prepared with an input")]
    NotPrepared,

    #[error("compiled tree is malformed: {detail}")]
    MalformedTree { detail: String },

    #[error("unhandled control statement '{kind}' (tag: {tag:?})")]
    UnhandledControlStatementSignal {
        kind: ControlKind,
        tag: Option<String>,
        span: Span,
    },
}

impl EngineFault {
    pub fn location(&self) -> Option<&Span> {
        match self {
            EngineFault::UnhandledControlStatementSignal { span, .. } => Some(span),
            _ => None,
        }
    }
}

/// Program-level failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("bad argument: {message}")]
    BadArgument { message: String, span: Span },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String, span: Span },

    #[error("cannot assign to constant '{name}'")]
    ConstantAssignment { name: String, span: Span },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize, span: Span },

    #[error("division by zero")]
    DivisionByZero { span: Span },

    #[error("integer overflow in '{operation}'")]
    IntegerOverflow { operation: String, span: Span },

    #[error("value of type {found} is not callable")]
    NotCallable { found: String, span: Span },

    #[error("{message}")]
    UserError { message: String, span: Span },

    #[error("entry point '{name}' is not defined")]
    EntryPointNotFound { name: String, span: Span },

    #[error("too many pending alternatives (limit {limit})")]
    AlternativeLimitExceeded { limit: usize, span: Span },

    #[error("value nests deeper than {limit} levels")]
    NestingTooDeep { limit: usize, span: Span },
}

impl RuntimeError {
    pub fn location(&self) -> Option<&Span> {
        match self {
            RuntimeError::BadArgument { span, .. }
            | RuntimeError::TypeMismatch { span, .. }
            | RuntimeError::UndefinedVariable { span, .. }
            | RuntimeError::ConstantAssignment { span, .. }
            | RuntimeError::IndexOutOfBounds { span, .. }
            | RuntimeError::DivisionByZero { span }
            | RuntimeError::IntegerOverflow { span, .. }
            | RuntimeError::NotCallable { span, .. }
            | RuntimeError::UserError { span, .. }
            | RuntimeError::EntryPointNotFound { span, .. }
            | RuntimeError::AlternativeLimitExceeded { span, .. }
            | RuntimeError::NestingTooDeep { span, .. } => Some(span),
        }
    }
}

/// Why the current path failed
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// A lexeme did not match, or `fail` ran
    NoMatch(Span),
    /// A program-level error; retried like a mismatch while alternatives remain
    Error(RuntimeError),
}

/// Outcome channel of a single trampoline step
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// Backtracking trigger
    Fail(Failure),
    /// Program-level error that is never retried (resource limits)
    Abort(RuntimeError),
    Fault(EngineFault),
}

impl Interrupt {
    pub fn no_match(span: Span) -> Self {
        Interrupt::Fail(Failure::NoMatch(span))
    }
}

impl From<EngineFault> for Interrupt {
    fn from(fault: EngineFault) -> Self {
        Interrupt::Fault(fault)
    }
}

impl From<RuntimeError> for Interrupt {
    fn from(err: RuntimeError) -> Self {
        Interrupt::Fail(Failure::Error(err))
    }
}

/// Why a run was aborted, as reported by [`crate::interpreter::Analyzer::start`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Runtime(RuntimeError),

    #[error("internal error: {fault}")]
    Fault {
        fault: EngineFault,
        /// Span of the node being stepped when the fault surfaced
        span: Option<Span>,
    },
}

impl AnalysisError {
    pub fn location(&self) -> Option<&Span> {
        match self {
            AnalysisError::Runtime(err) => err.location(),
            AnalysisError::Fault { fault, span } => fault.location().or(span.as_ref()),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AnalysisError::Fault { .. })
    }
}
