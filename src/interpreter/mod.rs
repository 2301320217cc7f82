//! Analyzer: the trampoline that steps through a compiled program
//!
//! This module provides the execution engine:
//! - [`engine`]: [`Analyzer`], the driver API and the flat step loop
//! - [`errors`]: engine faults, program-level errors and the step interrupt channel
//! - [`builtins`]: the standard library bound in the root context
//! - [`result`]: serializable match results
//! - [`diagnostics`]: source-highlighted error reports
//!
//! # Execution Model
//!
//! Every compiled node is a small state machine driven by [`Signal`]s. A
//! node handler reads and writes the execution stack, then either asks for
//! another `(node, signal)` with `goto` or reports completion to its parent
//! with `finish`. The analyzer loop never recurses, so pattern nesting is
//! bounded by memory rather than by the host stack.
//!
//! Handlers are split across files by construct, each adding an
//! `impl Analyzer` block:
//! - `statements`: module, blocks, declarations, assignment, `if`, `fail`
//! - `loops`: `while` and `for`
//! - `jumps`: control statements and their propagation
//! - `expressions`: literals, operators, indexing
//! - `calls`: calls, function entry and return, the entry point
//! - `lexemes`: descriptive pattern elements
//! - `backtrack`: freezing, restoring and cutting alternatives
//! - `contexts`: scope creation and name resolution
//!
//! [`Signal`]: crate::compiler::node::Signal

mod backtrack;
pub mod builtins;
mod calls;
pub mod constants;
mod contexts;
pub mod diagnostics;
pub mod engine;
pub mod errors;
pub mod expressions;
mod jumps;
mod lexemes;
mod loops;
pub mod result;
mod statements;

pub use engine::{Analyzer, AnalyzerConfig, Mode, RunStatus, StepOutcome};
pub use errors::{AnalysisError, EngineFault, RuntimeError};
pub use result::{MatchResult, ResultValue};
