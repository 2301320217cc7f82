//! # Introduction
//!
//! retrace runs programs written in a small grammar language in which
//! ordinary statements (variables, loops, functions) mix freely with
//! descriptive patterns (sequences, alternation, quantifiers, captures).
//! Patterns match by backtracking: every choice point freezes the untried
//! alternative, and failure later restores the whole interpreter state to
//! that point.
//!
//! ## Execution pipeline
//!
//! ```text
//! Source → Lexer → Parser → AST → Compiler → Node arena → Analyzer
//! ```
//!
//! 1. [`parser`]: tokenises the source and builds an AST.
//! 2. [`compiler`]: folds constants and lowers the AST into a flat arena of
//!    nodes with parent links and the signal each child reports with.
//! 3. [`interpreter`]: the analyzer, a trampoline that steps one node at a
//!    time and can be paused between any two steps.
//! 4. [`memory`]: the value model, the versioned reference-counted heap, the
//!    execution stack, scopes and iterators.
//! 5. [`snapshot`]: frozen alternatives and captured output.
//! 6. [`ui`]: ratatui stepping debugger; not part of the stable library API.
//!
//! ## Backtracking without copying the heap
//!
//! Heap cells are versioned by generation. Freezing an alternative records
//! the current generation and opens a new one; writes after that copy the
//! cell into the new generation. Restoring drops every newer generation, so
//! values and reference counts come back exactly as they were.

pub mod compiler;
pub mod interpreter;
pub mod memory;
pub mod parser;
pub mod snapshot;
pub mod ui;
