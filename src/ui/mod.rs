//! Stepping debugger built on [ratatui](https://github.com/ratatui-org/ratatui).
//!
//! The debugger drives a prepared [`Analyzer`] one trampoline step at a
//! time. Between steps the analyzer is a valid suspension point, so every
//! pane renders live engine state rather than a recording.
//!
//! - **[`app`]**: application state, keyboard event loop, pane focus
//! - **[`panes`]**: render functions for each pane (source, stack, heap,
//!   output, status bar)
//! - **[`theme`]**: color palette used by all panes
//!
//! [`Analyzer`]: crate::interpreter::Analyzer

pub mod app;
pub mod panes;
pub mod theme;

pub use app::App;
