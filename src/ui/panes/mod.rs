//! TUI pane rendering modules
//!
//! # Pane Modules
//!
//! - [`source`]: Source code with the span of the node being stepped
//! - [`stack`]: Execution stack entries, newest first
//! - [`heap`]: Generation chain and visible heap cells
//! - [`output`]: Captured `print` output
//! - [`status`]: Status bar with keybindings and engine state
//!
//! Each pane module exports a primary `render_*` function plus the scroll
//! state it keeps between frames.

pub mod heap;
pub mod output;
pub mod source;
pub mod stack;
pub mod status;

pub use heap::render_heap_pane;
pub use output::render_output_pane;
pub use source::{render_source_pane, SourceScrollState};
pub use stack::render_stack_pane;
pub use status::{render_status_bar, StatusRenderData};

use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    widgets::{Block, Borders, ListItem},
};

/// Bordered pane frame, highlighted when focused
pub(crate) fn pane_block(title: &str, is_focused: bool) -> Block<'_> {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style)
}

/// Keep only the rows that fit in `area`, clamping the scroll offset
pub(crate) fn visible_items<'a>(
    items: Vec<ListItem<'a>>,
    area: Rect,
    scroll_offset: &mut usize,
) -> Vec<ListItem<'a>> {
    let total_items = items.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize; // Account for borders, min 1

    if total_items > visible_height {
        let max_scroll = total_items - visible_height;
        *scroll_offset = (*scroll_offset).min(max_scroll);
    } else {
        *scroll_offset = 0;
    }

    items
        .into_iter()
        .skip(*scroll_offset)
        .take(visible_height)
        .collect()
}
