//! Execution stack pane rendering
//!
//! Entries are listed newest first with their reserved name (anonymous
//! values show as `·`) and a one-line description of the slot. References
//! are followed one level into the heap so contexts and closures read by
//! kind.

use super::heap::describe_value;
use super::{pane_block, visible_items};
use crate::memory::stack::{ExecutionStack, Slot, ANONYMOUS};
use crate::memory::Heap;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, Paragraph},
    Frame,
};

pub fn render_stack_pane(
    frame: &mut Frame,
    area: Rect,
    stack: &ExecutionStack,
    heap: &Heap,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let title = format!(" Execution Stack ({}) ", stack.len());
    let block = pane_block(&title, is_focused);

    if stack.is_empty() {
        let paragraph = Paragraph::new("(empty)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let items: Vec<ListItem> = stack
        .entries()
        .iter()
        .rev()
        .map(|entry| {
            let name = if entry.name == ANONYMOUS {
                "·"
            } else {
                entry.name
            };
            let (text, color) = describe_slot(&entry.slot, heap);
            ListItem::new(Line::from(vec![
                Span::styled("▸ ", Style::default().fg(DEFAULT_THEME.secondary)),
                Span::styled(
                    format!("{:<13}", name),
                    Style::default()
                        .fg(DEFAULT_THEME.function)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled("│ ", Style::default().fg(DEFAULT_THEME.comment)),
                Span::styled(text, Style::default().fg(color)),
            ]))
        })
        .collect();

    let list = List::new(visible_items(items, area, scroll_offset)).block(block);
    frame.render_widget(list, area);
}

fn describe_slot(slot: &Slot, heap: &Heap) -> (String, ratatui::style::Color) {
    match slot {
        Slot::Value(value) => (describe_value(heap, value), DEFAULT_THEME.fg),
        Slot::Resume(point) => (format!("→ {}", point), DEFAULT_THEME.primary),
        Slot::Control(token) => (
            format!(
                "{}{} ({})",
                token.kind,
                token
                    .tag
                    .as_ref()
                    .map(|t| format!(" '{}", t))
                    .unwrap_or_default(),
                describe_value(heap, &token.value)
            ),
            DEFAULT_THEME.control,
        ),
        Slot::Arguments(bundle) => {
            let mut parts: Vec<String> = bundle
                .positional
                .iter()
                .map(|v| describe_value(heap, v))
                .collect();
            parts.extend(
                bundle
                    .named
                    .iter()
                    .map(|(name, v)| format!("{} = {}", name, describe_value(heap, v))),
            );
            (format!("({})", parts.join(", ")), DEFAULT_THEME.fg)
        }
        Slot::Counter { count, position } => (
            format!("×{} at {}", count, position),
            DEFAULT_THEME.number,
        ),
        Slot::Position(position) => (format!("at {}", position), DEFAULT_THEME.number),
        Slot::Barrier {
            mark,
            position,
            generation,
        } => (
            format!("mark {} at {} since {}", mark, position, generation),
            DEFAULT_THEME.control,
        ),
    }
}
