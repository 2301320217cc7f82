//! Heap pane rendering: the generation chain and every visible cell
//!
//! Each row shows the cell address, the generation holding its visible
//! version, its reference count and a summary of its contents. Freed cells
//! stay listed (dimmed) until a rollback or a collapse removes them.

use super::{pane_block, visible_items};
use crate::memory::heap::CellState;
use crate::memory::value::{FunctionValue, HeapValue, Value};
use crate::memory::Heap;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem},
    Frame,
};

/// Longest summary shown for a single cell
const SUMMARY_WIDTH: usize = 48;

pub fn render_heap_pane(
    frame: &mut Frame,
    area: Rect,
    heap: &Heap,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let block = pane_block(" Heap ", is_focused);

    let chain = heap
        .generation_chain()
        .iter()
        .map(|g| format!("{}[{}]", g.id, g.cells))
        .collect::<Vec<_>>()
        .join(" ← ");
    let mut items = vec![ListItem::new(Line::from(vec![
        Span::styled("gens ", Style::default().fg(DEFAULT_THEME.comment)),
        Span::styled(chain, Style::default().fg(DEFAULT_THEME.generation)),
    ]))];

    for (address, cell) in heap.cells() {
        let (summary, style) = match &cell.state {
            CellState::Live(value) => (describe_cell(heap, value), Style::default().fg(DEFAULT_THEME.fg)),
            CellState::Tombstone => (
                "freed".to_string(),
                Style::default()
                    .fg(DEFAULT_THEME.tombstone)
                    .add_modifier(Modifier::CROSSED_OUT),
            ),
        };
        items.push(ListItem::new(Line::from(vec![
            Span::styled(
                format!("{} ", address),
                Style::default().fg(DEFAULT_THEME.primary),
            ),
            Span::styled(
                format!("{} ", cell.origin),
                Style::default().fg(DEFAULT_THEME.generation),
            ),
            Span::styled(
                format!("×{:<3}", cell.refs),
                Style::default().fg(DEFAULT_THEME.number),
            ),
            Span::styled(truncate(&summary, SUMMARY_WIDTH), style),
        ])));
    }

    let list = List::new(visible_items(items, area, scroll_offset)).block(block);
    frame.render_widget(list, area);
}

/// One-line description of a value; references are named, not followed
pub fn describe_value(heap: &Heap, value: &Value) -> String {
    match value {
        Value::Str(s) => format!("{:?}", s),
        Value::Ref(address) => match heap.read(*address) {
            Ok(cell) => format!("{} {}", address, cell.type_name()),
            Err(_) => format!("{} (dangling)", address),
        },
        other => other.to_string(),
    }
}

fn describe_cell(heap: &Heap, value: &HeapValue) -> String {
    let list = |values: &mut dyn Iterator<Item = String>| values.collect::<Vec<_>>().join(", ");
    match value {
        HeapValue::Boxed(inner) => format!("box {}", describe_value(heap, inner)),
        HeapValue::List(items) => format!(
            "list [{}]",
            list(&mut items.iter().map(|v| describe_value(heap, v)))
        ),
        HeapValue::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            format!(
                "object {{{}}}",
                list(&mut keys
                    .into_iter()
                    .map(|k| format!("{}: {}", k, describe_value(heap, &fields[k]))))
            )
        }
        HeapValue::Set(members) => {
            let mut keys: Vec<_> = members.iter().collect();
            keys.sort();
            format!(
                "set {{{}}}",
                list(&mut keys.into_iter().map(|k| describe_value(heap, &k.to_value())))
            )
        }
        HeapValue::Function(function @ FunctionValue::User { .. }) => {
            format!("fun {}", function.name())
        }
        HeapValue::Function(FunctionValue::Builtin(builtin)) => format!("builtin {}", builtin),
        HeapValue::Context(ctx) => format!(
            "{} ctx [{}]",
            ctx.kind.label(),
            list(&mut ctx.sorted_names().into_iter().cloned())
        ),
        HeapValue::Iterator(iter) => {
            format!("iterator{}", if iter.is_ended() { " (ended)" } else { "" })
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_marks_cut() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }

    #[test]
    fn test_describe_list_cell() {
        let mut heap = Heap::new();
        let list = heap.allocate(HeapValue::List(vec![Value::Int(1), Value::Str("a".into())]));
        let value = heap.read(list).unwrap().clone();
        assert_eq!(describe_cell(&heap, &value), "list [1, \"a\"]");
    }
}
