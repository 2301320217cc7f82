//! Source code pane rendering with syntax highlighting
//!
//! Shows the program being analyzed with the span of the node about to be
//! stepped highlighted. The pane keeps that line at a fixed visual row while
//! stepping.

use crate::parser::ast::Span as SourceSpan;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::pane_block;

/// Simple syntax highlighting for retrace source
fn highlight_source_code(line: &str) -> Line<'static> {
    let mut spans = Vec::new();
    let mut current_word = String::new();

    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // Comments run to the end of the line
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            flush_word(&mut spans, &mut current_word, false);
            spans.push(Span::styled(
                chars[i..].iter().collect::<String>(),
                Style::default().fg(DEFAULT_THEME.comment),
            ));
            break;
        }

        if c == '"' {
            flush_word(&mut spans, &mut current_word, false);
            let mut end = i + 1;
            while end < chars.len() && chars[end] != '"' {
                end += if chars[end] == '\\' { 2 } else { 1 };
            }
            end = (end + 1).min(chars.len());
            spans.push(Span::styled(
                chars[i..end].iter().collect::<String>(),
                Style::default().fg(DEFAULT_THEME.string),
            ));
            i = end;
            continue;
        }

        // Loop and block tags
        if c == '\'' {
            flush_word(&mut spans, &mut current_word, false);
            let mut end = i + 1;
            while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            spans.push(Span::styled(
                chars[i..end].iter().collect::<String>(),
                Style::default().fg(DEFAULT_THEME.control),
            ));
            i = end;
            continue;
        }

        if !c.is_alphanumeric() && c != '_' {
            flush_word(&mut spans, &mut current_word, c == '(');
            let style = match c {
                '{' | '}' | '(' | ')' | '[' | ']' => Style::default().fg(DEFAULT_THEME.primary),
                '|' | '*' | '+' | '?' | '$' => Style::default().fg(DEFAULT_THEME.lexeme),
                _ => Style::default().fg(DEFAULT_THEME.fg),
            };
            spans.push(Span::styled(c.to_string(), style));
            i += 1;
            continue;
        }

        current_word.push(c);
        i += 1;
    }

    flush_word(&mut spans, &mut current_word, false);
    Line::from(spans)
}

fn flush_word(spans: &mut Vec<Span<'static>>, word: &mut String, is_call: bool) {
    if !word.is_empty() {
        let style = get_keyword_style(word, is_call);
        spans.push(Span::styled(std::mem::take(word), style));
    }
}

fn get_keyword_style(word: &str, is_call: bool) -> Style {
    match word {
        "let" | "const" | "fun" | "pattern" | "return" | "if" | "else" | "while" | "for"
        | "in" => Style::default()
            .fg(DEFAULT_THEME.keyword)
            .add_modifier(Modifier::BOLD),
        "exit" | "next" | "redo" | "restart" | "fail" => Style::default()
            .fg(DEFAULT_THEME.control)
            .add_modifier(Modifier::BOLD),
        "ahead" | "not" | "atomic" => Style::default().fg(DEFAULT_THEME.lexeme),
        "true" | "false" | "nil" => Style::default().fg(DEFAULT_THEME.number),
        _ if word.chars().all(|c| c.is_ascii_digit()) => {
            Style::default().fg(DEFAULT_THEME.number)
        }
        _ if is_call => Style::default().fg(DEFAULT_THEME.function),
        _ => Style::default().fg(DEFAULT_THEME.fg),
    }
}

/// Scroll state for the source pane
#[derive(Debug, Default)]
pub struct SourceScrollState {
    pub offset: usize,
    /// Visual row the current line is kept at (`None` = center on first render)
    pub target_line_row: Option<usize>,
}

/// Render the source code pane. `current` is the span of the node about to
/// be stepped; `is_error` paints it as the failure site.
pub fn render_source_pane(
    frame: &mut Frame,
    area: Rect,
    source_code: &str,
    current: Option<SourceSpan>,
    is_error: bool,
    is_focused: bool,
    scroll_state: &mut SourceScrollState,
) {
    let block = pane_block(" Source ", is_focused);

    let lines: Vec<&str> = source_code.lines().collect();
    let total_lines = lines.len();
    let current_line = current.map(|span| span.line).unwrap_or(0);

    let visible_height = area.height.saturating_sub(2).max(1) as usize; // Account for borders (2), min 1

    let target_row = scroll_state
        .target_line_row
        .unwrap_or(visible_height / 2)
        .min(visible_height.saturating_sub(1));
    scroll_state.target_line_row = Some(target_row);

    if current_line > 0 && current_line <= total_lines {
        scroll_state.offset = (current_line - 1).saturating_sub(target_row);
        if total_lines > visible_height {
            scroll_state.offset = scroll_state.offset.min(total_lines - visible_height);
        } else {
            scroll_state.offset = 0;
        }
    }

    let visible_lines: Vec<Line> = lines
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(idx, line)| {
            let line_num = idx + 1;
            let is_current = line_num == current_line;

            let num_style = if is_current && is_error {
                Style::default()
                    .fg(DEFAULT_THEME.error)
                    .add_modifier(Modifier::BOLD)
            } else if is_current {
                Style::default()
                    .fg(DEFAULT_THEME.secondary)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(DEFAULT_THEME.comment)
            };

            let content = match current {
                Some(span) if is_current => mark_span(line, span, is_error),
                _ => highlight_source_code(line),
            };

            let mut final_spans = vec![Span::styled(format!("{:4} ", line_num), num_style)];
            final_spans.extend(content.spans);
            Line::from(final_spans)
        })
        .collect();

    let paragraph = Paragraph::new(visible_lines).block(block);
    frame.render_widget(paragraph, area);
}

/// The current line with the node's span picked out
fn mark_span(line: &str, span: SourceSpan, is_error: bool) -> Line<'static> {
    let chars: Vec<char> = line.chars().collect();
    let start = span.column.saturating_sub(1).min(chars.len());
    let width = span.end.saturating_sub(span.start).max(1);
    let end = (start + width).min(chars.len());

    let line_style = Style::default().bg(DEFAULT_THEME.current_line_bg);
    let span_style = if is_error {
        Style::default()
            .bg(DEFAULT_THEME.error)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .bg(DEFAULT_THEME.secondary)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    };

    let before: String = chars[..start].iter().collect();
    let marked: String = chars[start..end].iter().collect();
    let after: String = chars[end..].iter().collect();

    let mut spans: Vec<Span<'static>> = highlight_source_code(&before)
        .spans
        .into_iter()
        .map(|s| s.patch_style(line_style))
        .collect();
    spans.push(Span::styled(marked, span_style));
    spans.extend(
        highlight_source_code(&after)
            .spans
            .into_iter()
            .map(|s| s.patch_style(line_style)),
    );
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_highlighting_keeps_text() {
        let line = "pattern p { \"é\" 'outer: x* } // done";
        assert_eq!(text(&highlight_source_code(line)), line);
    }

    #[test]
    fn test_mark_span_splits_line() {
        let marked = mark_span("let x = 1;", SourceSpan::new(4, 5, 1, 5), false);
        assert_eq!(text(&marked), "let x = 1;");
        assert!(marked.spans.iter().any(|s| s.content == "x"));
    }
}
