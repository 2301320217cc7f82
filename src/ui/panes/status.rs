//! Status bar rendering with keybindings and engine state

use crate::interpreter::{Mode, RunStatus};
use crate::memory::heap::GenerationId;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Engine state shown on the left of the status bar
pub struct StatusRenderData<'a> {
    pub message: &'a str,
    pub steps: u64,
    pub backtracks: u64,
    pub mode: Mode,
    pub status: RunStatus,
    pub alternatives: usize,
    /// Bytes held by frozen alternatives
    pub frozen_bytes: usize,
    pub generation: GenerationId,
    pub position: Option<usize>,
    pub is_playing: bool,
}

fn format_bytes(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1}M", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}K", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

pub fn render_status_bar(frame: &mut Frame, area: Rect, data: StatusRenderData) {
    let layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let badge_color = match data.status {
        RunStatus::Matched => DEFAULT_THEME.success,
        RunStatus::Errored | RunStatus::Faulted => DEFAULT_THEME.error,
        RunStatus::NoMatch | RunStatus::TimedOut => DEFAULT_THEME.secondary,
        RunStatus::Ready | RunStatus::Running => match data.mode {
            Mode::Forward => DEFAULT_THEME.primary,
            Mode::Backward => DEFAULT_THEME.control,
        },
    };
    let mode = match data.mode {
        Mode::Forward => "fwd",
        Mode::Backward => "back",
    };
    let bar_style = Style::default().bg(DEFAULT_THEME.current_line_bg);

    let left_spans = vec![
        Span::styled(
            format!(" Step {} ", data.steps),
            Style::default()
                .bg(badge_color)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(
                " {} │ alts {} ({}) │ {} │ pos {} │ ↺ {} ",
                mode,
                data.alternatives,
                format_bytes(data.frozen_bytes),
                data.generation,
                data.position
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                data.backtracks
            ),
            bar_style.fg(DEFAULT_THEME.generation),
        ),
        Span::styled(format!(" {} ", data.message), bar_style.fg(DEFAULT_THEME.fg)),
    ];

    frame.render_widget(
        Paragraph::new(Line::from(left_spans))
            .style(bar_style)
            .alignment(Alignment::Left),
        layout[0],
    );

    let key_style = Style::default().bg(DEFAULT_THEME.comment).fg(Color::Black);
    let desc_style = bar_style.fg(DEFAULT_THEME.fg);
    let sep_style = bar_style.fg(DEFAULT_THEME.comment);

    let mut right_spans = vec![
        Span::styled(" →/s ", key_style),
        Span::styled(" step ", desc_style),
        Span::styled("│", sep_style),
        Span::styled(" 1-9 ", key_style),
        Span::styled(" n steps ", desc_style),
        Span::styled("│", sep_style),
        Span::styled(" ⎵ ", key_style),
        Span::styled(" play ", desc_style),
        Span::styled("│", sep_style),
        Span::styled(" ↵ ", key_style),
        Span::styled(" run ", desc_style),
        Span::styled("│", sep_style),
        Span::styled(" q ", key_style),
        Span::styled(" quit ", desc_style),
    ];

    let badge = if data.is_playing {
        Some((" ▶ PLAYING ", DEFAULT_THEME.secondary))
    } else if data.status.is_finished() {
        Some((" END ", badge_color))
    } else {
        None
    };
    if let Some((text, color)) = badge {
        right_spans.push(Span::styled("│", sep_style));
        right_spans.push(Span::styled(
            text,
            Style::default()
                .bg(color)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(right_spans))
            .style(bar_style)
            .alignment(Alignment::Right),
        layout[1],
    );
}
