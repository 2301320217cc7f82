//! Main TUI application state and logic

use crate::interpreter::{AnalysisError, Analyzer, StepOutcome};
use crate::parser::ast::Span;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};

use super::panes::{self, SourceScrollState, StatusRenderData};

/// Delay between two auto-play steps
const PLAY_INTERVAL: Duration = Duration::from_millis(250);

/// Most steps a single "run" key press takes before pausing again
const RUN_CHUNK: u64 = 1_000_000;

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Source,
    Output,
    Stack,
    Heap,
}

impl FocusedPane {
    /// Move focus to the next pane (clockwise: source -> output -> stack -> heap)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Source => FocusedPane::Output,
            FocusedPane::Output => FocusedPane::Stack,
            FocusedPane::Stack => FocusedPane::Heap,
            FocusedPane::Heap => FocusedPane::Source,
        }
    }
}

/// The stepping debugger over a prepared analyzer
pub struct App {
    pub analyzer: Analyzer,
    pub source_code: String,
    pub focused_pane: FocusedPane,

    pub source_scroll: SourceScrollState,
    pub stack_scroll: usize,
    pub heap_scroll: usize,
    pub output_scroll: usize,

    pub should_quit: bool,
    pub status_message: String,
    /// The error that ended the run, with the span it points at
    pub error: Option<(String, Option<Span>)>,

    pub is_playing: bool,
    pub last_play_time: Instant,
    /// Last time space was pressed (for debouncing)
    pub last_space_press: Instant,
}

impl App {
    /// `analyzer` must already be prepared with its input
    pub fn new(analyzer: Analyzer, source_code: String) -> Self {
        let now = Instant::now();
        App {
            analyzer,
            source_code,
            focused_pane: FocusedPane::Source,
            source_scroll: SourceScrollState::default(),
            stack_scroll: 0,
            heap_scroll: 0,
            output_scroll: 0,
            should_quit: false,
            status_message: String::from("Ready!"),
            error: None,
            is_playing: false,
            last_play_time: now,
            last_space_press: now.checked_sub(Duration::from_secs(1)).unwrap_or(now),
        }
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if self.is_playing && self.last_play_time.elapsed() >= PLAY_INTERVAL {
                if !self.step(1) {
                    self.is_playing = false;
                }
                self.last_play_time = Instant::now();
            }

            // Poll with a timeout so auto-play keeps running
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    /// Span of the node the next step handles, or of the error that ended the run
    fn current_span(&self) -> Option<Span> {
        if let Some((_, span)) = &self.error {
            return *span;
        }
        let point = self.analyzer.next_point().or(self.analyzer.last_point())?;
        self.analyzer.program().node(point.node).map(|node| node.span)
    }

    fn render(&mut self, frame: &mut Frame) {
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(frame.area());

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(main_chunks[0]);

        // Left column: Source (top) | Output (bottom)
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(columns[0]);

        // Right column: Stack (top) | Heap (bottom)
        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(columns[1]);

        let current = self.current_span();
        panes::render_source_pane(
            frame,
            left_rows[0],
            &self.source_code,
            current,
            self.error.is_some(),
            self.focused_pane == FocusedPane::Source,
            &mut self.source_scroll,
        );

        panes::render_output_pane(
            frame,
            left_rows[1],
            self.analyzer.output_buffer(),
            self.focused_pane == FocusedPane::Output,
            &mut self.output_scroll,
        );

        panes::render_stack_pane(
            frame,
            right_rows[0],
            self.analyzer.stack(),
            self.analyzer.heap(),
            self.focused_pane == FocusedPane::Stack,
            &mut self.stack_scroll,
        );

        panes::render_heap_pane(
            frame,
            right_rows[1],
            self.analyzer.heap(),
            self.focused_pane == FocusedPane::Heap,
            &mut self.heap_scroll,
        );

        panes::render_status_bar(
            frame,
            main_chunks[1],
            StatusRenderData {
                message: &self.status_message,
                steps: self.analyzer.steps(),
                backtracks: self.analyzer.backtracks(),
                mode: self.analyzer.mode(),
                status: self.analyzer.status(),
                alternatives: self.analyzer.alternatives().len(),
                frozen_bytes: self.analyzer.alternatives().memory_usage(),
                generation: self.analyzer.heap().current_generation(),
                position: self.analyzer.cursor(),
                is_playing: self.is_playing,
            },
        );
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
            }
            KeyCode::Right | KeyCode::Char('s') => {
                self.is_playing = false;
                self.step(1);
            }
            KeyCode::Char(c @ '1'..='9') => {
                self.is_playing = false;
                let n = c.to_digit(10).map(u64::from).unwrap_or(1);
                self.step(n);
            }
            KeyCode::Char(' ') => {
                // Debounce key repeat
                if self.last_space_press.elapsed() >= Duration::from_millis(200) {
                    self.last_space_press = Instant::now();
                    self.is_playing = !self.is_playing && !self.analyzer.status().is_finished();
                    self.status_message = if self.is_playing { "Playing..." } else { "Paused" }
                        .to_string();
                }
            }
            KeyCode::Enter => {
                self.is_playing = false;
                self.step(RUN_CHUNK);
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::Up => match self.focused_pane {
                FocusedPane::Source => {
                    // Scrolling up makes the current line move down visually
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_add(1));
                    }
                }
                FocusedPane::Stack => self.stack_scroll = self.stack_scroll.saturating_sub(1),
                FocusedPane::Heap => self.heap_scroll = self.heap_scroll.saturating_sub(1),
                FocusedPane::Output => self.output_scroll = self.output_scroll.saturating_sub(1),
            },
            KeyCode::Down => match self.focused_pane {
                FocusedPane::Source => {
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_sub(1));
                    }
                }
                FocusedPane::Stack => self.stack_scroll = self.stack_scroll.saturating_add(1),
                FocusedPane::Heap => self.heap_scroll = self.heap_scroll.saturating_add(1),
                FocusedPane::Output => self.output_scroll = self.output_scroll.saturating_add(1),
            },
            _ => {}
        }
    }

    /// Take up to `n` steps. Returns `false` once the run has ended.
    fn step(&mut self, n: u64) -> bool {
        if self.analyzer.status().is_finished() {
            self.status_message = format!("Run ended: {}", self.analyzer.status().label());
            return false;
        }

        let mut taken = 0;
        while taken < n {
            taken += 1;
            match self.analyzer.step_once() {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Finished(matched)) => {
                    self.status_message = match (matched, self.analyzer.get_result()) {
                        (true, Some(result)) => format!("Matched {} char(s)", result.length),
                        _ => "No match".to_string(),
                    };
                    self.output_scroll = usize::MAX;
                    return false;
                }
                Err(err) => {
                    self.report(err);
                    return false;
                }
            }
        }

        self.status_message = format!("Stepped {} step(s)", taken);
        self.output_scroll = usize::MAX;
        true
    }

    fn report(&mut self, err: AnalysisError) {
        self.status_message = err.to_string();
        self.error = Some((err.to_string(), err.location().copied()));
    }
}
