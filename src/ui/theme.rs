use ratatui::style::Color;

/// Debugger palette. Base colors follow Catppuccin Mocha.
pub struct Theme {
    pub fg: Color,
    pub primary: Color,
    pub secondary: Color,
    pub comment: Color,
    pub success: Color,
    pub error: Color,

    // Source pane
    pub keyword: Color,
    pub string: Color,
    pub number: Color,
    pub function: Color,
    /// Pattern operators and the `ahead`/`not`/`atomic` forms
    pub lexeme: Color,
    pub current_line_bg: Color,

    // Engine state
    pub generation: Color,
    /// Control tokens, barriers and tags
    pub control: Color,
    /// Freed heap cells
    pub tombstone: Color,

    pub border_focused: Color,
    pub border_normal: Color,
}

pub const DEFAULT_THEME: Theme = Theme {
    fg: Color::Rgb(205, 214, 244),
    primary: Color::Rgb(137, 180, 250),
    secondary: Color::Rgb(250, 179, 135),
    comment: Color::Rgb(108, 112, 134),
    success: Color::Rgb(166, 227, 161),
    error: Color::Rgb(243, 139, 168),

    keyword: Color::Rgb(203, 166, 247),
    string: Color::Rgb(166, 227, 161),
    number: Color::Rgb(250, 179, 135),
    function: Color::Rgb(249, 226, 175),
    lexeme: Color::Rgb(137, 220, 235),
    current_line_bg: Color::Rgb(49, 50, 68),

    generation: Color::Rgb(148, 226, 213),
    control: Color::Rgb(245, 194, 231),
    tombstone: Color::Rgb(88, 91, 112),

    border_focused: Color::Rgb(249, 226, 175),
    border_normal: Color::Rgb(108, 112, 134),
};
