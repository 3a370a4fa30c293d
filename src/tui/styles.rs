use ratatui::style::{Color, Modifier, Style};

use crate::scroll::LoaderState;

/// Application theme configuration
#[derive(Debug, Clone)]
pub struct Theme {
    /// Primary colors
    pub primary: Color,
    pub accent: Color,

    /// Text colors
    pub text: Color,
    pub text_dim: Color,
    pub text_bright: Color,

    /// Background colors
    pub background: Color,
    pub background_alt: Color,
    pub row_even: Color,
    pub row_odd: Color,

    /// Border colors
    pub border: Color,

    /// Status colors
    pub success: Color,
    pub warning: Color,
    pub error: Color,

    pub placeholder: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    /// Create a dark theme
    pub fn dark() -> Self {
        Self {
            primary: Color::Rgb(147, 51, 234),    // Purple
            accent: Color::Rgb(236, 72, 153),     // Pink

            text: Color::Rgb(248, 250, 252),      // Slate-50
            text_dim: Color::Rgb(148, 163, 184),  // Slate-400
            text_bright: Color::Rgb(255, 255, 255),

            background: Color::Rgb(15, 23, 42),   // Slate-900
            background_alt: Color::Rgb(30, 41, 59), // Slate-800
            row_even: Color::Rgb(15, 23, 42),
            row_odd: Color::Rgb(23, 32, 51),

            border: Color::Rgb(71, 85, 105),      // Slate-600

            success: Color::Rgb(34, 197, 94),     // Green-500
            warning: Color::Rgb(245, 158, 11),    // Amber-500
            error: Color::Rgb(239, 68, 68),       // Red-500

            placeholder: Color::Rgb(100, 116, 139), // Slate-500
        }
    }

    /// Base style for normal elements
    pub fn base_style(&self) -> Style {
        Style::default().fg(self.text).bg(self.background)
    }

    /// Record rows alternate backgrounds by id
    pub fn row_style(&self, id: u64) -> Style {
        let bg = if id % 2 == 0 { self.row_even } else { self.row_odd };
        Style::default().fg(self.text).bg(bg)
    }

    pub fn loader_style(&self, state: LoaderState) -> Style {
        let fg = match state {
            LoaderState::Loading => self.warning,
            LoaderState::NoMoreData => self.placeholder,
        };
        Style::default()
            .fg(fg)
            .bg(self.background)
            .add_modifier(Modifier::ITALIC)
    }

    pub fn header_style(&self) -> Style {
        Style::default()
            .fg(self.text_bright)
            .bg(self.primary)
            .add_modifier(Modifier::BOLD)
    }

    /// Badge shown while pinned to the live edge
    pub fn live_style(&self, following: bool) -> Style {
        let fg = if following { self.success } else { self.text_dim };
        Style::default().fg(fg).add_modifier(Modifier::BOLD)
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.border)
    }

    /// Style for the status bar
    pub fn status_bar_style(&self) -> Style {
        Style::default().fg(self.text).bg(self.background_alt)
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.error).add_modifier(Modifier::BOLD)
    }

    pub fn activity_style(&self) -> Style {
        Style::default().fg(self.accent)
    }

    /// Style for help text
    pub fn help_style(&self) -> Style {
        Style::default()
            .fg(self.text)
            .bg(self.background)
            .add_modifier(Modifier::BOLD)
    }

    /// Style for placeholder text
    pub fn placeholder_style(&self) -> Style {
        Style::default()
            .fg(self.placeholder)
            .add_modifier(Modifier::ITALIC)
    }
}
