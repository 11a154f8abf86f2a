//! Centralized theme and styling for the TUI
//!
//! All colors and composed styles used by the menus live here rather than
//! being hardcoded in rendering code.

use ratatui::style::{Color, Modifier, Style};

// =============================================================================
// COLOR PALETTE
// =============================================================================

pub struct Colors;

impl Colors {
    pub const BG_PRIMARY: Color = Color::Rgb(20, 20, 30);

    /// Background of the destructive confirmation screen
    pub const BG_DANGER: Color = Color::Rgb(30, 20, 20);

    pub const FG_PRIMARY: Color = Color::White;
    pub const FG_MUTED: Color = Color::DarkGray;

    /// Borders, titles, highlights
    pub const PRIMARY: Color = Color::Cyan;
    pub const SECONDARY: Color = Color::Yellow;

    pub const ERROR: Color = Color::Red;
    pub const WARNING: Color = Color::Yellow;

    /// Selected row, black on cyan like the classic curses menu
    pub const SELECTED_BG: Color = Color::Cyan;
    pub const SELECTED_FG: Color = Color::Black;

    pub const UNSELECTED: Color = Color::Gray;
    pub const NAV_HINT: Color = Color::DarkGray;
}

// =============================================================================
// PRE-BUILT STYLES
// =============================================================================

pub struct Styles;

impl Styles {
    pub fn text() -> Style {
        Style::default().fg(Colors::FG_PRIMARY)
    }

    pub fn title() -> Style {
        Style::default()
            .fg(Colors::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn label() -> Style {
        Style::default()
            .fg(Colors::SECONDARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn border() -> Style {
        Style::default().fg(Colors::PRIMARY)
    }

    pub fn border_danger() -> Style {
        Style::default().fg(Colors::ERROR)
    }

    pub fn panel_bg() -> Style {
        Style::default().bg(Colors::BG_PRIMARY)
    }

    pub fn panel_bg_danger() -> Style {
        Style::default().bg(Colors::BG_DANGER)
    }

    pub fn selected() -> Style {
        Style::default()
            .fg(Colors::SELECTED_FG)
            .bg(Colors::SELECTED_BG)
            .add_modifier(Modifier::BOLD)
    }

    pub fn unselected() -> Style {
        Style::default().fg(Colors::UNSELECTED)
    }

    pub fn notice() -> Style {
        Style::default()
            .fg(Colors::WARNING)
            .add_modifier(Modifier::BOLD)
    }

    pub fn hint() -> Style {
        Style::default().fg(Colors::NAV_HINT)
    }

    pub fn muted() -> Style {
        Style::default().fg(Colors::FG_MUTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_style_is_readable() {
        let style = Styles::selected();
        assert_eq!(style.fg, Some(Colors::SELECTED_FG));
        assert_eq!(style.bg, Some(Colors::SELECTED_BG));
        assert_ne!(style.fg, style.bg);
    }

    #[test]
    fn test_danger_differs_from_normal_panel() {
        assert_ne!(Styles::panel_bg(), Styles::panel_bg_danger());
    }
}
