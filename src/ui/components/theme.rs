//! Colour palettes for the terminal UI.

use ratatui::style::{Color, Modifier, Style};

/// Base colours of the dark palette.
pub mod colors {
    use ratatui::style::Color;

    pub const BG_DEEP: Color = Color::Rgb(26, 27, 38); // #1a1b26
    pub const BG_HIGHLIGHT: Color = Color::Rgb(41, 46, 66); // #292e42
    pub const BORDER: Color = Color::Rgb(59, 66, 97); // #3b4261
    pub const BORDER_FOCUS: Color = Color::Rgb(125, 145, 200); // #7d91c8

    pub const TEXT_PRIMARY: Color = Color::Rgb(192, 202, 245); // #c0caf5
    /// Lightened from #565f89 for legibility on BG_DEEP.
    pub const TEXT_MUTED: Color = Color::Rgb(105, 114, 158); // #696e9e

    pub const ACCENT_PRIMARY: Color = Color::Rgb(122, 162, 247); // #7aa2f7
    pub const ACCENT_SECONDARY: Color = Color::Rgb(187, 154, 247); // #bb9af7

    pub const STATUS_SUCCESS: Color = Color::Rgb(158, 206, 106); // #9ece6a
    pub const STATUS_ERROR: Color = Color::Rgb(247, 118, 142); // #f7768e
}

#[derive(Clone, Copy, Debug)]
pub struct ThemePalette {
    pub accent: Color,
    pub accent_alt: Color,
    pub bg: Color,
    pub fg: Color,
    pub surface: Color,
    pub hint: Color,
    pub border: Color,
    pub border_focus: Color,
    pub ok: Color,
    pub error: Color,
}

impl ThemePalette {
    pub fn light() -> Self {
        Self {
            accent: Color::Rgb(47, 107, 231),
            accent_alt: Color::Rgb(124, 93, 198),
            bg: Color::Rgb(250, 250, 252),
            fg: Color::Rgb(36, 41, 46),
            surface: Color::Rgb(240, 241, 245),
            hint: Color::Rgb(125, 134, 144),
            border: Color::Rgb(216, 222, 228),
            border_focus: Color::Rgb(47, 107, 231),
            ok: Color::Rgb(45, 138, 72),
            error: Color::Rgb(207, 34, 46),
        }
    }

    pub fn dark() -> Self {
        Self {
            accent: colors::ACCENT_PRIMARY,
            accent_alt: colors::ACCENT_SECONDARY,
            bg: colors::BG_DEEP,
            fg: colors::TEXT_PRIMARY,
            surface: colors::BG_HIGHLIGHT,
            hint: colors::TEXT_MUTED,
            border: colors::BORDER,
            border_focus: colors::BORDER_FOCUS,
            ok: colors::STATUS_SUCCESS,
            error: colors::STATUS_ERROR,
        }
    }

    pub fn title(self) -> Style {
        Style::default().fg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn hint_style(self) -> Style {
        Style::default().fg(self.hint)
    }

    pub fn border_style(self, focused: bool) -> Style {
        Style::default().fg(if focused {
            self.border_focus
        } else {
            self.border
        })
    }

    pub fn selected_style(self) -> Style {
        Style::default()
            .bg(self.surface)
            .fg(self.accent)
            .add_modifier(Modifier::BOLD)
    }

    /// Status line colour picked from the message itself.
    pub fn status_style(self, status: &str) -> Style {
        let lower = status.to_ascii_lowercase();
        let is_error = lower.contains("error")
            || lower.contains("failed")
            || lower.contains("expired")
            || lower.starts_with("signin:");
        Style::default().fg(if is_error { self.error } else { self.ok })
    }
}
