use ratatui::style::Color;

use crate::storage::ThemePreference;

/// Theme data structure containing all colors used by the overlay
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    // Frame
    pub border: Color,
    pub title: Color,
    pub background: Color,

    // Slots
    pub digit: Color,
    pub directory: Color,
    pub action: Color,
    pub input: Color,
    pub virtual_directory: Color,
    pub page_control: Color,

    // Palette
    pub query: Color,
    pub result_path: Color,
    pub selected_bg: Color,
    pub selected_fg: Color,

    // Status line
    pub status_fg: Color,
    pub loading: Color,
    pub message: Color,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            border: Color::Yellow,
            title: Color::Gray,
            background: Color::Reset,

            digit: Color::Yellow,
            directory: Color::Blue,
            action: Color::Reset,
            input: Color::Green,
            virtual_directory: Color::Cyan,
            page_control: Color::DarkGray,

            query: Color::White,
            result_path: Color::Gray,
            selected_bg: Color::White,
            selected_fg: Color::Black,

            status_fg: Color::Gray,
            loading: Color::Magenta,
            message: Color::Red,
        }
    }

    pub fn light() -> Self {
        Self {
            border: Color::Blue,
            title: Color::Black,
            background: Color::White,

            digit: Color::Magenta,
            directory: Color::Blue,
            action: Color::Black,
            input: Color::Green,
            virtual_directory: Color::Cyan,
            page_control: Color::Gray,

            query: Color::Black,
            result_path: Color::DarkGray,
            selected_bg: Color::Blue,
            selected_fg: Color::White,

            status_fg: Color::DarkGray,
            loading: Color::Magenta,
            message: Color::Red,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

/// Theme for a stored preference. Terminals do not report their scheme,
/// so `System` keeps the terminal's own background.
pub fn get_theme(preference: ThemePreference) -> Theme {
    match preference {
        ThemePreference::Light => Theme::light(),
        ThemePreference::Dark | ThemePreference::System => Theme::dark(),
    }
}
