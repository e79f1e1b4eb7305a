use ratatui::style::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeName {
    Light,
    Dark,
}

impl ThemeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeName::Light => "light",
            ThemeName::Dark => "dark",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "light" => Some(ThemeName::Light),
            "dark" => Some(ThemeName::Dark),
            _ => None,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            ThemeName::Light => ThemeName::Dark,
            ThemeName::Dark => ThemeName::Light,
        }
    }
}

/// Color palette resolved from the current theme name.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub background: Color,
    pub text: Color,
    pub dim: Color,
    pub user_prefix: Color,
    pub assistant_prefix: Color,
    pub heading: Color,
    pub list_bullet: Color,
    pub blockquote: Color,
    pub inline_code: Color,
    pub code_block: Color,
    pub math: Color,
    pub error: Color,
    pub border: Color,
    pub border_focus: Color,
    pub accent: Color,
}

impl Theme {
    pub fn for_name(name: ThemeName) -> Self {
        match name {
            ThemeName::Light => Self {
                background: Color::Reset,
                text: Color::Black,
                dim: Color::DarkGray,
                user_prefix: Color::Blue,
                assistant_prefix: Color::Magenta,
                heading: Color::Blue,
                list_bullet: Color::Green,
                blockquote: Color::DarkGray,
                inline_code: Color::Red,
                code_block: Color::DarkGray,
                math: Color::Cyan,
                error: Color::Red,
                border: Color::Gray,
                border_focus: Color::Blue,
                accent: Color::Blue,
            },
            ThemeName::Dark => Self {
                background: Color::Reset,
                text: Color::White,
                dim: Color::DarkGray,
                user_prefix: Color::Cyan,
                assistant_prefix: Color::LightMagenta,
                heading: Color::Yellow,
                list_bullet: Color::Green,
                blockquote: Color::DarkGray,
                inline_code: Color::LightYellow,
                code_block: Color::Gray,
                math: Color::LightCyan,
                error: Color::LightRed,
                border: Color::DarkGray,
                border_focus: Color::Cyan,
                accent: Color::Cyan,
            },
        }
    }
}
