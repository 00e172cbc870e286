use ratatui::style::{Color, Modifier, Style};

// Dark grays with one orange accent. Add roles here rather than inline colors.
pub const SURFACE: Color = Color::Rgb(17, 21, 27);
pub const BAR_BG: Color = Color::Rgb(14, 18, 24);

pub const FG: Color = Color::Rgb(229, 231, 235);
pub const MUTED: Color = Color::Rgb(156, 163, 175);
pub const DIM: Color = Color::Rgb(107, 114, 128);
pub const BORDER: Color = Color::Rgb(55, 65, 81);

pub const ACCENT: Color = Color::Rgb(255, 159, 26);
pub const ACCENT_BG: Color = Color::Rgb(44, 32, 16);

pub const ADDED: Color = Color::Rgb(134, 239, 172);
pub const REMOVED: Color = Color::Rgb(248, 113, 113);
pub const HUNK: Color = Color::Rgb(125, 211, 252);
pub const WARNING: Color = Color::Rgb(250, 204, 21);

pub fn border(focused: bool) -> Style {
    Style::default().fg(if focused { ACCENT } else { BORDER })
}

pub fn selected() -> Style {
    Style::default()
        .fg(FG)
        .bg(ACCENT_BG)
        .add_modifier(Modifier::BOLD)
}

pub fn button(focused: bool) -> Style {
    if focused {
        Style::default()
            .fg(Color::Black)
            .bg(ACCENT)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(MUTED)
    }
}
