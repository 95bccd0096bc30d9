use crate::models::Category;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Color,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const BORDER: Color = Color::DarkGray;
pub const BORDER_ACTIVE: Color = Color::Cyan;
pub const MUTED: Color = Color::Gray;
pub const ACCENT: Color = Color::Cyan;
pub const SYNCED: Color = Color::Green;
pub const PENDING: Color = Color::Yellow;
pub const DANGER: Color = Color::Red;

/// Helper function to calculate centered popup position
pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

pub fn category_color(category: Category) -> Color {
    let (r, g, b) = category.definition().color;
    Color::Rgb(r, g, b)
}

/// Cuts `text` to at most `max_width` display columns, marking the cut with `…`.
pub fn truncate(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max_width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

/// Wraps each source line on its own so blank lines and list items survive.
pub fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let width = width.max(10);
    let mut lines = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        lines.extend(textwrap::wrap(line, width).into_iter().map(|l| l.into_owned()));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_wide_chars() {
        assert_eq!(truncate("学习Rust编程", 20), "学习Rust编程");
        assert_eq!(truncate("学习Rust编程", 5), "学习…");
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn wrap_keeps_paragraph_breaks() {
        let lines = wrap_lines("## Overview\n\nshort line", 40);
        assert_eq!(lines, vec!["## Overview", "", "short line"]);

        let long = "word ".repeat(20);
        assert!(wrap_lines(&long, 20).iter().all(|l| l.width() <= 20));
    }

    #[test]
    fn popup_fits_inside_area() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = centered_rect(60, 50, area);
        assert!(popup.width <= 60 && popup.height <= 20);
        assert!(popup.x >= 20 && popup.y >= 10);
    }
}
