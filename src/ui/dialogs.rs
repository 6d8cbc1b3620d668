use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Clear, Paragraph},
};

/// Key bindings grouped by where they apply.
const SECTIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "Files",
        &[
            ("↑ ↓", "move selection"),
            ("Enter", "open directory"),
            ("Backspace", "parent directory"),
            ("Space", "mark / unmark file"),
            ("*", "mark / unmark all files"),
            ("F5 u", "upload marked or highlighted files"),
        ],
    ),
    (
        "Tray",
        &[
            ("Tab", "focus files / tray"),
            ("m", "minimize / expand"),
            ("c", "close (uploads keep running)"),
            ("x", "clear completed and failed"),
            ("Del", "remove highlighted upload"),
            ("a", "abort highlighted upload"),
            ("Enter", "finish highlighted upload"),
        ],
    ),
    ("General", &[("F1", "toggle this help"), ("F10 q", "quit")]),
];

const KEY_WIDTH: usize = 11;
const DIALOG_WIDTH: u16 = 56;

fn help_lines() -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (i, (title, bindings)) in SECTIONS.iter().enumerate() {
        if i > 0 {
            lines.push(Line::default());
        }
        lines.push(Line::styled(
            *title,
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
        for (key, action) in bindings.iter() {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  {:<KEY_WIDTH$}", key),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::raw(*action),
            ]));
        }
    }
    lines
}

/// Key binding overlay, centered on the screen.
pub fn render_help_dialog(frame: &mut Frame) {
    let lines = help_lines();
    let area = dialog_rect(frame.area(), DIALOG_WIDTH, lines.len() as u16 + 2);
    frame.render_widget(Clear, area);

    let block = Block::bordered()
        .title(" Help ")
        .title_bottom(Line::from(" F1 / Esc close ").right_aligned())
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// `width` x `height` in the middle of `outer`, shrunk to fit.
fn dialog_rect(outer: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(outer.height))])
        .flex(Flex::Center)
        .areas(outer);
    let [area] = Layout::horizontal([Constraint::Length(width.min(outer.width))])
        .flex(Flex::Center)
        .areas(row);
    area
}
