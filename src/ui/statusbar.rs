use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

/// Render the key hint bar and the status message at the bottom.
/// `active_uploads` shows up as a badge while anything is uploading, even
/// when the tray itself is closed.
pub fn render_statusbar(frame: &mut Frame, area: Rect, message: Option<&str>, active_uploads: usize) {
    // Split into 2 rows; hints on row 0, status message on row 1.
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let hints: [(&str, &str); 8] = [
        ("F1", "Help"),
        ("F5", "Upload"),
        ("Tab", "Tray"),
        ("m", "Minimize"),
        ("c", "Close"),
        ("x", "Clear"),
        ("Del", "Remove"),
        ("F10", "Quit"),
    ];

    let mut spans: Vec<Span> = Vec::new();
    for (key, label) in &hints {
        spans.push(Span::styled(format!(" {} ", key), key_style(Color::DarkGray)));
        spans.push(Span::styled(
            format!("{} ", label),
            Style::default().fg(Color::White),
        ));
    }
    if active_uploads > 0 {
        spans.push(Span::styled(
            format!(" ↑ {} ", active_uploads),
            key_style(Color::Green),
        ));
    }

    let hint_para = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(hint_para, rows[0]);

    let msg_line = Line::from(vec![Span::styled(
        format!(" {}", message.unwrap_or("")),
        Style::default().fg(Color::Yellow),
    )]);
    let msg_para = Paragraph::new(msg_line).style(Style::default().bg(Color::Black));
    frame.render_widget(msg_para, rows[1]);
}

fn key_style(bg: Color) -> Style {
    Style::default()
        .bg(bg)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD)
}
