use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};

use crate::transfer::presenter::{TrayView, UploadRow};
use crate::transfer::record::UploadStatus;
use crate::ui::panels::truncate_name;

const TRAY_WIDTH: u16 = 52;
/// Each upload takes two lines: name/size, then the bar.
const ROW_HEIGHT: u16 = 2;
const MAX_VISIBLE_ROWS: u16 = 6;

/// Float the upload tray in the bottom-right corner of `area`.
/// When minimized only the header is drawn.
pub fn render_tray(frame: &mut Frame, area: Rect, view: &TrayView, selected: usize, focused: bool) {
    let rect = tray_rect(area, view);
    if rect.width < 10 || rect.height < 3 {
        return;
    }
    frame.render_widget(Clear, rect);

    let border = if focused { Color::Cyan } else { Color::Gray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(Color::Black));
    let inner = block.inner(rect);
    frame.render_widget(block, rect);

    if view.minimized {
        render_header(frame, inner, view);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Length(1), // "clear completed"
            Constraint::Min(0),    // rows
        ])
        .split(inner);

    render_header(frame, chunks[0], view);

    let clear = Line::from(vec![
        Span::styled(" x ", hint_key_style()),
        Span::styled(" Clear completed", Style::default().fg(Color::Cyan)),
    ])
    .right_aligned();
    frame.render_widget(Paragraph::new(clear), chunks[1]);

    if view.rows.is_empty() {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                "No active uploads",
                Style::default().fg(Color::DarkGray),
            )))
            .centered(),
            chunks[2],
        );
        return;
    }

    let width = chunks[2].width.saturating_sub(2) as usize;
    let items: Vec<ListItem> = view.rows.iter().map(|row| row_item(row, width)).collect();

    let mut state = ListState::default();
    if focused {
        state.select(Some(selected.min(view.rows.len() - 1)));
    }
    let list = List::new(items)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("▌ ");
    frame.render_stateful_widget(list, chunks[2], &mut state);
}

fn render_header(frame: &mut Frame, area: Rect, view: &TrayView) {
    let toggle = if view.minimized { "▴" } else { "▾" };
    let label = format!(" {}", view.header());
    let minimize = format!(" m {} ", toggle);
    let close = " c ✕ ";
    let used = label.chars().count() + minimize.chars().count() + close.chars().count() + 1;
    let pad = (area.width as usize).saturating_sub(used);

    let header = Line::from(vec![
        Span::styled(label, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(pad)),
        Span::styled(minimize, hint_key_style()),
        Span::raw(" "),
        Span::styled(close, hint_key_style()),
    ]);
    frame.render_widget(Paragraph::new(header), area);
}

fn row_item(row: &UploadRow, width: usize) -> ListItem<'static> {
    let (icon, icon_style, bar_color) = match row.status {
        UploadStatus::Uploading => (" ", Style::default(), Color::Green),
        UploadStatus::Completed => ("✓", Style::default().fg(Color::Green), Color::Green),
        UploadStatus::Error => ("✗", Style::default().fg(Color::Red), Color::Red),
    };

    let name_width = width.saturating_sub(row.size.chars().count() + 4);
    let title = Line::from(vec![
        Span::styled(
            format!("{:<w$}", truncate_name(&row.file_name, name_width), w = name_width),
            Style::default().fg(Color::White),
        ),
        Span::raw(" "),
        Span::styled(row.size.clone(), Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(icon, icon_style.add_modifier(Modifier::BOLD)),
    ]);

    let pct = format!(" {:>3}%", row.percent());
    let bar_width = width.saturating_sub(pct.len());
    let mut bar = progress_bar(row.progress / 100.0, bar_width, bar_color);
    bar.push(Span::styled(pct, Style::default().fg(Color::Gray)));

    ListItem::new(Text::from(vec![title, Line::from(bar)]))
}

/// A bar of `width` columns built from block characters, `fraction` filled.
fn progress_bar(fraction: f64, width: usize, color: Color) -> Vec<Span<'static>> {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    let empty = width - filled;
    vec![
        Span::styled("█".repeat(filled), Style::default().fg(color)),
        Span::styled("░".repeat(empty), Style::default().fg(Color::DarkGray)),
    ]
}

fn hint_key_style() -> Style {
    Style::default()
        .bg(Color::DarkGray)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD)
}

/// Bottom-right placement, sized to the rows it has to show.
fn tray_rect(area: Rect, view: &TrayView) -> Rect {
    let width = TRAY_WIDTH.min(area.width.saturating_sub(2));
    let body = if view.minimized {
        1
    } else {
        // header + clear line + rows (at least one line for the empty hint)
        let rows = (view.rows.len() as u16).min(MAX_VISIBLE_ROWS).max(1);
        2 + rows * ROW_HEIGHT
    };
    let height = (body + 2).min(area.height.saturating_sub(1));
    Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y + area.height.saturating_sub(height + 1),
        width,
        height,
    }
}
