use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
};

use crate::app::{App, Focus, PanelState};
use crate::transfer::accepted::{guess_mime, human_size};
use crate::transfer::presenter::RecentFile;

// Column widths (in characters)
const COL_SIZE: u16 = 10; // e.g. " 120.00 KB"
const COL_TYPE: u16 = 16; // e.g. "application/pdf"
const COL_PADDING: u16 = 2;

/// Render the local file browser inside the given area.
pub fn render_browser(frame: &mut Frame, panel: &PanelState, area: Rect, is_active: bool) {
    let border_style = if is_active {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let title = format!(" Files — {} ", panel.path.display());
    let block = Block::default()
        .title(title.as_str())
        .borders(Borders::ALL)
        .border_style(border_style);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // 1 (mark) + 2 (icon) + two separators + size + type + 2 (highlight symbol)
    let fixed_cols = 1 + 2 + COL_PADDING * 2 + COL_SIZE + COL_TYPE + 2;
    let name_width = inner.width.saturating_sub(fixed_cols) as usize;

    let items: Vec<ListItem> = panel
        .entries
        .iter()
        .enumerate()
        .map(|(idx, e)| {
            let is_marked = panel.marked.contains(&idx);

            let (icon, base_style) = if e.is_dir {
                ("▶ ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            } else {
                ("  ", Style::default().fg(Color::White))
            };
            let name_style = if is_marked {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                base_style
            };
            let mark_str = if is_marked { "✓" } else { " " };

            let size_str = match e.size {
                Some(s) => format!("{:>width$}", human_size(s), width = COL_SIZE as usize),
                None => " ".repeat(COL_SIZE as usize),
            };
            let type_str = if e.is_dir {
                String::new()
            } else {
                truncate_name(guess_mime(&e.name), COL_TYPE as usize)
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    mark_str,
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
                Span::styled(icon, base_style),
                Span::styled(
                    format!("{:<width$}", truncate_name(&e.name, name_width), width = name_width),
                    name_style,
                ),
                Span::raw("  "),
                Span::styled(size_str, Style::default().fg(Color::Gray)),
                Span::raw("  "),
                Span::styled(type_str, Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let mut list_state = ListState::default();
    list_state.select(Some(panel.selected));

    let list = List::new(items)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("► ");

    frame.render_stateful_widget(list, inner, &mut list_state);
}

/// Completed uploads, newest first.
pub fn render_recent(frame: &mut Frame, recent: &[RecentFile], area: Rect) {
    let title = format!(" Recent Files ({}) ", recent.len());
    let block = Block::default()
        .title(title.as_str())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let items: Vec<ListItem> = if recent.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "  No files uploaded yet.",
            Style::default().fg(Color::DarkGray),
        )))]
    } else {
        let name_width = inner.width.saturating_sub(COL_SIZE + COL_TYPE + COL_PADDING * 2 + 2) as usize;
        recent
            .iter()
            .map(|f| {
                ListItem::new(Line::from(vec![
                    Span::styled("■ ", Style::default().fg(Color::Cyan)),
                    Span::styled(
                        format!("{:<width$}", truncate_name(&f.file_name, name_width), width = name_width),
                        Style::default().fg(Color::White),
                    ),
                    Span::raw("  "),
                    Span::styled(
                        format!("{:<width$}", truncate_name(&f.mime_type, COL_TYPE as usize), width = COL_TYPE as usize),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::raw("  "),
                    Span::styled(
                        format!("{:>width$}", f.size, width = COL_SIZE as usize),
                        Style::default().fg(Color::Gray),
                    ),
                ]))
            })
            .collect()
    };

    frame.render_widget(List::new(items), inner);
}

/// Browser on the left, recent files on the right.
pub fn render_panels(frame: &mut Frame, app: &App, recent: &[RecentFile], area: Rect) {
    let mid = area.width / 2;
    let left_area = Rect { x: area.x, y: area.y, width: mid, height: area.height };
    let right_area = Rect { x: area.x + mid, y: area.y, width: area.width - mid, height: area.height };

    render_browser(frame, &app.browser, left_area, app.focus == Focus::Browser);
    render_recent(frame, recent, right_area);
}

pub(crate) fn truncate_name(name: &str, max_len: usize) -> String {
    if max_len == 0 {
        return String::new();
    }
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_len {
        name.to_string()
    } else {
        // Show as many chars as fit, replace last 3 with "..."
        let cut = max_len.saturating_sub(3);
        let truncated: String = chars[..cut].iter().collect();
        format!("{}...", truncated)
    }
}
