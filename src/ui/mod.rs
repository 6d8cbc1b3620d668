pub mod dialogs;
pub mod panels;
pub mod statusbar;
pub mod tray;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
};

use crate::app::{App, Focus};
use dialogs::render_help_dialog;
use panels::render_panels;
use statusbar::render_statusbar;
use tray::render_tray;

/// Top-level render function called each frame.
pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // panels take remaining space
            Constraint::Length(2), // status bar (hints + message)
        ])
        .split(frame.area());

    // One view per frame: the panels and the tray read the same snapshot.
    let view = app.tray_view();
    let recent = app.recent_files();

    render_panels(frame, app, &recent, chunks[0]);
    render_statusbar(frame, chunks[1], app.status_message.as_deref(), view.active_count);

    if view.visible {
        render_tray(frame, chunks[0], &view, app.tray_selected, app.focus == Focus::Tray);
    }

    // Help overlay on top of everything else
    if app.help_visible {
        render_help_dialog(frame);
    }
}
