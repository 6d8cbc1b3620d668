mod app;
mod config;
mod logging;
mod transfer;
mod ui;

use std::io;
use std::path::PathBuf;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use app::{App, AppError, Focus};
use config::settings::{config_path, ConfigError, Settings};
use transfer::presenter::TrayCommand;
use transfer::snapshot::JsonFileSnapshot;
use transfer::store::UploadStore;

fn main() -> Result<(), AppError> {
    // A broken settings file should not keep the tray from starting.
    let (settings, config_problem) = match Settings::load() {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };
    let _log_guard = logging::init(&settings.logging, &settings.log_directory())?;
    if let Some(ref e) = config_problem {
        tracing::warn!(error = %e, "using default settings");
    } else {
        write_default_settings(&settings);
    }

    let snapshot = match settings.storage.snapshot_path {
        Some(ref path) => JsonFileSnapshot::new(path),
        None => JsonFileSnapshot::default_location(),
    };
    tracing::info!(snapshot = %snapshot.path().display(), "starting dropdeck");
    let store = UploadStore::open(snapshot);

    let mut app = App::new(settings, store, dirs_or_cwd())?;
    if let Some(e) = config_problem {
        app.status_message = Some(config_message(&e));
    }

    let mut terminal = setup_terminal()?;
    let result = run(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    app.quit();
    tracing::info!("dropdeck stopped");
    result
}

/// First run: leave an editable settings file behind.
fn write_default_settings(settings: &Settings) {
    let path = config_path();
    if path.exists() {
        return;
    }
    match settings.save_to(&path) {
        Ok(()) => tracing::info!(path = %path.display(), "wrote default settings"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not write default settings"),
    }
}

fn config_message(e: &ConfigError) -> String {
    format!("Settings ignored: {}", e)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>, AppError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<(), AppError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<(), AppError> {
    while app.running {
        // Reap finished progress tasks before rendering so the frame sees the
        // latest store state.
        app.poll_uploads();
        terminal.draw(|frame| ui::render(frame, app))?;
        handle_events(app)?;
    }
    Ok(())
}

fn handle_events(app: &mut App) -> Result<(), AppError> {
    if !event::poll(std::time::Duration::from_millis(50))? {
        return Ok(());
    }

    if let Event::Key(key) = event::read()? {
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }

        // F1 toggles the help overlay from any context.
        // Esc closes it when it is visible.
        if key.code == KeyCode::F(1) {
            app.help_visible = !app.help_visible;
            return Ok(());
        }
        if app.help_visible {
            if key.code == KeyCode::Esc {
                app.help_visible = false;
            }
            return Ok(());
        }

        if handle_global_key(app, key.code) {
            return Ok(());
        }
        match app.focus {
            Focus::Browser => handle_browser_key(app, key.code)?,
            Focus::Tray => handle_tray_key(app, key.code),
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Keys that work regardless of focus
// ---------------------------------------------------------------------------

fn handle_global_key(app: &mut App, code: KeyCode) -> bool {
    match code {
        KeyCode::F(10) | KeyCode::Char('q') => app.quit(),
        KeyCode::Tab => app.toggle_focus(),
        KeyCode::F(5) | KeyCode::Char('u') => app.start_upload(),
        KeyCode::Char('m') => app.tray_command(TrayCommand::ToggleMinimize),
        KeyCode::Char('c') => app.tray_command(TrayCommand::Close),
        KeyCode::Char('x') => app.tray_command(TrayCommand::ClearCompleted),
        _ => return false,
    }
    true
}

// ---------------------------------------------------------------------------
// File browser
// ---------------------------------------------------------------------------

fn handle_browser_key(app: &mut App, code: KeyCode) -> Result<(), AppError> {
    match code {
        KeyCode::Up => app.browser.move_up(),
        KeyCode::Down => app.browser.move_down(),

        // Space = toggle mark on current entry; move down after marking
        KeyCode::Char(' ') => {
            app.browser.toggle_mark();
            app.browser.move_down();
        }

        // * = mark all / unmark all
        KeyCode::Char('*') => app.browser.mark_all(),

        KeyCode::Enter => {
            if let Err(e) = app.browser.enter_selected() {
                app.status_message = Some(e.to_string());
            }
        }
        KeyCode::Backspace => {
            if let Err(e) = app.browser.go_up() {
                app.status_message = Some(e.to_string());
            }
        }
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Upload tray
// ---------------------------------------------------------------------------

fn handle_tray_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Up => app.tray_move_up(),
        KeyCode::Down => app.tray_move_down(),
        KeyCode::Delete => app.remove_selected(),
        KeyCode::Char('a') => app.abort_selected(),
        KeyCode::Enter => app.complete_selected(),
        KeyCode::Esc => app.focus = Focus::Browser,
        _ => {}
    }
}

fn dirs_or_cwd() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")))
}
