use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::settings::{ConfigError, Settings};
use crate::logging::LoggingError;
use crate::transfer::accepted::AcceptedFile;
use crate::transfer::driver::{IngestionDriver, TaskExit};
use crate::transfer::presenter::{recent_files, RecentFile, TrayCommand, TrayView};
use crate::transfer::record::{UploadId, UploadStatus};
use crate::transfer::store::{lock_store, SharedStore, UploadStore};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

/// Which part of the screen receives the arrow keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Browser,
    Tray,
}

/// A single entry in the local file browser.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub size: Option<u64>,
    pub is_dir: bool,
}

/// State of the file browser panel.
#[derive(Debug)]
pub struct PanelState {
    pub path: PathBuf,
    pub entries: Vec<FileEntry>,
    pub selected: usize,
    /// Indices of entries that have been marked with Space.
    pub marked: HashSet<usize>,
}

impl PanelState {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: Vec::new(),
            selected: 0,
            marked: HashSet::new(),
        }
    }

    /// Toggle the mark on the highlighted entry. Only files can be marked.
    pub fn toggle_mark(&mut self) {
        match self.entries.get(self.selected) {
            Some(e) if !e.is_dir => {}
            _ => return,
        }
        if !self.marked.remove(&self.selected) {
            self.marked.insert(self.selected);
        }
    }

    /// Mark every file. If all are already marked, unmark all.
    pub fn mark_all(&mut self) {
        let eligible: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_dir)
            .map(|(i, _)| i)
            .collect();

        if eligible.iter().all(|i| self.marked.contains(i)) {
            self.marked.clear();
        } else {
            self.marked.extend(eligible);
        }
    }

    pub fn clear_marks(&mut self) {
        self.marked.clear();
    }

    pub fn load_local(&mut self) -> Result<(), AppError> {
        self.entries.clear();
        self.marked.clear();
        if self.path.parent().is_some() {
            self.entries.push(FileEntry {
                name: "..".to_string(),
                size: None,
                is_dir: true,
            });
        }
        let read_dir = std::fs::read_dir(&self.path)?;
        let mut entries: Vec<FileEntry> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| {
                let meta = e.metadata().ok();
                FileEntry {
                    name: e.file_name().to_string_lossy().to_string(),
                    size: meta.as_ref().filter(|m| m.is_file()).map(|m| m.len()),
                    is_dir: meta.map(|m| m.is_dir()).unwrap_or(false),
                }
            })
            .collect();
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then(a.name.cmp(&b.name)));
        self.entries.extend(entries);
        self.selected = self.selected.min(self.entries.len().saturating_sub(1));
        Ok(())
    }

    pub fn move_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn move_down(&mut self) {
        if self.selected + 1 < self.entries.len() {
            self.selected += 1;
        }
    }

    pub fn enter_selected(&mut self) -> Result<(), AppError> {
        if let Some(entry) = self.entries.get(self.selected) {
            if entry.is_dir {
                let new_path = if entry.name == ".." {
                    self.path.parent().unwrap_or(&self.path).to_path_buf()
                } else {
                    self.path.join(&entry.name)
                };
                self.path = new_path;
                self.selected = 0;
                self.load_local()?;
            }
        }
        Ok(())
    }

    /// Navigate to the parent directory (Backspace key).
    pub fn go_up(&mut self) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().map(|p| p.to_path_buf()) {
            self.path = parent;
            self.selected = 0;
            self.load_local()?;
        }
        Ok(())
    }

    /// Marked files in display order, or the highlighted file when nothing
    /// is marked.
    pub fn selected_files(&self) -> Vec<PathBuf> {
        let indices: Vec<usize> = if self.marked.is_empty() {
            vec![self.selected]
        } else {
            let mut indices: Vec<usize> = self.marked.iter().copied().collect();
            indices.sort_unstable();
            indices
        };
        indices
            .into_iter()
            .filter_map(|i| self.entries.get(i))
            .filter(|e| !e.is_dir)
            .map(|e| self.path.join(&e.name))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Overall application state
// ---------------------------------------------------------------------------

pub struct App {
    pub browser: PanelState,
    pub focus: Focus,
    pub running: bool,
    pub status_message: Option<String>,
    /// Keyboard shortcut help overlay (F1)
    pub help_visible: bool,
    /// Highlighted row in the tray (index into the newest-first rows).
    pub tray_selected: usize,
    pub settings: Settings,
    store: SharedStore,
    driver: IngestionDriver,
}

impl App {
    /// Build the app around an already opened store and resume any uploads
    /// the previous run left unfinished.
    pub fn new(settings: Settings, store: UploadStore, start_dir: PathBuf) -> Result<Self, AppError> {
        let mut browser = PanelState::new(start_dir);
        browser.load_local()?;
        let store = store.into_shared();
        let mut driver = IngestionDriver::new(SharedStore::clone(&store), settings.driver());
        let resumed = driver.resume_pending();
        let status_message = (resumed > 0).then(|| format!("Resumed {} unfinished upload(s)", resumed));
        Ok(Self {
            browser,
            focus: Focus::Browser,
            running: true,
            status_message,
            help_visible: false,
            tray_selected: 0,
            settings,
            store,
            driver,
        })
    }

    pub fn quit(&mut self) {
        self.driver.shutdown();
        self.running = false;
    }

    /// Snapshot of what the tray shows right now.
    pub fn tray_view(&self) -> TrayView {
        TrayView::from_session(lock_store(&self.store).session())
    }

    pub fn recent_files(&self) -> Vec<RecentFile> {
        recent_files(lock_store(&self.store).session(), self.settings.tray.recent_limit)
    }

    /// The tray only takes focus while it is open and expanded.
    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Browser if self.tray_accepts_focus() => Focus::Tray,
            _ => Focus::Browser,
        };
    }

    fn tray_accepts_focus(&self) -> bool {
        let store = lock_store(&self.store);
        store.is_widget_open() && !store.is_widget_minimized() && !store.session().uploads.is_empty()
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Feed the marked files (or the highlighted file) into the driver.
    pub fn start_upload(&mut self) {
        let mut accepted = Vec::new();
        for path in self.browser.selected_files() {
            match AcceptedFile::from_path(&path) {
                Ok(Some(file)) => accepted.push(file),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read file for upload");
                    self.status_message = Some(format!("Cannot read {}: {}", path.display(), e));
                }
            }
        }
        if accepted.is_empty() {
            return;
        }

        let label = if accepted.len() == 1 {
            format!("'{}'", accepted[0].name)
        } else {
            format!("{} files", accepted.len())
        };
        let started = self.driver.accept_all(accepted);
        tracing::info!(count = started.len(), "accepted files for upload");
        self.status_message = Some(format!("Uploading {}…", label));
        self.tray_selected = 0;
        self.browser.clear_marks();
    }

    /// Release finished progress tasks. Called once per frame.
    pub fn poll_uploads(&mut self) {
        let exits = self.driver.reap();
        let completed = exits.iter().filter(|(_, e)| *e == TaskExit::Completed).count();
        if completed > 0 && self.driver.live_tasks() == 0 {
            self.status_message = Some("All uploads completed".to_string());
        }
        self.clamp_tray_selection();
    }

    pub fn tray_command(&mut self, command: TrayCommand) {
        command.apply(&mut lock_store(&self.store));
        if !self.tray_accepts_focus() {
            self.focus = Focus::Browser;
        }
        self.clamp_tray_selection();
    }

    pub fn tray_move_up(&mut self) {
        self.tray_selected = self.tray_selected.saturating_sub(1);
    }

    pub fn tray_move_down(&mut self) {
        let rows = self.tray_view().rows.len();
        if self.tray_selected + 1 < rows {
            self.tray_selected += 1;
        }
    }

    fn selected_upload(&self) -> Option<(UploadId, UploadStatus)> {
        self.tray_view()
            .row(self.tray_selected)
            .map(|r| (r.id.clone(), r.status))
    }

    /// Delete the highlighted tray row and stop its task.
    pub fn remove_selected(&mut self) {
        if let Some((id, _)) = self.selected_upload() {
            self.driver.cancel(&id);
            lock_store(&self.store).remove_upload(&id);
            self.clamp_tray_selection();
            if !self.tray_accepts_focus() {
                self.focus = Focus::Browser;
            }
        }
    }

    /// Abort the highlighted upload: it ends as failed with its progress so far.
    pub fn abort_selected(&mut self) {
        if let Some((id, UploadStatus::Uploading)) = self.selected_upload() {
            lock_store(&self.store).fail_upload(&id);
            self.driver.cancel(&id);
            self.status_message = Some("Upload aborted".to_string());
        }
    }

    /// Mark the highlighted upload as done right away.
    pub fn complete_selected(&mut self) {
        if let Some((id, UploadStatus::Uploading)) = self.selected_upload() {
            lock_store(&self.store).complete_upload(&id);
            self.driver.cancel(&id);
        }
    }

    fn clamp_tray_selection(&mut self) {
        let rows = self.tray_view().rows.len();
        self.tray_selected = self.tray_selected.min(rows.saturating_sub(1));
    }

    #[cfg(test)]
    fn store(&self) -> &SharedStore {
        &self.store
    }
}
