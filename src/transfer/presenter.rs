use crate::transfer::record::{UploadId, UploadSession, UploadStatus};
use crate::transfer::store::UploadStore;

/// One line of the tray's detail list.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRow {
    pub id: UploadId,
    pub file_name: String,
    pub size: String,
    pub progress: f64,
    pub status: UploadStatus,
}

impl UploadRow {
    /// Whole percent shown next to the bar.
    pub fn percent(&self) -> u8 {
        self.progress.round().clamp(0.0, 100.0) as u8
    }
}

/// What the tray shows for one frame. Built from the store every time and
/// never kept across frames.
#[derive(Debug, Clone, PartialEq)]
pub struct TrayView {
    pub visible: bool,
    pub minimized: bool,
    pub active_count: usize,
    /// Most recent upload first.
    pub rows: Vec<UploadRow>,
}

impl TrayView {
    pub fn from_session(session: &UploadSession) -> Self {
        let rows = session
            .uploads
            .values()
            .rev()
            .map(|u| UploadRow {
                id: u.id.clone(),
                file_name: u.file_name.clone(),
                size: u.size.clone(),
                progress: u.progress,
                status: u.status,
            })
            .collect();
        Self {
            visible: session.is_widget_open,
            minimized: session.is_widget_minimized,
            active_count: session.uploading_count(),
            rows,
        }
    }

    /// "Uploading 2 items", or "Uploads Completed" once nothing is running.
    pub fn header(&self) -> String {
        match self.active_count {
            0 => "Uploads Completed".to_string(),
            1 => "Uploading 1 item".to_string(),
            n => format!("Uploading {} items", n),
        }
    }

    pub fn row(&self, index: usize) -> Option<&UploadRow> {
        self.rows.get(index)
    }
}

/// A completed upload for the "Recent Files" pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentFile {
    pub file_name: String,
    pub size: String,
    pub mime_type: String,
}

/// Completed uploads, most recent first, at most `limit`.
pub fn recent_files(session: &UploadSession, limit: usize) -> Vec<RecentFile> {
    session
        .uploads
        .values()
        .rev()
        .filter(|u| u.status == UploadStatus::Completed)
        .take(limit)
        .map(|u| RecentFile {
            file_name: u.file_name.clone(),
            size: u.size.clone(),
            mime_type: u.mime_type.clone(),
        })
        .collect()
}

/// Tray gestures, applied to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayCommand {
    ToggleMinimize,
    Close,
    ClearCompleted,
}

impl TrayCommand {
    pub fn apply(self, store: &mut UploadStore) {
        match self {
            Self::ToggleMinimize => {
                let minimized = store.is_widget_minimized();
                store.set_widget_minimized(!minimized);
            }
            Self::Close => store.close_widget(),
            Self::ClearCompleted => store.clear_completed(),
        }
    }
}
