use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of one upload, stable for the record's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    /// A fresh random id. Ids are tokens, not sequence numbers: several files
    /// accepted in the same instant still get distinct ids.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UploadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UploadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Progress is still moving.
    Uploading,
    /// Finished successfully; progress is pinned at 100.
    Completed,
    /// Failed; progress stays where it stopped.
    Error,
}

impl UploadStatus {
    /// `Completed` and `Error` never transition again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Uploading)
    }
}

/// Per-file state tracked from acceptance to a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: UploadId,
    pub file_name: String,
    /// Percentage in `0.0..=100.0`.
    pub progress: f64,
    pub status: UploadStatus,
    /// Human readable, e.g. "120.00 KB".
    pub size: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl UploadRecord {
    pub fn new(id: UploadId, file_name: String, size: String, mime_type: String) -> Self {
        Self {
            id,
            file_name,
            progress: 0.0,
            status: UploadStatus::Uploading,
            size,
            mime_type,
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.status == UploadStatus::Uploading
    }

    /// Bring a record read from disk back within the model invariants.
    fn normalize(&mut self, key: &UploadId) {
        if &self.id != key {
            self.id = key.clone();
        }
        self.progress = if self.progress.is_finite() {
            self.progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        match self.status {
            UploadStatus::Completed => self.progress = 100.0,
            UploadStatus::Uploading if self.progress >= 100.0 => {
                self.status = UploadStatus::Completed;
            }
            _ => {}
        }
    }
}

/// Uploads keyed by id. Iteration order is the order the uploads started.
pub type UploadCollection = IndexMap<UploadId, UploadRecord>;

/// Everything the tray needs to survive a restart: the uploads plus the two
/// visibility flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    #[serde(default)]
    pub uploads: UploadCollection,
    #[serde(default)]
    pub is_widget_open: bool,
    #[serde(default)]
    pub is_widget_minimized: bool,
}

impl UploadSession {
    /// Repair any record that violates the status/progress invariants.
    pub fn normalized(mut self) -> Self {
        for (key, record) in self.uploads.iter_mut() {
            record.normalize(key);
        }
        self
    }

    pub fn uploading_count(&self) -> usize {
        self.uploads.values().filter(|u| u.is_uploading()).count()
    }
}
