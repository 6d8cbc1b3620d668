//! Durable storage for the upload session.
//!
//! The whole session is one JSON document. `load` never fails: a missing or
//! unreadable snapshot simply means there is no session yet. `save` replaces
//! the document and swallows write errors so a full disk cannot break the
//! mutation that triggered it.

use std::fs;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::transfer::record::UploadSession;

/// File name of the snapshot inside the data directory.
pub const SNAPSHOT_FILE: &str = "upload_state.json";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the upload store writes through to.
pub trait SessionPersistence: Send {
    fn load(&self) -> UploadSession;
    fn save(&mut self, session: &UploadSession);
}

/// Snapshot kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/dropdeck/upload_state.json`, falling back to the working
    /// directory when the platform has no data directory.
    pub fn default_location() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join("dropdeck").join(SNAPSHOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the snapshot. `Ok(None)` when nothing was saved yet.
    pub fn read(&self) -> Result<Option<UploadSession>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let session: UploadSession = serde_json::from_str(&content)?;
        Ok(Some(session.normalized()))
    }

    /// Serialize into a sibling temp file, then rename over the snapshot so a
    /// crash mid-write leaves the previous document intact.
    pub fn write(&self, session: &UploadSession) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(session)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionPersistence for JsonFileSnapshot {
    fn load(&self) -> UploadSession {
        match self.read() {
            Ok(Some(session)) => {
                tracing::debug!(
                    path = %self.path.display(),
                    uploads = session.uploads.len(),
                    "restored upload session"
                );
                session
            }
            Ok(None) => UploadSession::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discarding unreadable upload snapshot");
                UploadSession::default()
            }
        }
    }

    fn save(&mut self, session: &UploadSession) {
        if let Err(e) = self.write(session) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist upload session");
        }
    }
}

#[cfg(test)]
/// In-memory snapshot shared through an `Arc`, so a test (or a second store)
/// can observe exactly what was written.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    inner: Arc<Mutex<MemoryState>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct MemoryState {
    session: Option<UploadSession>,
    writes: usize,
}

#[cfg(test)]
impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls seen so far.
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    pub fn stored(&self) -> Option<UploadSession> {
        self.state().session.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
impl SessionPersistence for MemorySnapshot {
    fn load(&self) -> UploadSession {
        self.state().session.clone().unwrap_or_default()
    }

    fn save(&mut self, session: &UploadSession) {
        let mut state = self.state();
        state.session = Some(session.clone());
        state.writes += 1;
    }
}
