use std::sync::{Arc, Mutex, MutexGuard};

use crate::transfer::record::{UploadId, UploadRecord, UploadSession, UploadStatus};
use crate::transfer::snapshot::SessionPersistence;

/// The single owner of the upload session.
///
/// Every mutating call first computes the transition on the in-memory session
/// and then writes the whole session through to persistence exactly once,
/// even when the transition turned out to be a no-op.
pub struct UploadStore {
    session: UploadSession,
    persistence: Box<dyn SessionPersistence>,
}

/// The store as shared between the render loop and the progress tasks.
/// Holding the lock for a whole operation serializes all mutations.
pub type SharedStore = Arc<Mutex<UploadStore>>;

/// Lock the shared store. A panic in another holder does not leave the
/// session half-written (every transition is applied in one step), so a
/// poisoned lock is still safe to use.
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, UploadStore> {
    store.lock().unwrap_or_else(|e| e.into_inner())
}

impl UploadStore {
    /// Restore the session from `persistence` (or start empty).
    pub fn open(persistence: impl SessionPersistence + 'static) -> Self {
        let session = persistence.load();
        Self {
            session,
            persistence: Box::new(persistence),
        }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn get(&self, id: &UploadId) -> Option<&UploadRecord> {
        self.session.uploads.get(id)
    }

    pub fn is_widget_open(&self) -> bool {
        self.session.is_widget_open
    }

    pub fn is_widget_minimized(&self) -> bool {
        self.session.is_widget_minimized
    }

    /// Ids of records still uploading, in start order.
    pub fn uploading_ids(&self) -> Vec<UploadId> {
        self.session
            .uploads
            .values()
            .filter(|u| u.is_uploading())
            .map(|u| u.id.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Register a new upload and surface the tray, expanded.
    /// Returns `false` when `id` is already known; the existing record and
    /// the tray flags are left alone.
    pub fn start_upload(
        &mut self,
        id: UploadId,
        file_name: impl Into<String>,
        size: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> bool {
        let inserted = if self.session.uploads.contains_key(&id) {
            tracing::warn!(%id, "ignoring start for an id that is already tracked");
            false
        } else {
            let record = UploadRecord::new(id.clone(), file_name.into(), size.into(), mime_type.into());
            tracing::info!(%id, file = %record.file_name, size = %record.size, "upload started");
            self.session.uploads.insert(id, record);
            self.session.is_widget_open = true;
            self.session.is_widget_minimized = false;
            true
        };
        self.persist();
        inserted
    }

    /// Move an uploading record forward. Values are clamped to `0..=100` and
    /// never move progress backwards; reaching 100 completes the record in
    /// the same step. Absent or terminal records are left untouched.
    pub fn update_progress(&mut self, id: &UploadId, progress: f64) {
        if let Some(record) = self.session.uploads.get_mut(id) {
            if record.is_uploading() && progress.is_finite() {
                let clamped = progress.clamp(0.0, 100.0);
                record.progress = record.progress.max(clamped);
                if record.progress >= 100.0 {
                    record.progress = 100.0;
                    record.status = UploadStatus::Completed;
                    tracing::info!(%id, "upload completed");
                }
            }
        }
        self.persist();
    }

    /// Force a record to completed at 100%. Idempotent. A failed record stays
    /// failed.
    pub fn complete_upload(&mut self, id: &UploadId) {
        if let Some(record) = self.session.uploads.get_mut(id) {
            // Error is terminal as well; a failed upload is never completed.
            if record.status != UploadStatus::Error {
                if record.is_uploading() {
                    tracing::info!(%id, "upload completed");
                }
                record.progress = 100.0;
                record.status = UploadStatus::Completed;
            }
        }
        self.persist();
    }

    /// Mark an uploading record as failed, keeping its partial progress.
    pub fn fail_upload(&mut self, id: &UploadId) {
        if let Some(record) = self.session.uploads.get_mut(id) {
            if record.is_uploading() {
                record.status = UploadStatus::Error;
                tracing::warn!(%id, progress = record.progress, "upload failed");
            }
        }
        self.persist();
    }

    pub fn set_widget_minimized(&mut self, minimized: bool) {
        self.session.is_widget_minimized = minimized;
        self.persist();
    }

    /// Hide the tray. Uploads keep running in the background.
    pub fn close_widget(&mut self) {
        self.session.is_widget_open = false;
        self.persist();
    }

    /// Drop a single record whatever its status.
    pub fn remove_upload(&mut self, id: &UploadId) {
        if self.session.uploads.shift_remove(id).is_some() {
            tracing::debug!(%id, "upload removed");
        }
        self.persist();
    }

    /// Drop every completed or failed record; uploading ones keep their order.
    pub fn clear_completed(&mut self) {
        let before = self.session.uploads.len();
        self.session.uploads.retain(|_, u| u.is_uploading());
        tracing::debug!(removed = before - self.session.uploads.len(), "cleared finished uploads");
        self.persist();
    }

    fn persist(&mut self) {
        self.persistence.save(&self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::snapshot::MemorySnapshot;
    use proptest::prelude::*;

    fn store() -> (UploadStore, MemorySnapshot) {
        let memory = MemorySnapshot::new();
        (UploadStore::open(memory.clone()), memory)
    }

    fn id(s: &str) -> UploadId {
        UploadId::from(s)
    }

    fn start(store: &mut UploadStore, s: &str) {
        assert!(store.start_upload(id(s), format!("{s}.txt"), "1.00 KB", "text/plain"));
    }

    fn status_of(store: &UploadStore, s: &str) -> (f64, UploadStatus) {
        let r = store.get(&id(s)).unwrap();
        (r.progress, r.status)
    }

    #[test]
    fn report_scenario() {
        let (mut store, _) = store();
        store.start_upload(id("a"), "report.pdf", "120 KB", "application/pdf");
        store.update_progress(&id("a"), 40.0);
        assert_eq!(status_of(&store, "a"), (40.0, UploadStatus::Uploading));
        store.update_progress(&id("a"), 120.0);
        assert_eq!(status_of(&store, "a"), (100.0, UploadStatus::Completed));
        let record = store.get(&id("a")).unwrap();
        assert_eq!(record.file_name, "report.pdf");
        assert_eq!(record.size, "120 KB");
    }

    #[test]
    fn failure_of_one_upload_leaves_the_other_alone() {
        let (mut store, _) = store();
        start(&mut store, "a");
        start(&mut store, "b");
        store.update_progress(&id("a"), 33.0);
        store.fail_upload(&id("a"));
        store.update_progress(&id("b"), 100.0);
        assert_eq!(status_of(&store, "a"), (33.0, UploadStatus::Error));
        assert_eq!(status_of(&store, "b"), (100.0, UploadStatus::Completed));
    }

    #[test]
    fn closed_tray_does_not_stop_uploads() {
        let (mut store, _) = store();
        start(&mut store, "a");
        store.close_widget();
        assert!(!store.is_widget_open());
        assert_eq!(status_of(&store, "a"), (0.0, UploadStatus::Uploading));
        store.update_progress(&id("a"), 100.0);
        assert_eq!(status_of(&store, "a"), (100.0, UploadStatus::Completed));
        assert!(!store.is_widget_open());
    }

    #[test]
    fn start_always_surfaces_the_tray() {
        let (mut store, _) = store();
        start(&mut store, "a");
        store.set_widget_minimized(true);
        store.close_widget();
        start(&mut store, "b");
        assert!(store.is_widget_open());
        assert!(!store.is_widget_minimized());
    }

    #[test]
    fn duplicate_start_keeps_existing_record() {
        let (mut store, memory) = store();
        start(&mut store, "a");
        store.update_progress(&id("a"), 50.0);
        store.set_widget_minimized(true);
        store.close_widget();
        let writes = memory.writes();

        assert!(!store.start_upload(id("a"), "other.bin", "9 GB", "application/zip"));
        let record = store.get(&id("a")).unwrap();
        assert_eq!(record.file_name, "a.txt");
        assert_eq!(record.progress, 50.0);
        assert_eq!(store.session().uploads.len(), 1);
        // A closed tray stays closed.
        assert!(!store.is_widget_open());
        assert!(store.is_widget_minimized());
        assert_eq!(memory.writes(), writes + 1);
    }

    #[test]
    fn terminal_records_ignore_progress() {
        let (mut store, _) = store();
        start(&mut store, "done");
        start(&mut store, "failed");
        store.complete_upload(&id("done"));
        store.update_progress(&id("failed"), 20.0);
        store.fail_upload(&id("failed"));

        store.update_progress(&id("done"), 10.0);
        store.update_progress(&id("failed"), 90.0);
        store.update_progress(&id("failed"), 100.0);
        assert_eq!(status_of(&store, "done"), (100.0, UploadStatus::Completed));
        assert_eq!(status_of(&store, "failed"), (20.0, UploadStatus::Error));
    }

    #[test]
    fn progress_is_clamped_and_never_moves_back() {
        let (mut store, _) = store();
        start(&mut store, "a");
        store.update_progress(&id("a"), -5.0);
        assert_eq!(status_of(&store, "a"), (0.0, UploadStatus::Uploading));
        store.update_progress(&id("a"), 60.0);
        store.update_progress(&id("a"), 30.0);
        assert_eq!(status_of(&store, "a"), (60.0, UploadStatus::Uploading));
        store.update_progress(&id("a"), f64::NAN);
        assert_eq!(status_of(&store, "a"), (60.0, UploadStatus::Uploading));
    }

    #[test]
    fn complete_forces_full_progress_but_not_over_failure() {
        let (mut store, _) = store();
        start(&mut store, "a");
        start(&mut store, "b");
        store.update_progress(&id("a"), 12.0);
        store.complete_upload(&id("a"));
        store.complete_upload(&id("a"));
        assert_eq!(status_of(&store, "a"), (100.0, UploadStatus::Completed));

        store.fail_upload(&id("b"));
        store.complete_upload(&id("b"));
        assert_eq!(status_of(&store, "b"), (0.0, UploadStatus::Error));
    }

    #[test]
    fn fail_does_not_touch_completed_records() {
        let (mut store, _) = store();
        start(&mut store, "a");
        store.update_progress(&id("a"), 100.0);
        store.fail_upload(&id("a"));
        assert_eq!(status_of(&store, "a"), (100.0, UploadStatus::Completed));
    }

    #[test]
    fn remove_deletes_regardless_of_status() {
        let (mut store, _) = store();
        start(&mut store, "a");
        start(&mut store, "b");
        store.remove_upload(&id("a"));
        store.complete_upload(&id("b"));
        store.remove_upload(&id("b"));
        store.remove_upload(&id("missing"));
        assert!(store.session().uploads.is_empty());
        // Late ticks for removed ids are harmless.
        store.update_progress(&id("a"), 50.0);
        assert!(store.get(&id("a")).is_none());
    }

    #[test]
    fn clear_completed_keeps_only_uploading_in_order() {
        let (mut store, _) = store();
        for s in ["a", "b", "c", "d", "e"] {
            start(&mut store, s);
        }
        store.update_progress(&id("a"), 100.0);
        store.update_progress(&id("c"), 45.0);
        store.fail_upload(&id("d"));
        store.update_progress(&id("e"), 70.0);
        let before_c = store.get(&id("c")).cloned();

        store.clear_completed();
        let left: Vec<&str> = store.session().uploads.keys().map(|k| k.as_str()).collect();
        assert_eq!(left, ["b", "c", "e"]);
        assert_eq!(store.get(&id("c")).cloned(), before_c);
    }

    #[test]
    fn every_operation_writes_exactly_once() {
        let (mut store, memory) = store();
        let mut expected = 0;
        let mut check = |store: &UploadStore| {
            expected += 1;
            assert_eq!(memory.writes(), expected);
            assert_eq!(memory.stored().as_ref(), Some(store.session()));
        };

        store.start_upload(id("a"), "a", "1 B", "");
        check(&store);
        store.start_upload(id("a"), "a", "1 B", "");
        check(&store);
        store.update_progress(&id("a"), 10.0);
        check(&store);
        store.update_progress(&id("missing"), 10.0);
        check(&store);
        store.fail_upload(&id("a"));
        check(&store);
        store.complete_upload(&id("a"));
        check(&store);
        store.set_widget_minimized(true);
        check(&store);
        store.close_widget();
        check(&store);
        store.remove_upload(&id("a"));
        check(&store);
        store.clear_completed();
        check(&store);
    }

    #[test]
    fn reopening_restores_written_state() {
        let memory = MemorySnapshot::new();
        {
            let mut store = UploadStore::open(memory.clone());
            store.start_upload(id("a"), "a.txt", "1 B", "text/plain");
            store.update_progress(&id("a"), 25.0);
            store.set_widget_minimized(true);
        }
        let store = UploadStore::open(memory);
        assert_eq!(status_of(&store, "a"), (25.0, UploadStatus::Uploading));
        assert!(store.is_widget_open());
        assert!(store.is_widget_minimized());
        assert_eq!(store.uploading_ids(), vec![id("a")]);
    }

    proptest! {
        #[test]
        fn increasing_updates_complete_exactly_at_100(
            mut steps in prop::collection::vec(0.0f64..150.0, 1..40)
        ) {
            steps.sort_by(|a, b| a.total_cmp(b));
            let (mut store, _) = store();
            start(&mut store, "a");
            let mut last = 0.0;
            for p in steps {
                let was_uploading = store.get(&id("a")).unwrap().is_uploading();
                store.update_progress(&id("a"), p);
                let (progress, status) = status_of(&store, "a");
                prop_assert!(progress >= last);
                prop_assert!(progress <= 100.0);
                if was_uploading {
                    prop_assert_eq!(status == UploadStatus::Completed, p >= 100.0);
                }
                if status == UploadStatus::Uploading {
                    prop_assert!(progress < 100.0);
                } else {
                    prop_assert_eq!(progress, 100.0);
                }
                last = progress;
            }
        }
    }
}
