//! Turns accepted files into uploads and moves their progress along.
//!
//! There is no real transport yet: every upload gets its own thread that
//! wakes on a fixed interval, adds a random step to the record's current
//! progress and writes it back through the store. The thread ends on its own
//! once its record is terminal or gone; the driver joins finished threads in
//! [`IngestionDriver::reap`], which the render loop calls every frame.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::transfer::accepted::{human_size, AcceptedFile};
use crate::transfer::record::{UploadId, UploadStatus};
use crate::transfer::store::{lock_store, SharedStore};

/// Pacing of the simulated progress.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSettings {
    pub tick_interval: Duration,
    /// Smallest progress step per tick, in percentage points.
    pub min_step: f64,
    /// Largest progress step per tick, in percentage points.
    pub max_step: f64,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            min_step: 5.0,
            max_step: 15.0,
        }
    }
}

/// Why a progress task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    /// The record reached 100% (or was completed by someone else).
    Completed,
    /// The record was marked as failed.
    Failed,
    /// The record disappeared (removed or cleared).
    Removed,
    /// The driver cancelled the task.
    Cancelled,
}

/// One upload's progress sequence, independent of any thread so it can be
/// stepped directly.
pub struct ProgressTicker {
    id: UploadId,
    rng: fastrand::Rng,
    min_step: f64,
    max_step: f64,
}

impl ProgressTicker {
    pub fn new(id: UploadId, settings: &DriverSettings, rng: fastrand::Rng) -> Self {
        Self {
            id,
            rng,
            min_step: settings.min_step,
            max_step: settings.max_step.max(settings.min_step),
        }
    }

    /// Advance the record by one random step. Returns `Some` when the task
    /// has nothing left to do.
    pub fn tick(&mut self, store: &SharedStore) -> Option<TaskExit> {
        let mut store = lock_store(store);
        let current = match store.get(&self.id) {
            None => return Some(TaskExit::Removed),
            Some(r) if r.status.is_terminal() => {
                return Some(match r.status {
                    UploadStatus::Error => TaskExit::Failed,
                    _ => TaskExit::Completed,
                });
            }
            Some(r) => r.progress,
        };
        let next = current + self.step();
        store.update_progress(&self.id, next);
        match store.get(&self.id).map(|r| r.status) {
            Some(UploadStatus::Completed) => Some(TaskExit::Completed),
            _ => None,
        }
    }

    fn step(&mut self) -> f64 {
        self.min_step + self.rng.f64() * (self.max_step - self.min_step)
    }
}

struct ProgressTask {
    /// Dropping the sender wakes and stops the task.
    cancel: mpsc::Sender<()>,
    handle: JoinHandle<TaskExit>,
}

impl ProgressTask {
    fn stop(self) -> TaskExit {
        let ProgressTask { cancel, handle } = self;
        drop(cancel);
        join_task(handle)
    }
}

/// Linux keeps 15 bytes of a thread name, so only a prefix of the id fits.
fn thread_name(id: &UploadId) -> String {
    let id = id.as_str();
    format!("upload-{}", id.get(..8).unwrap_or(id))
}

fn join_task(handle: JoinHandle<TaskExit>) -> TaskExit {
    handle.join().unwrap_or_else(|_| {
        tracing::error!("progress task panicked");
        TaskExit::Cancelled
    })
}

pub struct IngestionDriver {
    store: SharedStore,
    settings: DriverSettings,
    tasks: HashMap<UploadId, ProgressTask>,
    rng: fastrand::Rng,
}

impl IngestionDriver {
    pub fn new(store: SharedStore, settings: DriverSettings) -> Self {
        Self::with_rng(store, settings, fastrand::Rng::new())
    }

    /// Deterministic step sizes, for tests.
    #[cfg(test)]
    pub fn with_seed(store: SharedStore, settings: DriverSettings, seed: u64) -> Self {
        Self::with_rng(store, settings, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(store: SharedStore, settings: DriverSettings, rng: fastrand::Rng) -> Self {
        Self {
            store,
            settings,
            tasks: HashMap::new(),
            rng,
        }
    }

    /// Register `file` with the store and start its progress task.
    /// Returns `None` if the store refused the id.
    pub fn accept(&mut self, file: AcceptedFile) -> Option<UploadId> {
        let id = UploadId::generate();
        let inserted = lock_store(&self.store).start_upload(
            id.clone(),
            file.name,
            human_size(file.byte_size),
            file.mime_type,
        );
        if !inserted {
            return None;
        }
        self.spawn(id.clone());
        Some(id)
    }

    /// Accept every file independently; all of them run concurrently.
    pub fn accept_all(&mut self, files: impl IntoIterator<Item = AcceptedFile>) -> Vec<UploadId> {
        files.into_iter().filter_map(|f| self.accept(f)).collect()
    }

    /// Start tasks for records that are still uploading but have no task,
    /// e.g. uploads restored from a previous run. Returns how many started.
    pub fn resume_pending(&mut self) -> usize {
        let pending: Vec<UploadId> = lock_store(&self.store)
            .uploading_ids()
            .into_iter()
            .filter(|id| !self.tasks.contains_key(id))
            .collect();
        let count = pending.len();
        for id in pending {
            tracing::info!(%id, "resuming upload");
            self.spawn(id);
        }
        count
    }

    /// Stop the task for `id` right away. The record itself is not touched.
    pub fn cancel(&mut self, id: &UploadId) -> bool {
        match self.tasks.remove(id) {
            Some(task) => {
                let exit = task.stop();
                tracing::debug!(%id, ?exit, "progress task cancelled");
                true
            }
            None => false,
        }
    }

    /// Join every task that has finished on its own.
    pub fn reap(&mut self) -> Vec<(UploadId, TaskExit)> {
        let finished: Vec<UploadId> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        let mut exits = Vec::with_capacity(finished.len());
        for id in finished {
            if let Some(task) = self.tasks.remove(&id) {
                let exit = join_task(task.handle);
                tracing::debug!(%id, ?exit, "progress task finished");
                exits.push((id, exit));
            }
        }
        exits
    }

    pub fn live_tasks(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(test)]
    pub fn is_tracking(&self, id: &UploadId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Cancel and join every task.
    pub fn shutdown(&mut self) {
        for (id, task) in self.tasks.drain() {
            let exit = task.stop();
            tracing::debug!(%id, ?exit, "progress task stopped on shutdown");
        }
    }

    fn spawn(&mut self, id: UploadId) {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let mut ticker = ProgressTicker::new(
            id.clone(),
            &self.settings,
            fastrand::Rng::with_seed(self.rng.u64(..)),
        );
        let store = SharedStore::clone(&self.store);
        let interval = self.settings.tick_interval;

        let spawned = thread::Builder::new()
            .name(thread_name(&id))
            .spawn(move || loop {
                match cancelled.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return TaskExit::Cancelled,
                }
                if let Some(exit) = ticker.tick(&store) {
                    return exit;
                }
            });

        match spawned {
            Ok(handle) => {
                self.tasks.insert(id, ProgressTask { cancel, handle });
            }
            Err(e) => {
                // Without a task the record would sit at its current progress forever.
                tracing::error!(%id, error = %e, "could not start progress task");
                lock_store(&self.store).fail_upload(&id);
            }
        }
    }
}

impl Drop for IngestionDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::snapshot::MemorySnapshot;
    use crate::transfer::store::UploadStore;
    use std::time::Instant;

    fn shared() -> SharedStore {
        UploadStore::open(MemorySnapshot::new()).into_shared()
    }

    fn fast(min_step: f64, max_step: f64) -> DriverSettings {
        DriverSettings {
            tick_interval: Duration::from_millis(1),
            min_step,
            max_step,
        }
    }

    fn status(store: &SharedStore, id: &UploadId) -> Option<(f64, UploadStatus)> {
        lock_store(store).get(id).map(|r| (r.progress, r.status))
    }

    /// Reap until no task is left, collecting exits. Panics after 5 s.
    fn drain(driver: &mut IngestionDriver) -> Vec<(UploadId, TaskExit)> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut exits = Vec::new();
        while driver.live_tasks() > 0 {
            assert!(Instant::now() < deadline, "progress tasks did not finish");
            exits.extend(driver.reap());
            thread::sleep(Duration::from_millis(2));
        }
        exits
    }

    #[test]
    fn ticker_steps_until_complete() {
        let store = shared();
        let id = UploadId::from("a");
        lock_store(&store).start_upload(id.clone(), "a.txt", "1 B", "text/plain");
        let mut ticker = ProgressTicker::new(id.clone(), &fast(30.0, 30.0), fastrand::Rng::with_seed(7));

        assert_eq!(ticker.tick(&store), None);
        assert_eq!(status(&store, &id), Some((30.0, UploadStatus::Uploading)));
        assert_eq!(ticker.tick(&store), None);
        assert_eq!(ticker.tick(&store), None);
        assert_eq!(status(&store, &id), Some((90.0, UploadStatus::Uploading)));
        assert_eq!(ticker.tick(&store), Some(TaskExit::Completed));
        assert_eq!(status(&store, &id), Some((100.0, UploadStatus::Completed)));
    }

    #[test]
    fn ticker_reads_current_progress_each_tick() {
        let store = shared();
        let id = UploadId::from("a");
        lock_store(&store).start_upload(id.clone(), "a.txt", "1 B", "text/plain");
        let mut ticker = ProgressTicker::new(id.clone(), &fast(10.0, 10.0), fastrand::Rng::with_seed(1));
        lock_store(&store).update_progress(&id, 55.0);
        assert_eq!(ticker.tick(&store), None);
        assert_eq!(status(&store, &id), Some((65.0, UploadStatus::Uploading)));
    }

    #[test]
    fn ticker_steps_stay_in_range() {
        let store = shared();
        let id = UploadId::from("a");
        lock_store(&store).start_upload(id.clone(), "a.txt", "1 B", "text/plain");
        let mut ticker = ProgressTicker::new(id.clone(), &fast(5.0, 15.0), fastrand::Rng::with_seed(42));
        let mut last = 0.0;
        while ticker.tick(&store).is_none() {
            let (progress, _) = status(&store, &id).unwrap();
            let step = progress - last;
            assert!((4.999..=15.001).contains(&step), "step {step} out of range");
            last = progress;
        }
    }

    #[test]
    fn ticker_leaves_terminal_and_missing_records_alone() {
        let store = shared();
        let failed = UploadId::from("failed");
        lock_store(&store).start_upload(failed.clone(), "f", "1 B", "");
        lock_store(&store).update_progress(&failed, 20.0);
        lock_store(&store).fail_upload(&failed);

        let settings = fast(10.0, 10.0);
        let mut ticker = ProgressTicker::new(failed.clone(), &settings, fastrand::Rng::with_seed(3));
        assert_eq!(ticker.tick(&store), Some(TaskExit::Failed));
        assert_eq!(status(&store, &failed), Some((20.0, UploadStatus::Error)));

        let mut gone = ProgressTicker::new(UploadId::from("gone"), &settings, fastrand::Rng::with_seed(3));
        assert_eq!(gone.tick(&store), Some(TaskExit::Removed));
    }

    #[test]
    fn accepted_file_is_registered_and_runs_to_completion() {
        let store = shared();
        lock_store(&store).close_widget();
        let mut driver = IngestionDriver::with_seed(SharedStore::clone(&store), fast(20.0, 40.0), 11);

        let id = driver
            .accept(AcceptedFile::new("report.pdf", 120 * 1024, "application/pdf"))
            .unwrap();
        {
            let guard = lock_store(&store);
            let record = guard.get(&id).unwrap();
            assert_eq!(record.file_name, "report.pdf");
            assert_eq!(record.size, "120.00 KB");
            assert_eq!(record.mime_type, "application/pdf");
            assert!(guard.is_widget_open());
        }

        let exits = drain(&mut driver);
        assert_eq!(exits, vec![(id.clone(), TaskExit::Completed)]);
        assert_eq!(status(&store, &id), Some((100.0, UploadStatus::Completed)));
    }

    #[test]
    fn many_files_run_independently() {
        let store = shared();
        let mut driver = IngestionDriver::with_seed(SharedStore::clone(&store), fast(5.0, 15.0), 5);
        let files = (0..6).map(|i| AcceptedFile::new(format!("f{i}.bin"), 10, "application/octet-stream"));
        let ids = driver.accept_all(files);
        assert_eq!(ids.len(), 6);
        assert_eq!(driver.live_tasks(), 6);

        let exits = drain(&mut driver);
        assert_eq!(exits.len(), 6);
        assert!(exits.iter().all(|(_, exit)| *exit == TaskExit::Completed));
        let order: Vec<String> = lock_store(&store)
            .session()
            .uploads
            .values()
            .map(|u| u.file_name.clone())
            .collect();
        assert_eq!(order, ["f0.bin", "f1.bin", "f2.bin", "f3.bin", "f4.bin", "f5.bin"]);
    }

    #[test]
    fn removed_record_releases_its_task() {
        let store = shared();
        let mut driver = IngestionDriver::with_seed(SharedStore::clone(&store), fast(0.01, 0.01), 9);
        let id = driver.accept(AcceptedFile::new("slow.iso", 1 << 30, "")).unwrap();
        lock_store(&store).remove_upload(&id);

        let exits = drain(&mut driver);
        assert_eq!(exits, vec![(id.clone(), TaskExit::Removed)]);
        assert_eq!(status(&store, &id), None);
    }

    #[test]
    fn failed_record_releases_its_task() {
        let store = shared();
        let mut driver = IngestionDriver::with_seed(SharedStore::clone(&store), fast(0.01, 0.01), 9);
        let id = driver.accept(AcceptedFile::new("slow.iso", 1 << 30, "")).unwrap();
        lock_store(&store).fail_upload(&id);

        let exits = drain(&mut driver);
        assert_eq!(exits, vec![(id.clone(), TaskExit::Failed)]);
        assert_eq!(status(&store, &id).map(|(_, s)| s), Some(UploadStatus::Error));
    }

    #[test]
    fn cancel_stops_a_sleeping_task_immediately() {
        let store = shared();
        let settings = DriverSettings {
            tick_interval: Duration::from_secs(60),
            ..DriverSettings::default()
        };
        let mut driver = IngestionDriver::with_seed(SharedStore::clone(&store), settings, 1);
        let id = driver.accept(AcceptedFile::new("a.txt", 1, "text/plain")).unwrap();
        assert!(driver.is_tracking(&id));

        let started = Instant::now();
        assert!(driver.cancel(&id));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!driver.is_tracking(&id));
        assert!(!driver.cancel(&id));
        assert_eq!(status(&store, &id), Some((0.0, UploadStatus::Uploading)));
    }

    #[test]
    fn resume_picks_up_restored_uploads() {
        let store = shared();
        let restored = UploadId::from("restored");
        let done = UploadId::from("done");
        {
            let mut guard = lock_store(&store);
            guard.start_upload(restored.clone(), "r.bin", "1 B", "");
            guard.update_progress(&restored, 40.0);
            guard.start_upload(done.clone(), "d.bin", "1 B", "");
            guard.complete_upload(&done);
        }
        let mut driver = IngestionDriver::with_seed(SharedStore::clone(&store), fast(20.0, 20.0), 2);
        assert_eq!(driver.resume_pending(), 1);
        assert_eq!(driver.resume_pending(), 0);

        let exits = drain(&mut driver);
        assert_eq!(exits, vec![(restored.clone(), TaskExit::Completed)]);
        assert_eq!(status(&store, &restored), Some((100.0, UploadStatus::Completed)));
    }

    #[test]
    fn dropping_the_driver_stops_all_tasks() {
        let store = shared();
        let settings = DriverSettings {
            tick_interval: Duration::from_secs(60),
            ..DriverSettings::default()
        };
        let mut driver = IngestionDriver::with_seed(SharedStore::clone(&store), settings, 4);
        driver.accept_all((0..3).map(|i| AcceptedFile::new(format!("{i}"), 1, "")));
        let started = Instant::now();
        drop(driver);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(lock_store(&store).uploading_ids().len(), 3);
    }

    #[test]
    fn thread_names_fit_the_platform_limit() {
        assert_eq!(thread_name(&UploadId::from("0123456789abcdef")), "upload-01234567");
        assert_eq!(thread_name(&UploadId::from("ab")), "upload-ab");
        assert!(thread_name(&UploadId::generate()).len() <= 15);
    }
}
