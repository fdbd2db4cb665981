//! Persistent job store.
//!
//! The full job set is written through to a single JSON snapshot file on
//! every mutating operation. On startup the snapshot is reloaded and any
//! job stuck in `processing` is reset to `pending` — a processing status
//! surviving a restart means the prior runner attempt was lost.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{info, warn};

use vcast_models::{Job, JobId, JobPayload, JobStatus, JobType, ProgressSnapshot};

use crate::error::{StoreError, StoreResult};

/// Per-status job counts, for stats and capacity monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Durable store of all job records.
///
/// Constructed once at process start; shared by handle. All mutations are
/// write-through: the in-memory map is updated, then the whole set is
/// snapshotted to disk. A failed write is surfaced to the caller but the
/// in-memory state stands.
pub struct JobStore {
    path: PathBuf,
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    /// Open the store, loading any existing snapshot.
    ///
    /// A missing, corrupt, or unreadable snapshot loads as an empty store,
    /// never a fatal error. Jobs found in `processing` are reset to
    /// `pending` with `started_at` cleared.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut jobs = Self::load_snapshot(&path);

        let mut recovered = 0usize;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Processing {
                job.reset_interrupted();
                recovered += 1;
            }
        }

        let store = Self {
            path,
            jobs: RwLock::new(jobs),
        };

        if recovered > 0 {
            info!(recovered, "Reset interrupted jobs to pending");
            // Persist the recovery so a crash before the first mutation
            // doesn't re-run it against stale state.
            if let Err(e) = store.persist() {
                warn!("Failed to persist recovery snapshot: {}", e);
            }
        }

        store
    }

    fn load_snapshot(path: &Path) -> HashMap<JobId, Job> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No job snapshot found, starting empty");
                return HashMap::new();
            }
            Err(e) => {
                warn!(path = %path.display(), "Unreadable job snapshot, starting empty: {}", e);
                return HashMap::new();
            }
        };

        match serde_json::from_str::<Vec<Job>>(&raw) {
            Ok(jobs) => {
                info!(count = jobs.len(), "Loaded job snapshot");
                jobs.into_iter().map(|j| (j.id.clone(), j)).collect()
            }
            Err(e) => {
                warn!(path = %path.display(), "Corrupt job snapshot, starting empty: {}", e);
                HashMap::new()
            }
        }
    }

    /// Snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a new pending job and persist it.
    ///
    /// On a failed snapshot write the record still stands in memory and
    /// the error is returned; the next successful write picks it up.
    pub fn create(
        &self,
        job_type: JobType,
        owner: impl Into<String>,
        payload: JobPayload,
    ) -> StoreResult<Job> {
        let job = Job::new(job_type, owner, payload);
        {
            let mut jobs = self.jobs.write().unwrap();
            jobs.insert(job.id.clone(), job.clone());
        }
        self.persist()?;
        Ok(job)
    }

    /// Get a job by id.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().unwrap().get(id).cloned()
    }

    /// All jobs, newest `created_at` first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().unwrap().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Pending jobs in strict FIFO order (oldest `created_at` first).
    pub fn pending_fifo(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .unwrap()
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    /// The oldest pending job, if any.
    pub fn oldest_pending(&self) -> Option<Job> {
        self.jobs
            .read()
            .unwrap()
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned()
    }

    /// Mutate a job through `f`, bump `updated_at`, and persist.
    ///
    /// The mutation is applied in memory even when the snapshot write
    /// fails; the error reports the failed write only.
    pub fn update<F>(&self, id: &JobId, f: F) -> StoreResult<Job>
    where
        F: FnOnce(&mut Job),
    {
        let job = {
            let mut jobs = self.jobs.write().unwrap();
            let job = jobs.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
            job.updated_at = chrono::Utc::now();
            f(job);
            job.clone()
        };
        self.persist()?;
        Ok(job)
    }

    /// Record the latest progress snapshot in memory only.
    ///
    /// Progress is ephemeral and excluded from the durable snapshot, so
    /// this never triggers a disk write. Unknown ids are ignored.
    pub fn touch_progress(&self, id: &JobId, snapshot: ProgressSnapshot) {
        if let Some(job) = self.jobs.write().unwrap().get_mut(id) {
            job.set_progress(snapshot);
        }
    }

    /// Remove a job, persist, and report whether it existed.
    pub fn delete(&self, id: &JobId) -> StoreResult<bool> {
        let existed = self.jobs.write().unwrap().remove(id).is_some();
        if existed {
            self.persist()?;
        }
        Ok(existed)
    }

    /// Remove every job matched by the predicate. Returns the removed ids.
    pub fn delete_where<F>(&self, pred: F) -> StoreResult<Vec<JobId>>
    where
        F: Fn(&Job) -> bool,
    {
        let removed: Vec<JobId> = {
            let mut jobs = self.jobs.write().unwrap();
            let ids: Vec<JobId> = jobs
                .values()
                .filter(|j| pred(j))
                .map(|j| j.id.clone())
                .collect();
            for id in &ids {
                jobs.remove(id);
            }
            ids
        };
        if !removed.is_empty() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Per-status counts.
    pub fn counts(&self) -> StatusCounts {
        let jobs = self.jobs.read().unwrap();
        let mut counts = StatusCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Write the full job set to the snapshot file.
    ///
    /// The snapshot is written to a temp file and renamed into place so a
    /// crash mid-write never leaves a truncated snapshot behind.
    fn persist(&self) -> StoreResult<()> {
        let jobs: Vec<Job> = {
            let mut jobs: Vec<Job> = self.jobs.read().unwrap().values().cloned().collect();
            jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            jobs
        };

        let json = serde_json::to_string_pretty(&jobs)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(StoreError::Write)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(StoreError::Write)?;
        fs::rename(&tmp, &self.path).map_err(StoreError::Write)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vcast_models::{JobError, JobOutput, OutputFile};

    fn payload() -> JobPayload {
        JobPayload::text("Let there be light", "en-grace")
    }

    #[test]
    fn test_create_and_get() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json"));

        let job = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
        let fetched = store.get(&job.id).unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);

        assert!(store.get(&JobId::from_string("missing")).is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json"));

        let a = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();

        let listed = store.list();
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }

    #[test]
    fn test_pending_fifo_order() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json"));

        let a = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = store.create(JobType::TextToSpeech, "bob", payload()).unwrap();

        assert_eq!(store.oldest_pending().unwrap().id, a.id);

        store.update(&a.id, |j| j.start()).unwrap();
        assert_eq!(store.oldest_pending().unwrap().id, b.id);
    }

    #[test]
    fn test_update_bumps_updated_at_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let store = JobStore::open(&path);

        let job = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
        let before = job.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));

        store
            .update(&job.id, |j| {
                j.complete(JobOutput::new(vec![OutputFile::audio("out/a.mp3")]))
            })
            .unwrap();

        // Reload from disk: the last update must survive.
        let reloaded = JobStore::open(&path);
        let fetched = reloaded.get(&job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert!(fetched.updated_at > before);
        assert_eq!(fetched.result.unwrap().outputs[0].path, "out/a.mp3");
    }

    #[test]
    fn test_update_unknown_id() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json"));

        let err = store
            .update(&JobId::from_string("missing"), |j| j.cancel())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json"));

        let job = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
        assert!(store.delete(&job.id).unwrap());
        assert!(!store.delete(&job.id).unwrap());
        assert!(store.get(&job.id).is_none());
    }

    #[test]
    fn test_restart_recovery_resets_processing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let id = {
            let store = JobStore::open(&path);
            let job = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
            store.update(&job.id, |j| j.start()).unwrap();
            job.id
        };

        let reloaded = JobStore::open(&path);
        let job = reloaded.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_terminal_jobs_survive_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let id = {
            let store = JobStore::open(&path);
            let job = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
            store
                .update(&job.id, |j| j.fail(JobError::new("backend unreachable")))
                .unwrap();
            job.id
        };

        let reloaded = JobStore::open(&path);
        let job = reloaded.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().message, "backend unreachable");
    }

    #[test]
    fn test_corrupt_snapshot_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        fs::write(&path, "{not json!").unwrap();

        let store = JobStore::open(&path);
        assert!(store.list().is_empty());

        // The store stays usable after recovery.
        let job = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
        assert!(store.get(&job.id).is_some());
    }

    #[test]
    fn test_create_surfaces_failed_snapshot_write() {
        let dir = tempdir().unwrap();
        // A regular file where the snapshot's parent directory should be
        // makes every persist fail.
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "x").unwrap();
        let store = JobStore::open(blocker.join("jobs.json"));

        let err = store
            .create(JobType::TextToSpeech, "alice", payload())
            .unwrap_err();
        assert!(err.is_persist_failure());
        // The record still stands in memory.
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_counts() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json"));

        let a = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
        let _b = store.create(JobType::TextToSpeech, "bob", payload()).unwrap();
        store.update(&a.id, |j| j.start()).unwrap();

        let counts = store.counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.completed, 0);
    }

    #[test]
    fn test_delete_where() {
        let dir = tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json"));

        let a = store.create(JobType::TextToSpeech, "alice", payload()).unwrap();
        let b = store.create(JobType::TextToSpeech, "bob", payload()).unwrap();
        store
            .update(&a.id, |j| j.complete(JobOutput::default()))
            .unwrap();

        let removed = store
            .delete_where(|j| j.status == JobStatus::Completed)
            .unwrap();
        assert_eq!(removed, vec![a.id]);
        assert!(store.get(&b.id).is_some());
    }
}
