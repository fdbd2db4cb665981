//! Job scheduler: admission control and execution sequencing under a
//! fixed concurrency cap.
//!
//! A single logical scheduler coordinates many concurrently-executing
//! runners. Admission is strictly FIFO by `created_at` among pending
//! jobs — the only fairness guarantee across users sharing the
//! concurrency budget. The running-set map is the capacity accounting:
//! a job has an entry iff its persisted status is `processing`, and both
//! change together under one lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use vcast_models::{Job, JobError, JobId, JobOutput, JobPayload, JobStatus, JobType, ProgressEvent};
use vcast_store::{JobStore, StoreError};

use crate::error::{QueueError, QueueResult};
use crate::progress::{JobProgress, ProgressHub};
use crate::runner::{CancelSignal, JobRunner, RunContext};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum concurrently-executing jobs
    pub max_concurrent: usize,
    /// How long terminal jobs are kept before the retention sweep
    pub retention: Duration,
    /// How often the retention sweep runs
    pub cleanup_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            retention: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent: std::env::var("VCAST_MAX_CONCURRENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retention: Duration::from_secs(
                std::env::var("VCAST_RETENTION_HOURS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(24)
                    * 3600,
            ),
            cleanup_interval: Duration::from_secs(
                std::env::var("VCAST_CLEANUP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}

/// Queue statistics for UI display and capacity monitoring.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub max_concurrent: usize,
}

/// A pending job annotated with its 1-based FIFO queue position.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedJob {
    #[serde(flatten)]
    pub job: Job,
    pub queue_position: usize,
}

/// Jobs split for UI display: currently-executing vs waiting.
#[derive(Debug, Clone, Serialize)]
pub struct JobOverview {
    pub active: Vec<Job>,
    pub pending: Vec<QueuedJob>,
}

/// The scheduler.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<JobStore>,
    progress: Arc<ProgressHub>,
    runner: Arc<dyn JobRunner>,
    /// Abort signal per running job; map size is the running count.
    running: Mutex<HashMap<JobId, watch::Sender<bool>>>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<JobStore>,
        progress: Arc<ProgressHub>,
        runner: Arc<dyn JobRunner>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            progress,
            runner,
            running: Mutex::new(HashMap::new()),
        })
    }

    /// The configured concurrency cap.
    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    /// Accept a new job: store it as pending, then try admission once.
    ///
    /// Returns immediately; the id is usable for status and progress
    /// queries even while the job is still pending.
    pub async fn submit(
        self: &Arc<Self>,
        job_type: JobType,
        owner: impl Into<String>,
        payload: JobPayload,
    ) -> QueueResult<Job> {
        let job = self.store.create(job_type, owner, payload)?;
        info!(job_id = %job.id, job_type = job.job_type.as_str(), "Job submitted");

        self.try_admit_next().await;

        // Refetch: admission may already have moved it to processing.
        Ok(self.store.get(&job.id).unwrap_or(job))
    }

    /// Admit the oldest pending job if capacity allows.
    ///
    /// Returns true when a job was admitted.
    pub async fn try_admit_next(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().await;
        if running.len() >= self.config.max_concurrent {
            return false;
        }

        let Some(next) = self.store.oldest_pending() else {
            return false;
        };

        let job = match self.apply_update(&next.id, |j| j.start()) {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = %next.id, "Failed to admit job: {}", e);
                return false;
            }
        };

        let (abort_tx, abort_rx) = watch::channel(false);
        running.insert(job.id.clone(), abort_tx);
        drop(running);

        info!(
            job_id = %job.id,
            job_type = job.job_type.as_str(),
            "Job admitted"
        );
        self.spawn_runner(job, abort_rx);
        true
    }

    /// Admit pending jobs until capacity is full or the queue is empty.
    ///
    /// Used at startup, after restart recovery has reset interrupted
    /// jobs back to pending.
    pub async fn fill_capacity(self: &Arc<Self>) {
        while self.try_admit_next().await {}
    }

    fn spawn_runner(self: &Arc<Self>, job: Job, abort: watch::Receiver<bool>) {
        let scheduler = Arc::clone(self);
        let runner = Arc::clone(&self.runner);
        let ctx = RunContext {
            job_id: job.id.clone(),
            progress: JobProgress::new(
                job.id.clone(),
                Arc::clone(&self.progress),
                Arc::clone(&self.store),
            ),
            cancel: CancelSignal::new(abort),
        };

        tokio::spawn(async move {
            let id = job.id.clone();
            // Run in a child task so a panicking runner becomes a failed
            // job instead of a crashed process.
            let handle = tokio::spawn(async move { runner.run(job, ctx).await });
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(JobError::new(format!("job runner panicked: {}", e))),
            };
            scheduler.on_job_finished(&id, outcome).await;
        });
    }

    /// Record a runner outcome: update the job, free the slot exactly
    /// once, publish the terminal event, then try admission again.
    ///
    /// The first terminal transition is authoritative: an outcome
    /// arriving after the job was cancelled is ignored.
    pub async fn on_job_finished(self: &Arc<Self>, id: &JobId, outcome: Result<JobOutput, JobError>) {
        let freed = {
            let mut running = self.running.lock().await;
            let freed = running.remove(id).is_some();

            match self.store.get(id) {
                Some(job) if !job.is_terminal() => match outcome {
                    Ok(output) => {
                        let event = ProgressEvent::completed(output.outputs.clone());
                        if let Err(e) = self.apply_update(id, |j| j.complete(output)) {
                            error!(job_id = %id, "Failed to record completion: {}", e);
                        }
                        info!(job_id = %id, "Job completed");
                        self.progress.close(id, Some(event)).await;
                    }
                    Err(job_error) => {
                        warn!(job_id = %id, "Job failed: {}", job_error);
                        let event = ProgressEvent::error(&job_error);
                        if let Err(e) = self.apply_update(id, |j| j.fail(job_error)) {
                            error!(job_id = %id, "Failed to record failure: {}", e);
                        }
                        self.progress.close(id, Some(event)).await;
                    }
                },
                Some(_) => {
                    debug!(job_id = %id, "Ignoring late outcome for terminal job");
                }
                None => {
                    debug!(job_id = %id, "Finished job no longer exists");
                }
            }

            freed
        };

        if freed {
            self.try_admit_next().await;
        }
    }

    /// Cancel a job. Returns true when a cancellation took effect.
    ///
    /// Pending jobs cancel instantly. Processing jobs get the abort
    /// signal and are marked cancelled immediately — best-effort, the
    /// slot is freed without waiting for a slow-to-abort runner.
    /// Cancelling a terminal job is a no-op that leaves the record
    /// untouched.
    pub async fn cancel(self: &Arc<Self>, id: &JobId) -> bool {
        let mut running = self.running.lock().await;
        let Some(job) = self.store.get(id) else {
            return false;
        };

        match job.status {
            JobStatus::Pending => {
                if let Err(e) = self.apply_update(id, |j| j.cancel()) {
                    error!(job_id = %id, "Failed to cancel job: {}", e);
                    return false;
                }
                info!(job_id = %id, "Cancelled pending job");
                self.progress.close(id, None).await;
                true
            }
            JobStatus::Processing => {
                if let Some(abort) = running.remove(id) {
                    let _ = abort.send(true);
                }
                if let Err(e) = self.apply_update(id, |j| j.cancel()) {
                    error!(job_id = %id, "Failed to cancel job: {}", e);
                }
                info!(job_id = %id, "Cancelled running job, abort signalled");
                self.progress.close(id, None).await;
                drop(running);
                self.try_admit_next().await;
                true
            }
            _ => {
                debug!(job_id = %id, status = job.status.as_str(), "Cancel is a no-op");
                false
            }
        }
    }

    /// Counts of jobs by status plus the concurrency cap.
    pub fn stats(&self) -> QueueStats {
        let counts = self.store.counts();
        QueueStats {
            pending: counts.pending,
            processing: counts.processing,
            completed: counts.completed,
            failed: counts.failed,
            cancelled: counts.cancelled,
            max_concurrent: self.config.max_concurrent,
        }
    }

    /// Jobs split into active and pending subsets, each pending job
    /// annotated with its global 1-based FIFO queue position.
    pub fn overview(&self, owner: Option<&str>) -> JobOverview {
        let active = self
            .store
            .list()
            .into_iter()
            .filter(|j| j.status == JobStatus::Processing)
            .filter(|j| owner.map_or(true, |o| j.owner == o))
            .collect();

        let pending = self
            .store
            .pending_fifo()
            .into_iter()
            .enumerate()
            .filter(|(_, j)| owner.map_or(true, |o| j.owner == o))
            .map(|(i, job)| QueuedJob {
                job,
                queue_position: i + 1,
            })
            .collect();

        JobOverview { active, pending }
    }

    /// Delete terminal jobs older than the retention window.
    ///
    /// Intended to run periodically, not on a hot path. Returns the
    /// number of jobs removed.
    pub fn cleanup(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let cutoff = chrono::Utc::now() - retention;

        match self.store.delete_where(|j| {
            matches!(j.status, JobStatus::Completed | JobStatus::Failed) && j.updated_at < cutoff
        }) {
            Ok(removed) => {
                if !removed.is_empty() {
                    info!(count = removed.len(), "Retention sweep removed old jobs");
                }
                removed.len()
            }
            Err(e) => {
                warn!("Retention sweep snapshot write failed: {}", e);
                0
            }
        }
    }

    /// Spawn the periodic retention sweeper.
    pub fn spawn_retention_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.config.cleanup_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                scheduler.cleanup();
            }
        })
    }

    /// Apply a mutation, treating a failed snapshot write as non-fatal:
    /// the in-memory record stays authoritative and is returned.
    fn apply_update<F>(&self, id: &JobId, f: F) -> QueueResult<Job>
    where
        F: FnOnce(&mut Job),
    {
        match self.store.update(id, f) {
            Ok(job) => Ok(job),
            Err(e) if e.is_persist_failure() => {
                warn!(job_id = %id, "Job state held in memory only: {}", e);
                self.store
                    .get(id)
                    .ok_or_else(|| QueueError::NotFound(id.clone()))
            }
            Err(StoreError::NotFound(id)) => Err(QueueError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}
