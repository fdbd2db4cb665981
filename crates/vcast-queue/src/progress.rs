//! Per-job progress fan-out.
//!
//! Each job gets a broadcast topic keyed by its id. Subscribers receive
//! every event emitted after they subscribe, in emission order; there is
//! no replay of earlier events. Publishing never blocks on a slow or
//! absent subscriber — lagged receivers drop events (best-effort
//! delivery). A terminal event closes the topic.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use vcast_models::{JobId, ProgressEvent};
use vcast_store::JobStore;

/// Buffered events per topic before lagged subscribers start dropping.
const TOPIC_CAPACITY: usize = 64;

/// Fan-out hub for progress events, one broadcast topic per job.
pub struct ProgressHub {
    topics: RwLock<HashMap<JobId, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a job's progress stream.
    ///
    /// The topic is created on demand, so subscribing before the job is
    /// admitted is fine. Subscribing after the topic closed yields a
    /// receiver on a fresh topic that will never fire; callers check the
    /// job record first and fall back to polling for terminal jobs.
    pub async fn subscribe(&self, job_id: &JobId) -> broadcast::Receiver<ProgressEvent> {
        let mut topics = self.topics.write().await;
        topics
            .entry(job_id.clone())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event to a job's subscribers.
    ///
    /// A missing topic or zero subscribers is not an error; the event is
    /// simply dropped.
    pub async fn publish(&self, job_id: &JobId, event: ProgressEvent) {
        let topics = self.topics.read().await;
        if let Some(tx) = topics.get(job_id) {
            if tx.send(event).is_err() {
                debug!(job_id = %job_id, "Progress event dropped, no subscribers");
            }
        }
    }

    /// Close a job's topic, optionally publishing a final terminal event
    /// first. Dropping the sender ends every subscriber's stream.
    pub async fn close(&self, job_id: &JobId, terminal: Option<ProgressEvent>) {
        let mut topics = self.topics.write().await;
        if let Some(tx) = topics.remove(job_id) {
            if let Some(event) = terminal {
                let _ = tx.send(event);
            }
        }
    }

    /// Number of open topics (for tests and diagnostics).
    pub async fn open_topics(&self) -> usize {
        self.topics.read().await.len()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress publisher scoped to one job, handed to the runner.
///
/// Mirrors the latest snapshot onto the in-memory job record so polling
/// clients see progress too.
#[derive(Clone)]
pub struct JobProgress {
    job_id: JobId,
    hub: Arc<ProgressHub>,
    store: Arc<JobStore>,
}

impl JobProgress {
    /// Create a publisher for one job. The scheduler builds these for
    /// every run; tests driving a runner directly can too.
    pub fn new(job_id: JobId, hub: Arc<ProgressHub>, store: Arc<JobStore>) -> Self {
        Self { job_id, hub, store }
    }

    /// Publish a chunk progress update.
    pub async fn progress(&self, chunk: u32, total: u32) {
        self.emit(ProgressEvent::progress(chunk, total)).await;
    }

    /// Publish a chunk progress update with a free-form message.
    pub async fn progress_with_message(&self, chunk: u32, total: u32, message: impl Into<String>) {
        self.emit(ProgressEvent::progress_with_message(chunk, total, message))
            .await;
    }

    async fn emit(&self, event: ProgressEvent) {
        if let Some(snapshot) = event.snapshot() {
            self.store.touch_progress(&self.job_id, snapshot);
        }
        self.hub.publish(&self.job_id, event).await;
    }
}
