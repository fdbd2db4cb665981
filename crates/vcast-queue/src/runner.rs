//! Job runner boundary.
//!
//! The queue treats a runner as one opaque async operation: it either
//! produces output file references or a typed failure. Runners report
//! intermediate progress through the context and poll the cancel signal
//! between checkpoints — there is no hard preemption.

use async_trait::async_trait;
use tokio::sync::watch;

use vcast_models::{Job, JobError, JobId, JobOutput};

use crate::progress::JobProgress;

/// Cooperative cancellation signal.
///
/// The scheduler fires it when the job is cancelled; a runner that
/// ignores it keeps consuming resources until it finishes naturally,
/// but its slot has already been freed.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Wrap a watch receiver. The scheduler owns the sender; tests
    /// driving a runner directly can hold their own.
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires, for driving a runner outside the
    /// scheduler (tests, one-off tools).
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check for cancellation without waiting.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is signalled.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender dropped without cancelling; never resolve.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Everything a runner needs to execute one job.
pub struct RunContext {
    pub job_id: JobId,
    pub progress: JobProgress,
    pub cancel: CancelSignal,
}

/// The opaque executor that performs a job's actual synthesis work.
///
/// Implementations emit progress events through `ctx.progress` and check
/// `ctx.cancel` between chunks. Errors are returned as data; the
/// scheduler converts them into a terminal `failed` record.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: Job, ctx: RunContext) -> Result<JobOutput, JobError>;
}
