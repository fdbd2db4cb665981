//! Queue error types.

use thiserror::Error;

use vcast_models::JobId;
use vcast_store::StoreError;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
