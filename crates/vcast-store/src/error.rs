//! Store error types.

use thiserror::Error;

use vcast_models::JobId;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Snapshot write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("Snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the in-memory mutation was applied but the durable
    /// write failed. Memory stays authoritative until the next
    /// successful write.
    pub fn is_persist_failure(&self) -> bool {
        matches!(self, StoreError::Write(_) | StoreError::Serialize(_))
    }
}
