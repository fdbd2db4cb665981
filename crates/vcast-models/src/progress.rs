//! Progress event types streamed to subscribers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobError, OutputFile};

/// Last-known progress of a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressSnapshot {
    /// Current chunk (1-based)
    pub chunk: u32,
    /// Total chunks
    pub total: u32,
}

impl ProgressSnapshot {
    pub fn new(chunk: u32, total: u32) -> Self {
        Self { chunk, total }
    }
}

/// One event on a job's progress stream.
///
/// `completed` and `error` are terminal: they end the stream. Subscribers
/// that connect after a terminal event observe nothing and fall back to
/// polling the job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Incremental progress during multi-chunk work
    Progress {
        chunk: u32,
        total: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Terminal: the job finished successfully
    Completed { outputs: Vec<OutputFile> },

    /// Terminal: the job failed
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        troubleshooting: Vec<String>,
    },
}

impl ProgressEvent {
    /// Create a progress event.
    pub fn progress(chunk: u32, total: u32) -> Self {
        ProgressEvent::Progress {
            chunk,
            total,
            message: None,
        }
    }

    /// Create a progress event with a free-form message.
    pub fn progress_with_message(chunk: u32, total: u32, message: impl Into<String>) -> Self {
        ProgressEvent::Progress {
            chunk,
            total,
            message: Some(message.into()),
        }
    }

    /// Create a terminal completion event.
    pub fn completed(outputs: Vec<OutputFile>) -> Self {
        ProgressEvent::Completed { outputs }
    }

    /// Create a terminal error event.
    pub fn error(error: &JobError) -> Self {
        ProgressEvent::Error {
            error: error.message.clone(),
            troubleshooting: error.troubleshooting.clone(),
        }
    }

    /// Check if this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Error { .. }
        )
    }

    /// Snapshot for the job record, if this is a progress event.
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        match self {
            ProgressEvent::Progress { chunk, total, .. } => {
                Some(ProgressSnapshot::new(*chunk, *total))
            }
            _ => None,
        }
    }
}
