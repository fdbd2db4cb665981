//! Job record and lifecycle state.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::payload::JobPayload;
use crate::progress::ProgressSnapshot;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Arbitrary text to speech audio
    TextToSpeech,
    /// Bible passage to speech audio
    PassageToSpeech,
    /// Bible passage to narrated video
    PassageToVideo,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::TextToSpeech => "text_to_speech",
            JobType::PassageToSpeech => "passage_to_speech",
            JobType::PassageToVideo => "passage_to_video",
        }
    }

    /// Whether the output includes a video track.
    pub fn produces_video(&self) -> bool {
        matches!(self, JobType::PassageToVideo)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a free concurrency slot
    #[default]
    Pending,
    /// Admitted and running
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled by the user
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Reference to one output artifact produced by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputFile {
    pub kind: MediaKind,
    /// Path or storage key of the artifact
    pub path: String,
}

impl OutputFile {
    pub fn audio(path: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Audio,
            path: path.into(),
        }
    }

    pub fn video(path: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Video,
            path: path.into(),
        }
    }
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobOutput {
    pub outputs: Vec<OutputFile>,
}

impl JobOutput {
    pub fn new(outputs: Vec<OutputFile>) -> Self {
        Self { outputs }
    }
}

/// Terminal failure attached to a job, with optional remediation hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub message: String,
    /// Human-readable troubleshooting steps, if the cause is recognizable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub troubleshooting: Vec<String>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            troubleshooting: Vec::new(),
        }
    }

    pub fn with_hints(message: impl Into<String>, hints: Vec<String>) -> Self {
        Self {
            message: message.into(),
            troubleshooting: hints,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// One unit of user-requested work.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID, never reused
    pub id: JobId,

    /// Kind of work
    pub job_type: JobType,

    /// Identifier of the submitting user
    pub owner: String,

    /// Type-specific input, immutable once accepted
    pub payload: JobPayload,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,

    /// Set on transition to processing, cleared by restart recovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Output artifacts on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutput>,

    /// Failure details, set only when status is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Last known progress, ephemeral (not persisted)
    #[serde(skip)]
    pub progress: Option<ProgressSnapshot>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(job_type: JobType, owner: impl Into<String>, payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type,
            owner: owner.into(),
            payload,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            result: None,
            error: None,
            progress: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the job as admitted for execution.
    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Mark the job as completed with its outputs.
    pub fn complete(&mut self, output: JobOutput) {
        self.status = JobStatus::Completed;
        self.result = Some(output);
        self.updated_at = Utc::now();
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: JobError) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }

    /// Mark the job as cancelled. Cancelled jobs carry no error payload.
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.updated_at = Utc::now();
    }

    /// Record the latest progress snapshot.
    pub fn set_progress(&mut self, snapshot: ProgressSnapshot) {
        self.progress = Some(snapshot);
        self.updated_at = Utc::now();
    }

    /// Reset an interrupted job back to pending.
    ///
    /// A `processing` status surviving a restart means the prior runner
    /// attempt was lost; in-flight work restarts from scratch.
    pub fn reset_interrupted(&mut self) {
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.updated_at = Utc::now();
    }
}
