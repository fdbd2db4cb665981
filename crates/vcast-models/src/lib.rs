//! Shared data models for the VerseCast backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job records and lifecycle state
//! - Job payloads (text, passage, voice, video settings)
//! - Progress event schemas

pub mod job;
pub mod payload;
pub mod progress;

// Re-export common types
pub use job::{Job, JobError, JobId, JobOutput, JobStatus, JobType, MediaKind, OutputFile};
pub use payload::{
    AudioFormat, ChunkingOptions, JobPayload, PassageRef, VideoSettings, DEFAULT_MAX_CHUNK_CHARS,
    MAX_TEXT_LENGTH,
};
pub use progress::{ProgressEvent, ProgressSnapshot};
