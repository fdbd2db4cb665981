//! Job payload types and validation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobType;

/// Maximum accepted length for plain-text input.
pub const MAX_TEXT_LENGTH: usize = 50_000;

/// Default chunk size (characters) for splitting text before synthesis.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 900;

/// Output audio container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
        }
    }
}

/// Reference to a Bible passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PassageRef {
    /// Book name, e.g. "Psalms"
    pub book: String,
    /// Chapter number (1-based)
    pub chapter: u32,
    /// Verse range, e.g. "1-6"; whole chapter when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verses: Option<String>,
    /// Translation identifier
    #[serde(default = "default_translation")]
    pub translation: String,
}

fn default_translation() -> String {
    "kjv".to_string()
}

impl fmt::Display for PassageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.verses {
            Some(v) => write!(f, "{} {}:{}", self.book, self.chapter, v),
            None => write!(f, "{} {}", self.book, self.chapter),
        }
    }
}

/// Settings for video composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSettings {
    /// Background image or clip key; a solid color when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    /// Output resolution, e.g. "1920x1080"
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_resolution() -> String {
    "1920x1080".to_string()
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            background: None,
            resolution: default_resolution(),
        }
    }
}

/// Chunking parameters used when splitting text for synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkingOptions {
    /// Maximum characters per synthesis chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chars: usize,
}

fn default_max_chunk_chars() -> usize {
    DEFAULT_MAX_CHUNK_CHARS
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

/// Type-specific job input, immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobPayload {
    /// Plain text input (text_to_speech jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Passage reference (passage_to_speech / passage_to_video jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passage: Option<PassageRef>,

    /// Voice identifier
    pub voice: String,

    /// Output audio format
    #[serde(default)]
    pub audio_format: AudioFormat,

    /// Chunking parameters
    #[serde(default)]
    pub chunking: ChunkingOptions,

    /// Video composition settings (passage_to_video jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoSettings>,
}

impl JobPayload {
    /// Payload for a plain-text synthesis job.
    pub fn text(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            passage: None,
            voice: voice.into(),
            audio_format: AudioFormat::default(),
            chunking: ChunkingOptions::default(),
            video: None,
        }
    }

    /// Payload for a passage synthesis job.
    pub fn passage(passage: PassageRef, voice: impl Into<String>) -> Self {
        Self {
            text: None,
            passage: Some(passage),
            voice: voice.into(),
            audio_format: AudioFormat::default(),
            chunking: ChunkingOptions::default(),
            video: None,
        }
    }

    /// Attach video settings.
    pub fn with_video(mut self, video: VideoSettings) -> Self {
        self.video = Some(video);
        self
    }

    /// Validate the payload against the job type it was submitted with.
    ///
    /// Rejected payloads never enter the queue.
    pub fn validate(&self, job_type: JobType) -> Result<(), String> {
        if self.voice.trim().is_empty() {
            return Err("voice must not be empty".to_string());
        }
        if self.chunking.max_chars == 0 {
            return Err("chunking.max_chars must be greater than zero".to_string());
        }

        match job_type {
            JobType::TextToSpeech => {
                let text = self
                    .text
                    .as_deref()
                    .ok_or_else(|| "text is required for text_to_speech jobs".to_string())?;
                if text.trim().is_empty() {
                    return Err("text must not be empty".to_string());
                }
                if text.len() > MAX_TEXT_LENGTH {
                    return Err(format!("text exceeds {} characters", MAX_TEXT_LENGTH));
                }
            }
            JobType::PassageToSpeech | JobType::PassageToVideo => {
                let passage = self.passage.as_ref().ok_or_else(|| {
                    format!("passage is required for {} jobs", job_type.as_str())
                })?;
                if passage.book.trim().is_empty() {
                    return Err("passage.book must not be empty".to_string());
                }
                if passage.chapter == 0 {
                    return Err("passage.chapter must be 1 or greater".to_string());
                }
            }
        }

        Ok(())
    }
}
