//! External collaborator boundaries.
//!
//! Bible text retrieval and the actual synthesis/compositing tools are
//! opaque to the queue: they take text/files and return files or fail.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use vcast_models::{AudioFormat, JobError, PassageRef, VideoSettings};

/// Source of Bible passage text.
#[async_trait]
pub trait PassageSource: Send + Sync + 'static {
    /// Fetch the cleaned-up text of a passage.
    async fn fetch(&self, passage: &PassageRef) -> Result<String, JobError>;
}

/// Speech synthesis and media assembly backend.
#[async_trait]
pub trait SynthesisBackend: Send + Sync + 'static {
    /// Synthesize one chunk of text into an audio file.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: AudioFormat,
    ) -> Result<PathBuf, JobError>;

    /// Stitch chunk files into one audio file, in order.
    async fn stitch(&self, parts: &[PathBuf], format: AudioFormat) -> Result<PathBuf, JobError>;

    /// Composite an audio track into a narrated video.
    async fn compose_video(
        &self,
        audio: &Path,
        settings: &VideoSettings,
    ) -> Result<PathBuf, JobError>;
}
