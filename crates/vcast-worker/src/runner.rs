//! The synthesis job runner.
//!
//! One opaque long-running operation per job: resolve the text, split it
//! into chunks, synthesize chunk by chunk with progress events, stitch,
//! and optionally compose video. The abort signal is checked between
//! chunks — a backend call already in flight runs to completion. A
//! failure partway through fails the whole job; there is no resume.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use vcast_models::{Job, JobError, JobOutput, OutputFile};
use vcast_queue::{JobRunner, RunContext};

use crate::backend::{PassageSource, SynthesisBackend};
use crate::chunk::split_text;

/// Runner for all three job types.
pub struct SynthesisRunner {
    source: Arc<dyn PassageSource>,
    backend: Arc<dyn SynthesisBackend>,
}

impl SynthesisRunner {
    pub fn new(source: Arc<dyn PassageSource>, backend: Arc<dyn SynthesisBackend>) -> Self {
        Self { source, backend }
    }

    async fn resolve_text(&self, job: &Job) -> Result<String, JobError> {
        if let Some(text) = &job.payload.text {
            return Ok(text.clone());
        }
        if let Some(passage) = &job.payload.passage {
            debug!(job_id = %job.id, passage = %passage, "Fetching passage text");
            return self.source.fetch(passage).await.map_err(with_hints);
        }
        Err(JobError::new("job payload has neither text nor a passage"))
    }
}

#[async_trait]
impl JobRunner for SynthesisRunner {
    async fn run(&self, job: Job, ctx: RunContext) -> Result<JobOutput, JobError> {
        let text = self.resolve_text(&job).await?;
        let chunks = split_text(&text, job.payload.chunking.max_chars);
        if chunks.is_empty() {
            return Err(JobError::new("no synthesizable text in payload"));
        }

        let total = chunks.len() as u32;
        let format = job.payload.audio_format;
        info!(job_id = %job.id, chunks = total, "Starting synthesis");

        let mut parts = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                debug!(job_id = %job.id, "Abort signalled, stopping between chunks");
                return Err(JobError::new("job cancelled"));
            }

            let n = i as u32 + 1;
            ctx.progress
                .progress_with_message(n, total, format!("Synthesizing chunk {} of {}", n, total))
                .await;

            let part = self
                .backend
                .synthesize(chunk, &job.payload.voice, format)
                .await
                .map_err(with_hints)?;
            parts.push(part);
        }

        if ctx.cancel.is_cancelled() {
            return Err(JobError::new("job cancelled"));
        }

        let audio = if parts.len() == 1 {
            parts.remove(0)
        } else {
            self.backend
                .stitch(&parts, format)
                .await
                .map_err(with_hints)?
        };

        let mut outputs = vec![OutputFile::audio(audio.display().to_string())];

        if job.job_type.produces_video() {
            let settings = job.payload.video.clone().unwrap_or_default();
            let video = self
                .backend
                .compose_video(&audio, &settings)
                .await
                .map_err(with_hints)?;
            outputs.push(OutputFile::video(video.display().to_string()));
        }

        Ok(JobOutput::new(outputs))
    }
}

/// Attach remediation hints for recognizable failure causes.
///
/// Errors that already carry hints pass through untouched.
fn with_hints(mut err: JobError) -> JobError {
    if !err.troubleshooting.is_empty() {
        return err;
    }

    let msg = err.message.to_lowercase();

    if msg.contains("unreachable") || msg.contains("connection") || msg.contains("timed out") {
        err.troubleshooting = vec![
            "Check that the speech synthesis service is running".to_string(),
            "Verify network connectivity to the backend".to_string(),
        ];
    } else if msg.contains("voice") {
        err.troubleshooting = vec![
            "Check the voice id against the list of installed voices".to_string(),
        ];
    } else if msg.contains("ffmpeg") || msg.contains("not found") {
        err.troubleshooting = vec![
            "Ensure ffmpeg is installed and on the PATH".to_string(),
        ];
    } else if msg.contains("background") {
        err.troubleshooting = vec![
            "Check that the background asset exists and is a supported format".to_string(),
        ];
    }

    err
}
