//! Local synthesis backend and passage source.
//!
//! `LocalSynthesis` shells out to `espeak-ng` for speech and `ffmpeg`
//! for format conversion, stitching and video composition.
//! `FilePassageSource` serves passage text from per-translation JSON
//! files on disk, one file per book.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use vcast_models::{AudioFormat, JobError, PassageRef, VideoSettings};

use crate::backend::{PassageSource, SynthesisBackend};

/// Passage text loaded from `{root}/{translation}/{book}.json`.
///
/// Each book file maps chapter numbers to verse maps:
/// `{"23": {"1": "The Lord is my shepherd...", ...}}`.
pub struct FilePassageSource {
    root: PathBuf,
}

impl FilePassageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `VCAST_BIBLE_DIR`, defaulting to `data/bible`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("VCAST_BIBLE_DIR").unwrap_or_else(|_| "data/bible".to_string()))
    }

    fn book_path(&self, passage: &PassageRef) -> PathBuf {
        let book = passage.book.to_lowercase().replace(' ', "_");
        self.root
            .join(passage.translation.to_lowercase())
            .join(format!("{}.json", book))
    }
}

#[async_trait]
impl PassageSource for FilePassageSource {
    async fn fetch(&self, passage: &PassageRef) -> Result<String, JobError> {
        let path = self.book_path(passage);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            JobError::with_hints(
                format!("No text for {} ({})", passage, passage.translation),
                vec![format!(
                    "Check that the translation files exist under {}: {}",
                    self.root.display(),
                    e
                )],
            )
        })?;

        let book: HashMap<String, HashMap<String, String>> =
            serde_json::from_str(&raw).map_err(|e| {
                JobError::new(format!("Malformed book file {}: {}", path.display(), e))
            })?;

        let chapter = book
            .get(&passage.chapter.to_string())
            .ok_or_else(|| JobError::new(format!("{} has no chapter {}", passage.book, passage.chapter)))?;

        let range = passage
            .verses
            .as_deref()
            .map(parse_verse_range)
            .transpose()?;

        let mut verses: Vec<(u32, &String)> = chapter
            .iter()
            .filter_map(|(k, v)| k.parse::<u32>().ok().map(|n| (n, v)))
            .filter(|(n, _)| range.map_or(true, |(lo, hi)| *n >= lo && *n <= hi))
            .collect();
        verses.sort_by_key(|(n, _)| *n);

        if verses.is_empty() {
            return Err(JobError::new(format!("No verses found for {}", passage)));
        }

        Ok(verses
            .into_iter()
            .map(|(_, v)| v.trim())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// Parse a verse selector: `"4"` or `"1-6"`.
fn parse_verse_range(spec: &str) -> Result<(u32, u32), JobError> {
    let bad = || JobError::new(format!("Invalid verse range '{}'", spec));

    let (lo, hi) = match spec.split_once('-') {
        Some((lo, hi)) => (
            lo.trim().parse::<u32>().map_err(|_| bad())?,
            hi.trim().parse::<u32>().map_err(|_| bad())?,
        ),
        None => {
            let v = spec.trim().parse::<u32>().map_err(|_| bad())?;
            (v, v)
        }
    };

    if lo == 0 || hi < lo {
        return Err(bad());
    }
    Ok((lo, hi))
}

/// Synthesis via local `espeak-ng` and `ffmpeg` binaries.
pub struct LocalSynthesis {
    work_dir: PathBuf,
}

impl LocalSynthesis {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Work dir from `VCAST_MEDIA_DIR`, defaulting to `data/media`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("VCAST_MEDIA_DIR").unwrap_or_else(|_| "data/media".to_string()))
    }

    async fn ensure_work_dir(&self) -> Result<(), JobError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| {
                JobError::new(format!(
                    "Cannot create media dir {}: {}",
                    self.work_dir.display(),
                    e
                ))
            })
    }

    fn scratch_path(&self, ext: &str) -> PathBuf {
        self.work_dir.join(format!("{}.{}", Uuid::new_v4(), ext))
    }

    /// Convert a wav file to the requested container, removing the wav.
    async fn convert(&self, wav: &Path, format: AudioFormat) -> Result<PathBuf, JobError> {
        if format == AudioFormat::Wav {
            return Ok(wav.to_path_buf());
        }

        let out = self.scratch_path(format.extension());
        run_tool(
            "ffmpeg",
            &[
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-i",
                &wav.display().to_string(),
                &out.display().to_string(),
            ],
        )
        .await?;

        if let Err(e) = tokio::fs::remove_file(wav).await {
            warn!(path = %wav.display(), "Failed to remove scratch wav: {}", e);
        }
        Ok(out)
    }
}

#[async_trait]
impl SynthesisBackend for LocalSynthesis {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: AudioFormat,
    ) -> Result<PathBuf, JobError> {
        self.ensure_work_dir().await?;

        let wav = self.scratch_path("wav");
        run_tool(
            "espeak-ng",
            &["-v", voice, "-w", &wav.display().to_string(), text],
        )
        .await?;

        self.convert(&wav, format).await
    }

    async fn stitch(&self, parts: &[PathBuf], format: AudioFormat) -> Result<PathBuf, JobError> {
        self.ensure_work_dir().await?;

        // ffmpeg concat demuxer needs a list file.
        let list = self.scratch_path("txt");
        let entries: String = parts
            .iter()
            .map(|p| format!("file '{}'\n", p.display()))
            .collect();
        tokio::fs::write(&list, entries)
            .await
            .map_err(|e| JobError::new(format!("Cannot write concat list: {}", e)))?;

        let out = self.scratch_path(format.extension());
        let result = run_tool(
            "ffmpeg",
            &[
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                &list.display().to_string(),
                "-c",
                "copy",
                &out.display().to_string(),
            ],
        )
        .await;

        let _ = tokio::fs::remove_file(&list).await;
        result?;
        Ok(out)
    }

    async fn compose_video(
        &self,
        audio: &Path,
        settings: &VideoSettings,
    ) -> Result<PathBuf, JobError> {
        self.ensure_work_dir().await?;

        let out = self.scratch_path("mp4");
        let audio_arg = audio.display().to_string();
        let out_arg = out.display().to_string();
        let scale = format!("scale={}", settings.resolution.replace('x', ":"));

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
        ];
        match &settings.background {
            Some(background) => {
                args.extend(["-loop".into(), "1".into(), "-i".into(), background.clone()]);
            }
            None => {
                // Solid-color canvas when no background asset is given.
                args.extend([
                    "-f".into(),
                    "lavfi".into(),
                    "-i".into(),
                    format!("color=c=black:s={}", settings.resolution),
                ]);
            }
        }
        args.extend([
            "-i".into(),
            audio_arg,
            "-vf".into(),
            scale,
            "-c:v".into(),
            "libx264".into(),
            "-c:a".into(),
            "aac".into(),
            "-shortest".into(),
            out_arg,
        ]);

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_tool("ffmpeg", &args).await?;
        Ok(out)
    }
}

/// Run a command to completion, mapping failures to a `JobError`.
async fn run_tool(program: &str, args: &[&str]) -> Result<(), JobError> {
    debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| JobError::new(format!("{} not found or failed to start: {}", program, e)))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(JobError::new(format!(
        "{} exited with {}: {}",
        program,
        output.status,
        stderr.trim()
    )))
}
