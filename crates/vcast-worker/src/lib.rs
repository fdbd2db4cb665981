//! Synthesis job runner.
//!
//! This crate provides:
//! - The `SynthesisRunner` executed by the queue for every job
//! - Text chunking for multi-chunk synthesis with progress
//! - The opaque `PassageSource` and `SynthesisBackend` boundaries
//! - Local implementations backed by espeak-ng, ffmpeg and on-disk
//!   translation files

pub mod backend;
pub mod chunk;
pub mod local;
pub mod runner;

pub use backend::{PassageSource, SynthesisBackend};
pub use chunk::split_text;
pub use local::{FilePassageSource, LocalSynthesis};
pub use runner::SynthesisRunner;
