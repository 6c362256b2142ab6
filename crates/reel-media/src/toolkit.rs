//! The external media capability as an injectable seam.

use async_trait::async_trait;
use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{probe_streams, ProbeReport};

/// Probe and transcode operations the pipeline depends on.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Enumerate the elementary streams of a staged file.
    async fn probe(&self, path: &Path) -> MediaResult<ProbeReport>;

    /// Run one command to completion. The output file exists on success.
    async fn run(&self, command: &FfmpegCommand, total_duration_ms: Option<i64>) -> MediaResult<()>;
}

/// `MediaToolkit` backed by the `ffprobe` and `ffmpeg` binaries on PATH.
#[derive(Debug, Clone, Default)]
pub struct FfmpegToolkit;

impl FfmpegToolkit {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, path: &Path) -> MediaResult<ProbeReport> {
        probe_streams(path).await
    }

    async fn run(&self, command: &FfmpegCommand, total_duration_ms: Option<i64>) -> MediaResult<()> {
        let runner = match total_duration_ms {
            Some(ms) => FfmpegRunner::new().with_total_duration_ms(ms),
            None => FfmpegRunner::new(),
        };
        runner.run(command).await
    }
}
