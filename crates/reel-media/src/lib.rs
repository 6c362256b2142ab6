//! FFmpeg CLI wrapper for the transcode pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with stream mapping
//! - Stream enumeration via `ffprobe`
//! - Progress parsing from `-progress pipe:2`
//! - Command plans for track extraction and the rendition ladder
//! - The `MediaToolkit` seam the worker drives

pub mod command;
pub mod error;
pub mod plan;
pub mod probe;
pub mod progress;
pub mod toolkit;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use plan::{extraction_plan, rendition_plan, PlannedStep};
pub use probe::{parse_probe_output, probe_streams, ProbeReport};
pub use progress::FfmpegProgress;
pub use toolkit::{FfmpegToolkit, MediaToolkit};
