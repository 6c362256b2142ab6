//! FFprobe stream enumeration.

use reel_models::{ProbedStream, StreamKind, StreamLayout};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Streams found in a source, plus the container duration when reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub streams: Vec<ProbedStream>,
    pub duration_secs: Option<f64>,
}

impl ProbeReport {
    pub fn layout(&self) -> StreamLayout {
        StreamLayout::from_streams(&self.streams)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_secs.map(|d| (d * 1000.0) as i64)
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    #[serde(default)]
    codec_type: Option<String>,
    codec_name: Option<String>,
}

/// Parse `ffprobe -print_format json -show_streams` output.
///
/// Fails with `NoStreams` when the source has neither audio nor video.
pub fn parse_probe_output(stdout: &[u8]) -> MediaResult<ProbeReport> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let streams: Vec<ProbedStream> = probe
        .streams
        .into_iter()
        .map(|s| ProbedStream {
            index: s.index,
            kind: StreamKind::from_codec_type(s.codec_type.as_deref().unwrap_or_default()),
            codec_name: s.codec_name,
        })
        .collect();

    let has_media = streams
        .iter()
        .any(|s| matches!(s.kind, StreamKind::Audio | StreamKind::Video));
    if !has_media {
        return Err(MediaError::NoStreams);
    }

    let duration_secs = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok());

    Ok(ProbeReport {
        streams,
        duration_secs,
    })
}

/// Enumerate the elementary streams of a file.
pub async fn probe_streams(path: impl AsRef<Path>) -> MediaResult<ProbeReport> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("FFprobe exited with {:?}", output.status.code()),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    let report = parse_probe_output(&output.stdout)?;
    debug!(
        path = %path.display(),
        streams = report.streams.len(),
        "Probed source"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_AUDIO_ONE_VIDEO: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920},
            {"index": 1, "codec_type": "audio", "codec_name": "aac"},
            {"index": 2, "codec_type": "audio", "codec_name": "opus"},
            {"index": 3, "codec_type": "data", "codec_name": "bin_data"}
        ],
        "format": {"duration": "12.500000"}
    }"#;

    #[test]
    fn test_parse_streams() {
        let report = parse_probe_output(TWO_AUDIO_ONE_VIDEO.as_bytes()).unwrap();
        assert_eq!(report.streams.len(), 4);
        assert_eq!(report.duration_ms(), Some(12_500));

        let layout = report.layout();
        assert_eq!(layout.audio_count(), 2);
        assert_eq!(layout.video_count(), 1);
        assert_eq!(layout.audio()[1].codec_name.as_deref(), Some("opus"));
    }

    #[test]
    fn test_audio_only_source_is_accepted() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "audio"}]}"#;
        let report = parse_probe_output(json.as_bytes()).unwrap();
        assert_eq!(report.layout().video_count(), 0);
        assert_eq!(report.duration_secs, None);
    }

    #[test]
    fn test_no_media_streams_is_an_error() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "subtitle"}]}"#;
        let err = parse_probe_output(json.as_bytes()).unwrap_err();
        assert!(matches!(err, MediaError::NoStreams));
        assert!(err.is_probe_error());

        let err = parse_probe_output(b"{}").unwrap_err();
        assert!(matches!(err, MediaError::NoStreams));
    }

    #[test]
    fn test_malformed_output_is_an_error() {
        let err = parse_probe_output(b"not json").unwrap_err();
        assert!(matches!(err, MediaError::JsonParse(_)));
    }
}
