//! Elementary streams found in a source container.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Audio,
    Video,
    Subtitle,
    /// Data, attachment or anything else ffprobe reports
    Other,
}

impl StreamKind {
    /// Map an ffprobe `codec_type` value.
    pub fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "audio" => StreamKind::Audio,
            "video" => StreamKind::Video,
            "subtitle" => StreamKind::Subtitle,
            _ => StreamKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Audio => "audio",
            StreamKind::Video => "video",
            StreamKind::Subtitle => "subtitle",
            StreamKind::Other => "other",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One elementary stream as reported by the prober.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbedStream {
    /// Absolute stream index in the source container
    pub index: u32,
    /// Stream kind
    pub kind: StreamKind,
    /// Codec name (informational only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,
}

impl ProbedStream {
    pub fn new(index: u32, kind: StreamKind) -> Self {
        Self {
            index,
            kind,
            codec_name: None,
        }
    }
}

/// A video stream paired with the audio stream it is muxed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedPair {
    /// Position of the video among video streams (0-based)
    pub video_ordinal: usize,
    pub video: ProbedStream,
    /// `None` when the source has no audio at all
    pub audio: Option<ProbedStream>,
}

/// Streams of a source grouped by kind, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamLayout {
    audio: Vec<ProbedStream>,
    video: Vec<ProbedStream>,
    subtitle: Vec<ProbedStream>,
}

impl StreamLayout {
    /// Group probed streams by kind. Source order is preserved within each group.
    pub fn from_streams(streams: &[ProbedStream]) -> Self {
        let mut sorted: Vec<&ProbedStream> = streams.iter().collect();
        sorted.sort_by_key(|s| s.index);

        let mut layout = Self::default();
        for stream in sorted {
            match stream.kind {
                StreamKind::Audio => layout.audio.push(stream.clone()),
                StreamKind::Video => layout.video.push(stream.clone()),
                StreamKind::Subtitle => layout.subtitle.push(stream.clone()),
                StreamKind::Other => {}
            }
        }
        layout
    }

    pub fn audio(&self) -> &[ProbedStream] {
        &self.audio
    }

    pub fn video(&self) -> &[ProbedStream] {
        &self.video
    }

    pub fn subtitle(&self) -> &[ProbedStream] {
        &self.subtitle
    }

    pub fn audio_count(&self) -> usize {
        self.audio.len()
    }

    pub fn video_count(&self) -> usize {
        self.video.len()
    }

    /// True when there is nothing to extract or encode.
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty() && self.video.is_empty()
    }

    /// Audio stream muxed with the video at `video_ordinal`.
    ///
    /// Index-matched when `video_ordinal < audio_count`, otherwise the first
    /// audio stream. Sources with more video than audio tracks therefore
    /// collapse onto `audio[0]`.
    pub fn audio_for_video(&self, video_ordinal: usize) -> Option<&ProbedStream> {
        self.audio.get(video_ordinal).or_else(|| self.audio.first())
    }

    /// Pairs for every video stream, in source order.
    pub fn combined_pairs(&self) -> Vec<CombinedPair> {
        self.video
            .iter()
            .enumerate()
            .map(|(i, video)| CombinedPair {
                video_ordinal: i,
                video: video.clone(),
                audio: self.audio_for_video(i).cloned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streams(kinds: &[StreamKind]) -> Vec<ProbedStream> {
        kinds
            .iter()
            .enumerate()
            .map(|(i, k)| ProbedStream::new(i as u32, *k))
            .collect()
    }

    #[test]
    fn test_layout_groups_by_kind() {
        use StreamKind::*;
        let layout = StreamLayout::from_streams(&streams(&[Video, Audio, Subtitle, Audio, Other]));
        assert_eq!(layout.video_count(), 1);
        assert_eq!(layout.audio_count(), 2);
        assert_eq!(layout.subtitle().len(), 1);
        assert_eq!(layout.audio()[0].index, 1);
        assert_eq!(layout.audio()[1].index, 3);
    }

    #[test]
    fn test_layout_sorts_by_source_index() {
        let unordered = vec![
            ProbedStream::new(4, StreamKind::Audio),
            ProbedStream::new(2, StreamKind::Audio),
        ];
        let layout = StreamLayout::from_streams(&unordered);
        assert_eq!(layout.audio()[0].index, 2);
    }

    #[test]
    fn test_audio_fallback_for_extra_video_tracks() {
        use StreamKind::*;
        // v0 v1 v2 a0
        let layout = StreamLayout::from_streams(&streams(&[Video, Video, Video, Audio]));
        let pairs = layout.combined_pairs();
        assert_eq!(pairs.len(), 3);
        for pair in &pairs {
            assert_eq!(pair.audio.as_ref().map(|a| a.index), Some(3));
        }
    }

    #[test]
    fn test_audio_index_matching_when_enough_tracks() {
        use StreamKind::*;
        // v0 v1 a0 a1 a2
        let layout = StreamLayout::from_streams(&streams(&[Video, Video, Audio, Audio, Audio]));
        let pairs = layout.combined_pairs();
        assert_eq!(pairs[0].audio.as_ref().unwrap().index, 2);
        assert_eq!(pairs[1].audio.as_ref().unwrap().index, 3);
    }

    #[test]
    fn test_video_only_source_has_no_audio_pairing() {
        let layout = StreamLayout::from_streams(&streams(&[StreamKind::Video]));
        let pairs = layout.combined_pairs();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].audio.is_none());
    }

    #[test]
    fn test_kind_from_codec_type() {
        assert_eq!(StreamKind::from_codec_type("audio"), StreamKind::Audio);
        assert_eq!(StreamKind::from_codec_type("data"), StreamKind::Other);
    }
}
