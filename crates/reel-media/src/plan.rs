//! Command plans for track extraction and the rendition ladder.
//!
//! Plans are pure: they turn a probed layout into the list of FFmpeg
//! invocations and the artifacts each one produces. Nothing runs here.

use reel_models::{Artifact, MediaId, RenditionKind, StreamLayout};
use std::path::Path;

use crate::command::FfmpegCommand;

/// One FFmpeg invocation and the artifact it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub artifact: Artifact,
    pub command: FfmpegCommand,
}

/// Stream-copy extraction of every track.
///
/// One audio-only artifact per audio stream, then one combined artifact per
/// video stream carrying the audio chosen by `StreamLayout::audio_for_video`.
/// A combined artifact is video-only when the source has no audio.
pub fn extraction_plan(
    source: &Path,
    layout: &StreamLayout,
    work_dir: &Path,
    media_id: &MediaId,
) -> Vec<PlannedStep> {
    let mut steps = Vec::with_capacity(layout.audio_count() + layout.video_count());

    for (i, audio) in layout.audio().iter().enumerate() {
        let artifact = Artifact::extracted_audio(work_dir, media_id, i);
        let command = FfmpegCommand::new(source, &artifact.local_path)
            .map_stream(audio.index)
            .stream_copy()
            .format("matroska");
        steps.push(PlannedStep { artifact, command });
    }

    for pair in layout.combined_pairs() {
        let artifact = Artifact::combined_video(work_dir, media_id, pair.video_ordinal);
        let mut command = FfmpegCommand::new(source, &artifact.local_path).map_stream(pair.video.index);
        if let Some(audio) = &pair.audio {
            command = command.map_stream(audio.index);
        }
        let command = command.stream_copy().format("matroska");
        steps.push(PlannedStep { artifact, command });
    }

    steps
}

/// Re-encode of the source into every rendition of the ladder.
///
/// Uses the first video and first audio stream. Audio-only sources get `-vn`,
/// video-only sources get `-an`.
pub fn rendition_plan(
    source: &Path,
    layout: &StreamLayout,
    work_dir: &Path,
    media_id: &MediaId,
) -> Vec<PlannedStep> {
    RenditionKind::ALL
        .iter()
        .map(|kind| {
            let profile = kind.profile();
            let artifact = Artifact::rendition(work_dir, media_id, *kind);
            let mut command = FfmpegCommand::new(source, &artifact.local_path);

            match layout.video().first() {
                Some(video) => {
                    command = command.map_stream(video.index).output_args(profile.video_args());
                }
                None => command = command.no_video(),
            }

            match layout.audio().first() {
                Some(audio) => {
                    command = command.map_stream(audio.index).output_args(profile.audio_args());
                }
                None => command = command.no_audio(),
            }

            let command = command.faststart().format("mp4");
            PlannedStep { artifact, command }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{ArtifactRole, ContentKind, ProbedStream, StreamKind};

    fn layout(kinds: &[StreamKind]) -> StreamLayout {
        let streams: Vec<ProbedStream> = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| ProbedStream::new(i as u32, *k))
            .collect();
        StreamLayout::from_streams(&streams)
    }

    fn map_targets(step: &PlannedStep) -> Vec<String> {
        let args = step.command.build_args();
        args.windows(2)
            .filter(|w| w[0] == "-map")
            .map(|w| w[1].clone())
            .collect()
    }

    #[test]
    fn test_two_audio_one_video() {
        use StreamKind::*;
        let layout = layout(&[Video, Audio, Audio]);
        let steps = extraction_plan(Path::new("src.mp4"), &layout, Path::new("/w"), &MediaId::from("m"));

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].artifact.role, ArtifactRole::ExtractedTrack);
        assert_eq!(steps[0].artifact.content_kind, ContentKind::Audio);
        assert_eq!(map_targets(&steps[0]), vec!["0:1"]);
        assert_eq!(map_targets(&steps[1]), vec!["0:2"]);

        assert_eq!(steps[2].artifact.role, ArtifactRole::CombinedTrack);
        assert_eq!(map_targets(&steps[2]), vec!["0:0", "0:1"]);
        assert!(steps[2].command.build_args().contains(&"copy".to_string()));
    }

    #[test]
    fn test_extra_video_tracks_fall_back_to_first_audio() {
        use StreamKind::*;
        // v0 v1 v2 a0 a1
        let layout = layout(&[Video, Video, Video, Audio, Audio]);
        let steps = extraction_plan(Path::new("src.mkv"), &layout, Path::new("/w"), &MediaId::from("m"));
        let combined: Vec<_> = steps
            .iter()
            .filter(|s| s.artifact.role == ArtifactRole::CombinedTrack)
            .collect();

        assert_eq!(combined.len(), 3);
        assert_eq!(map_targets(combined[0]), vec!["0:0", "0:3"]);
        assert_eq!(map_targets(combined[1]), vec!["0:1", "0:4"]);
        assert_eq!(map_targets(combined[2]), vec!["0:2", "0:3"]);
    }

    #[test]
    fn test_video_only_source() {
        let layout = layout(&[StreamKind::Video]);
        let media = MediaId::from("m");
        let steps = extraction_plan(Path::new("src.mp4"), &layout, Path::new("/w"), &media);
        assert_eq!(steps.len(), 1);
        assert_eq!(map_targets(&steps[0]), vec!["0:0"]);

        let renditions = rendition_plan(Path::new("src.mp4"), &layout, Path::new("/w"), &media);
        for step in &renditions {
            let args = step.command.build_args();
            assert!(args.contains(&"-an".to_string()));
            assert!(!args.contains(&"-c:a".to_string()));
        }
    }

    #[test]
    fn test_rendition_ladder() {
        use StreamKind::*;
        let layout = layout(&[Video, Audio]);
        let steps = rendition_plan(Path::new("src.mp4"), &layout, Path::new("/w"), &MediaId::from("m"));

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].artifact.role, ArtifactRole::PreviewRendition);
        assert_eq!(steps[1].artifact.role, ArtifactRole::FullRendition);

        let preview = steps[0].command.build_args();
        assert!(preview.contains(&"scale=640:-2".to_string()));
        assert!(preview.contains(&"+faststart".to_string()));
        assert!(preview.contains(&"96k".to_string()));

        let full = steps[1].command.build_args();
        assert!(full.contains(&"scale=1920:-2".to_string()));
        assert!(full.contains(&"slow".to_string()));
        assert!(full.contains(&"192k".to_string()));
    }

    #[test]
    fn test_audio_only_rendition_drops_video() {
        let layout = layout(&[StreamKind::Audio]);
        let steps = rendition_plan(Path::new("a.m4a"), &layout, Path::new("/w"), &MediaId::from("m"));
        let args = steps[0].command.build_args();
        assert!(args.contains(&"-vn".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("scale=")));
    }
}
