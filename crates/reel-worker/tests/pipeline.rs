//! End-to-end runs of the transcode pipeline against in-memory backends.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use reel_firestore::{MediaStore, MemoryMediaStore};
use reel_media::{FfmpegCommand, MediaError, MediaResult, MediaToolkit, ProbeReport};
use reel_models::{AssetType, JobEvent, JobEventKind, JobId, JobState, MediaId, MediaStatus, MetadataField, ProbedStream, StreamKind};
use reel_queue::{Backoff, JobOptions, MemoryEventSink, MemoryQueue, TranscodeJob, WorkQueue};
use reel_storage::MemoryBlobStore;
use reel_worker::{JobExecutor, TranscodePipeline, WorkerConfig};

/// Toolkit that reports a fixed stream layout and writes placeholder outputs.
struct FakeToolkit {
    report: ProbeReport,
    runs: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, u32>>,
}

impl FakeToolkit {
    fn new(kinds: &[StreamKind]) -> Self {
        let streams = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| ProbedStream::new(i as u32, *k))
            .collect();
        Self {
            report: ProbeReport {
                streams,
                duration_secs: Some(12.0),
            },
            runs: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn fail_output(&self, file_name: &str, times: u32) {
        self.failures.lock().unwrap().insert(file_name.to_string(), times);
    }

    fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe(&self, path: &Path) -> MediaResult<ProbeReport> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        Ok(self.report.clone())
    }

    async fn run(&self, command: &FfmpegCommand, _total_duration_ms: Option<i64>) -> MediaResult<()> {
        let name = file_name(command.output());
        self.runs.lock().unwrap().push(name.clone());

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(MediaError::ffmpeg_failed("injected failure", None, Some(1)));
                }
            }
        }

        tokio::fs::write(command.output(), command.build_args().join(" ")).await?;
        Ok(())
    }
}

struct Harness {
    root: TempDir,
    toolkit: Arc<FakeToolkit>,
    queue: MemoryQueue,
    blobs: MemoryBlobStore,
    store: MemoryMediaStore,
    events: MemoryEventSink,
    executor: Arc<JobExecutor>,
}

impl Harness {
    fn new(kinds: &[StreamKind]) -> Self {
        let root = TempDir::new().unwrap();
        let toolkit = Arc::new(FakeToolkit::new(kinds));
        let queue = MemoryQueue::default();
        let blobs = MemoryBlobStore::new("https://cdn.example.com");
        let store = MemoryMediaStore::new();
        let events = MemoryEventSink::new();

        let config = WorkerConfig {
            work_dir: root.path().to_path_buf(),
            poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(5),
            ..WorkerConfig::default()
        };
        let pipeline = TranscodePipeline::new(
            config.work_dir.clone(),
            toolkit.clone(),
            Arc::new(blobs.clone()),
            Arc::new(store.clone()),
            Arc::new(events.clone()),
        );
        let executor = Arc::new(JobExecutor::new(
            config,
            Arc::new(queue.clone()),
            Arc::new(pipeline),
            Arc::new(store.clone()),
            Arc::new(events.clone()),
        ));

        Self {
            root,
            toolkit,
            queue,
            blobs,
            store,
            events,
            executor,
        }
    }

    async fn submit(&self, media: &str, options: JobOptions) -> JobId {
        let media = MediaId::from(media);
        self.store.mark_pending(&media).await.unwrap();
        self.queue
            .enqueue(TranscodeJob::new(b"source bytes".to_vec(), "video/mp4", media), options)
            .await
            .unwrap()
    }
}

fn fast_retry(attempts: u32) -> JobOptions {
    JobOptions::default()
        .with_attempts(attempts)
        .with_backoff(Backoff::Exponential { base_ms: 20 })
}

#[tokio::test]
async fn test_two_audio_one_video_publishes_everything() {
    use StreamKind::*;
    let h = Harness::new(&[Video, Audio, Audio]);
    let job_id = h.submit("m1", JobOptions::default()).await;
    let media = MediaId::from("m1");

    assert!(h.executor.run_once().await.unwrap());

    let assets = h.store.assets_for(&media).await;
    let keys: Vec<&str> = assets.iter().map(|a| a.destination_key.as_str()).collect();
    assert_eq!(keys, vec!["m1/tracks/audio_0.mka", "m1/tracks/audio_1.mka", "m1/tracks/video_0.mkv"]);
    assert_eq!(assets.iter().filter(|a| a.asset_type == AssetType::Audio).count(), 2);
    assert_eq!(assets.iter().filter(|a| a.asset_type == AssetType::Video).count(), 1);

    let metadata = h.store.get_metadata(&media).await.unwrap().unwrap();
    assert_eq!(
        metadata.get(MetadataField::PreviewUrl),
        Some("https://cdn.example.com/m1/renditions/preview.mp4")
    );
    assert_eq!(
        metadata.get(MetadataField::FullUrl),
        Some("https://cdn.example.com/m1/renditions/full.mp4")
    );

    let record = h.store.get_media(&media).await.unwrap().unwrap();
    assert!(!record.is_processing);
    assert_eq!(record.status, MediaStatus::Completed);
    assert_eq!(record.published_artifacts, 5);
    assert_eq!(h.store.completion_count(&media).await, 1);

    assert_eq!(h.blobs.len().await, 5);
    assert_eq!(h.queue.state(&job_id).await, Some(JobState::Completed));
    assert!(!h.root.path().join("m1").exists());

    let events = h.events.events_for(&job_id).await;
    assert_eq!(events.last().map(JobEvent::kind), Some(JobEventKind::Completed));
    assert!(events.iter().any(|e| e.kind() == JobEventKind::Progress));
}

#[tokio::test]
async fn test_video_only_source_gets_video_only_track() {
    let h = Harness::new(&[StreamKind::Video]);
    h.submit("m2", JobOptions::default()).await;
    let media = MediaId::from("m2");

    assert!(h.executor.run_once().await.unwrap());

    let assets = h.store.assets_for(&media).await;
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].asset_type, AssetType::Video);
    assert_eq!(assets[0].destination_key, "m2/tracks/video_0.mkv");

    let combined = h.blobs.get("m2/tracks/video_0.mkv").await.unwrap();
    let args = String::from_utf8(combined.data).unwrap();
    assert!(args.contains("-map 0:0"));
    assert!(!args.contains("0:1"));

    let preview = String::from_utf8(h.blobs.get("m2/renditions/preview.mp4").await.unwrap().data).unwrap();
    assert!(preview.contains("-an"));

    let record = h.store.get_media(&media).await.unwrap().unwrap();
    assert!(!record.is_processing);
}

#[tokio::test]
async fn test_extra_video_tracks_pair_with_first_audio() {
    use StreamKind::*;
    let h = Harness::new(&[Video, Video, Audio]);
    h.submit("m3", JobOptions::default()).await;

    assert!(h.executor.run_once().await.unwrap());

    let second = String::from_utf8(h.blobs.get("m3/tracks/video_1.mkv").await.unwrap().data).unwrap();
    assert!(second.contains("-map 0:1 -map 0:2"));
}

#[tokio::test]
async fn test_retry_skips_artifacts_already_published() {
    use StreamKind::*;
    let h = Harness::new(&[Video, Audio, Audio]);
    let job_id = h.submit("m4", fast_retry(3)).await;
    let media = MediaId::from("m4");
    h.blobs.fail_uploads("m4/renditions/full.mp4", 1).await;

    assert!(h.executor.run_once().await.unwrap());

    let record = h.store.get_media(&media).await.unwrap().unwrap();
    assert!(record.is_processing);
    assert_eq!(record.status, MediaStatus::PartiallyPublished);
    assert_eq!(record.published_artifacts, 4);
    assert_eq!(h.queue.state(&job_id).await, Some(JobState::Delayed));
    assert_eq!(h.queue.attempts_made(&job_id).await, Some(1));
    assert!(!h.root.path().join("m4").exists());

    // Not redelivered before the backoff elapses.
    assert!(!h.executor.run_once().await.unwrap());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(h.executor.run_once().await.unwrap());

    let runs = h.toolkit.runs();
    assert_eq!(runs.len(), 6);
    assert_eq!(runs.last().map(String::as_str), Some("full.mp4"));

    let record = h.store.get_media(&media).await.unwrap().unwrap();
    assert!(!record.is_processing);
    assert_eq!(record.status, MediaStatus::Completed);
    assert_eq!(record.published_artifacts, 5);
    assert_eq!(h.store.completion_count(&media).await, 1);
    assert_eq!(h.store.assets_for(&media).await.len(), 3);
    assert_eq!(h.queue.state(&job_id).await, Some(JobState::Completed));
}

#[tokio::test]
async fn test_extraction_failure_is_retried() {
    use StreamKind::*;
    let h = Harness::new(&[Video, Audio]);
    let job_id = h.submit("m5", fast_retry(2)).await;
    h.toolkit.fail_output("audio_0.mka", 1);

    assert!(h.executor.run_once().await.unwrap());
    assert!(h.blobs.is_empty().await);
    assert!(!h.root.path().join("m5").exists());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(h.executor.run_once().await.unwrap());

    assert_eq!(h.queue.state(&job_id).await, Some(JobState::Completed));
    assert_eq!(h.blobs.len().await, 4);
}

#[tokio::test]
async fn test_exhausted_job_marks_media_failed() {
    let h = Harness::new(&[StreamKind::Subtitle]);
    let job_id = h.submit("m6", fast_retry(2)).await;
    let media = MediaId::from("m6");

    assert!(h.executor.run_once().await.unwrap());
    assert!(!h.root.path().join("m6").exists());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(h.executor.run_once().await.unwrap());
    assert!(!h.root.path().join("m6").exists());

    assert_eq!(h.queue.state(&job_id).await, Some(JobState::Failed));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!h.executor.run_once().await.unwrap());

    let record = h.store.get_media(&media).await.unwrap().unwrap();
    assert_eq!(record.status, MediaStatus::Failed);
    assert!(record.is_processing);
    assert!(record.last_error.unwrap().contains("Probe failed"));
    assert!(h.toolkit.runs().is_empty());

    let events = h.events.events_for(&job_id).await;
    match events.last() {
        Some(JobEvent::Failed { error, .. }) => assert!(error.contains("no audio or video")),
        other => panic!("expected failed event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_loop_drains_queue_and_shuts_down() {
    use StreamKind::*;
    let h = Harness::new(&[Video, Audio]);
    let first = h.submit("m7", JobOptions::default()).await;
    let second = h.submit("m8", JobOptions::default()).await;

    let executor = Arc::clone(&h.executor);
    let handle = tokio::spawn(async move { executor.run().await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let done = h.queue.state(&first).await == Some(JobState::Completed)
            && h.queue.state(&second).await == Some(JobState::Completed);
        if done {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "jobs did not finish");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.executor.shutdown();
    handle.await.unwrap().unwrap();

    let counts = h.queue.counts().await.unwrap();
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.waiting, 0);
}
