//! Local transcode pipeline: stage, probe, extract, encode, publish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use reel_firestore::MediaStore;
use reel_media::{MediaError, MediaToolkit, PlannedStep};
use reel_queue::{JobEventSink, QueuedJob};
use reel_storage::BlobStore;

use crate::encoder::RenditionEncoder;
use crate::error::{WorkerError, WorkerResult};
use crate::extractor::StreamExtractor;
use crate::logging::JobLogger;
use crate::metrics;
use crate::processor::{JobProcessor, ProgressReporter};
use crate::publisher::ArtifactPublisher;
use crate::workspace::JobWorkspace;

const STAGED_PERCENT: u8 = 5;
const PROBED_PERCENT: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Extract,
    Encode,
}

/// Splits an upload into tracks and renditions and publishes each one.
pub struct TranscodePipeline {
    work_dir: PathBuf,
    toolkit: Arc<dyn MediaToolkit>,
    extractor: StreamExtractor,
    encoder: RenditionEncoder,
    publisher: ArtifactPublisher,
    progress: ProgressReporter,
}

impl TranscodePipeline {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        toolkit: Arc<dyn MediaToolkit>,
        blobs: Arc<dyn BlobStore>,
        store: Arc<dyn MediaStore>,
        events: Arc<dyn JobEventSink>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            extractor: StreamExtractor::new(Arc::clone(&toolkit)),
            encoder: RenditionEncoder::new(Arc::clone(&toolkit)),
            toolkit,
            publisher: ArtifactPublisher::new(blobs, store),
            progress: ProgressReporter::new(events),
        }
    }

    async fn run_stages(&self, job: &QueuedJob, workspace: &JobWorkspace, logger: &JobLogger) -> WorkerResult<()> {
        let payload = &job.payload;
        let media_id = &payload.video_id;

        self.publisher.begin_processing(media_id).await?;

        let source = workspace
            .stage_source(&payload.file, payload.file_extension())
            .await?;
        self.progress.report(job, STAGED_PERCENT, "staged").await;

        let started = Instant::now();
        let report = self.toolkit.probe(&source).await.map_err(WorkerError::probe)?;
        let layout = report.layout();
        if layout.is_empty() {
            return Err(WorkerError::probe(MediaError::NoStreams));
        }
        metrics::record_stage_duration("probe", started.elapsed());
        logger.log_progress(&format!(
            "probed {} audio, {} video streams",
            layout.audio_count(),
            layout.video_count()
        ));
        self.progress.report(job, PROBED_PERCENT, "probed").await;

        let extraction = self.extractor.plan(&source, &layout, workspace.path(), media_id);
        let renditions = self.encoder.plan(&source, &layout, workspace.path(), media_id);
        let total = extraction.len() + renditions.len();
        let duration_ms = report.duration_ms();

        let steps = extraction
            .iter()
            .map(|s| (StepKind::Extract, s))
            .chain(renditions.iter().map(|s| (StepKind::Encode, s)));

        for (done, (kind, step)) in steps.enumerate() {
            self.run_step(job, kind, step, duration_ms, logger).await?;

            let percent = PROBED_PERCENT as usize + (done + 1) * (99 - PROBED_PERCENT as usize) / total;
            let stage = match kind {
                StepKind::Extract => "extracting",
                StepKind::Encode => "encoding",
            };
            self.progress.report(job, percent as u8, stage).await;
        }

        self.publisher.finalize(media_id).await?;
        self.progress.report(job, 100, "published").await;
        logger.log_completion(&format!("published {} artifacts", total));
        Ok(())
    }

    /// Produce and publish one artifact unless this job already published it.
    async fn run_step(
        &self,
        job: &QueuedJob,
        kind: StepKind,
        step: &PlannedStep,
        duration_ms: Option<i64>,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let key = &step.artifact.destination_key;
        if self.publisher.is_published(&job.id, key).await? {
            logger.log_progress(&format!("skipping {}, published by an earlier attempt", key));
            return Ok(());
        }

        match kind {
            StepKind::Extract => self.extractor.extract(step).await?,
            StepKind::Encode => self.encoder.encode(step, duration_ms).await?,
        }

        self.publisher
            .publish(&job.id, &job.payload.video_id, &step.artifact)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobProcessor for TranscodePipeline {
    fn operation(&self) -> &'static str {
        "transcode"
    }

    async fn process(&self, job: &QueuedJob) -> WorkerResult<()> {
        let logger = JobLogger::new(&job.id, &job.payload.video_id, self.operation());
        logger.log_start(&format!(
            "attempt {}/{}, {} bytes of {}",
            job.attempt(),
            job.options.attempts,
            job.payload.file.len(),
            job.payload.mimetype
        ));

        let workspace = JobWorkspace::create(&self.work_dir, &job.payload.video_id).await?;
        let result = self.run_stages(job, &workspace, &logger).await;

        if let Err(e) = workspace.cleanup().await {
            logger.log_warning(&format!("workspace cleanup failed: {}", e));
        }
        result
    }
}
