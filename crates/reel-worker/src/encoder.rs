//! Preview and full rendition encodes.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use reel_media::{rendition_plan, MediaToolkit, PlannedStep};
use reel_models::{MediaId, StreamLayout};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Runs the rendition ladder through a [`MediaToolkit`].
#[derive(Clone)]
pub struct RenditionEncoder {
    toolkit: Arc<dyn MediaToolkit>,
}

impl RenditionEncoder {
    pub fn new(toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self { toolkit }
    }

    pub fn plan(&self, source: &Path, layout: &StreamLayout, work_dir: &Path, media_id: &MediaId) -> Vec<PlannedStep> {
        rendition_plan(source, layout, work_dir, media_id)
    }

    /// Re-encode one rendition. `source_duration_ms` drives FFmpeg progress logging.
    pub async fn encode(&self, step: &PlannedStep, source_duration_ms: Option<i64>) -> WorkerResult<()> {
        let started = Instant::now();
        self.toolkit
            .run(&step.command, source_duration_ms)
            .await
            .map_err(WorkerError::encoding)?;

        metrics::record_stage_duration("encode", started.elapsed());
        debug!(key = %step.artifact.destination_key, "Encoded rendition");
        Ok(())
    }
}
