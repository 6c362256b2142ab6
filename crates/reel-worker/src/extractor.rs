//! Stream-copy extraction of every elementary track.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use reel_media::{extraction_plan, MediaToolkit, PlannedStep};
use reel_models::{MediaId, StreamLayout};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Runs the extraction plan through a [`MediaToolkit`].
#[derive(Clone)]
pub struct StreamExtractor {
    toolkit: Arc<dyn MediaToolkit>,
}

impl StreamExtractor {
    pub fn new(toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self { toolkit }
    }

    /// One step per audio stream, then one per video stream.
    pub fn plan(&self, source: &Path, layout: &StreamLayout, work_dir: &Path, media_id: &MediaId) -> Vec<PlannedStep> {
        extraction_plan(source, layout, work_dir, media_id)
    }

    /// Produce one track artifact. No re-encoding happens, so no progress is tracked.
    pub async fn extract(&self, step: &PlannedStep) -> WorkerResult<()> {
        let started = Instant::now();
        self.toolkit
            .run(&step.command, None)
            .await
            .map_err(WorkerError::extraction)?;

        metrics::record_stage_duration("extract", started.elapsed());
        debug!(key = %step.artifact.destination_key, "Extracted track");
        Ok(())
    }
}
