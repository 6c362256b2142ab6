//! Upload ingestion.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::info;
use validator::{Validate, ValidationError};

use reel_models::{JobId, MediaId};
use reel_queue::TranscodeJob;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Multipart fields after extraction.
#[derive(Debug, Validate)]
pub struct UploadForm {
    #[validate(length(min = 1, max = 128), custom(function = "validate_video_id"))]
    pub video_id: String,
    pub mimetype: String,
    pub file: Vec<u8>,
}

fn validate_video_id(video_id: &str) -> Result<(), ValidationError> {
    if MediaId::from(video_id).is_valid() {
        Ok(())
    } else {
        Err(ValidationError::new("video_id_charset"))
    }
}

/// Response for an accepted upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(rename = "jobId")]
    pub job_id: JobId,
}

/// Read the `file` and `videoId` parts, ignoring anything else.
async fn read_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut video_id = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let mimetype = field
                    .content_type()
                    .unwrap_or(DEFAULT_MIMETYPE)
                    .to_string();
                let bytes = field.bytes().await?;
                file = Some((mimetype, bytes.to_vec()));
            }
            Some("videoId") => video_id = Some(field.text().await?.trim().to_string()),
            _ => {}
        }
    }

    let (mimetype, file) = file.ok_or_else(|| ApiError::bad_request("file is required"))?;
    let video_id = video_id.ok_or_else(|| ApiError::bad_request("videoId is required"))?;
    if file.is_empty() {
        return Err(ApiError::bad_request("file is empty"));
    }

    Ok(UploadForm {
        video_id,
        mimetype,
        file,
    })
}

/// Accept an upload and enqueue it for transcoding.
///
/// Responds as soon as the job is queued; processing happens in the worker.
pub async fn upload(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    let form = read_form(multipart).await?;
    form.validate()?;

    let media_id = MediaId::from(form.video_id);
    let mimetype = form.mimetype;
    let size = form.file.len();

    state.store.mark_pending(&media_id).await?;
    let job_id = state
        .queue
        .enqueue(TranscodeJob::new(form.file, mimetype.clone(), media_id.clone()), state.job_options)
        .await?;
    metrics::record_job_enqueued(&mimetype, size);

    info!(job_id = %job_id, media_id = %media_id, bytes = size, "Upload enqueued");

    Ok(Json(UploadResponse {
        message: "Uploaded".to_string(),
        job_id,
    }))
}
