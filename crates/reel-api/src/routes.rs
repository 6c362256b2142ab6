//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{health, ready, upload};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/v1/upload", post(upload))
        // Multipart bodies are bounded by RequestBodyLimitLayer instead of axum's 2MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use reel_firestore::{MediaStore, MemoryMediaStore};
    use reel_models::{MediaId, MediaStatus};
    use reel_queue::{JobOptions, MemoryQueue, WorkQueue};
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "reel-test-boundary";

    fn app(max_body_size: usize) -> (Router, MemoryQueue, MemoryMediaStore) {
        let queue = MemoryQueue::default();
        let store = MemoryMediaStore::new();
        let config = ApiConfig {
            max_body_size,
            ..ApiConfig::default()
        };
        let state = AppState::with_backends(
            config,
            Arc::new(queue.clone()),
            Arc::new(store.clone()),
            JobOptions::default(),
        );
        (create_router(state, None), queue, store)
    }

    fn multipart_body(video_id: Option<&str>, file: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(id) = video_id {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"videoId\"\r\n\r\n{id}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(data) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip.mp4\"\r\nContent-Type: video/mp4\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/upload")
            .header(header::CONTENT_LENGTH, body.len())
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = app(1024);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_queue_counts() {
        let (app, _, _) = app(1024);
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["queue"]["waiting"], 0);
    }

    #[tokio::test]
    async fn test_upload_enqueues_job() {
        let (app, queue, store) = app(1024 * 1024);
        let response = app
            .oneshot(upload_request(multipart_body(Some("vid_1"), Some(b"mp4 bytes"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Uploaded");
        assert!(body["jobId"].as_str().is_some_and(|id| !id.is_empty()));

        let claim = queue.claim().await.unwrap().unwrap();
        assert_eq!(claim.job.payload.file, b"mp4 bytes");
        assert_eq!(claim.job.payload.mimetype, "video/mp4");
        assert_eq!(claim.job.payload.video_id, MediaId::from("vid_1"));
        assert_eq!(claim.job_id().as_str(), body["jobId"].as_str().unwrap());

        let record = store.get_media(&MediaId::from("vid_1")).await.unwrap().unwrap();
        assert!(record.is_processing);
        assert_eq!(record.status, MediaStatus::Pending);
    }

    #[tokio::test]
    async fn test_upload_requires_file() {
        let (app, queue, _) = app(1024);
        let response = app
            .oneshot(upload_request(multipart_body(Some("vid_1"), None)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["detail"]
            .as_str()
            .unwrap()
            .contains("file is required"));
        assert_eq!(queue.counts().await.unwrap().waiting, 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_video_id() {
        let (app, queue, _) = app(1024);
        let response = app
            .oneshot(upload_request(multipart_body(Some("../etc"), Some(b"x"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(queue.counts().await.unwrap().waiting, 0);
    }

    #[tokio::test]
    async fn test_upload_over_body_limit() {
        let (app, queue, _) = app(64);
        let response = app
            .oneshot(upload_request(multipart_body(Some("vid_1"), Some(&[0u8; 256]))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(queue.counts().await.unwrap().waiting, 0);
    }
}
