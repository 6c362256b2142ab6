//! Transcode worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_firestore::{FirestoreMediaStore, MediaStore};
use reel_media::{check_ffmpeg, check_ffprobe, FfmpegToolkit};
use reel_mux::MuxClient;
use reel_queue::{JobEventSink, ProgressChannel, RedisQueue};
use reel_storage::R2Client;
use reel_worker::{JobExecutor, JobProcessor, ManagedPipeline, PipelineMode, TranscodePipeline, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("reel=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting reel-worker");

    let config = match WorkerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid worker config: {}", e);
            std::process::exit(1);
        }
    };
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        if let Err(e) = reel_worker::metrics::init_exporter(port) {
            error!("Failed to start metrics exporter: {}", e);
            std::process::exit(1);
        }
        info!("Serving metrics on port {}", port);
    }

    let executor = match build_executor(config).await {
        Ok(e) => Arc::new(e),
        Err(e) => {
            error!("Failed to create job executor: {:#}", e);
            std::process::exit(1);
        }
    };

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn build_executor(config: WorkerConfig) -> anyhow::Result<JobExecutor> {
    let queue = RedisQueue::from_env().context("creating job queue")?;
    let events: Arc<dyn JobEventSink> =
        Arc::new(ProgressChannel::new(&queue.config().redis_url).context("creating progress channel")?);
    let store: Arc<dyn MediaStore> = Arc::new(
        FirestoreMediaStore::from_env()
            .await
            .context("creating Firestore store")?,
    );

    let processor: Arc<dyn JobProcessor> = match config.pipeline {
        PipelineMode::Transcode => {
            check_ffmpeg().context("ffmpeg is required")?;
            check_ffprobe().context("ffprobe is required")?;
            tokio::fs::create_dir_all(&config.work_dir)
                .await
                .with_context(|| format!("creating {}", config.work_dir.display()))?;

            let blobs = R2Client::from_env().await.context("creating R2 client")?;
            Arc::new(TranscodePipeline::new(
                config.work_dir.clone(),
                Arc::new(FfmpegToolkit::new()),
                Arc::new(blobs),
                Arc::clone(&store),
                Arc::clone(&events),
            ))
        }
        PipelineMode::Managed => {
            let mux = MuxClient::from_env().context("creating Mux client")?;
            Arc::new(ManagedPipeline::new(Arc::new(mux), Arc::clone(&store), Arc::clone(&events)))
        }
    };

    Ok(JobExecutor::new(config, Arc::new(queue), processor, store, events))
}
