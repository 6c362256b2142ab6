//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};

use reel_firestore::MediaStore;
use reel_models::JobEvent;
use reel_queue::{Claim, FailureOutcome, JobEventSink, WorkQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::processor::JobProcessor;

/// Everything a running job needs, shared between spawned tasks.
struct JobContext {
    queue: Arc<dyn WorkQueue>,
    processor: Arc<dyn JobProcessor>,
    store: Arc<dyn MediaStore>,
    events: Arc<dyn JobEventSink>,
    lease_heartbeat: Duration,
}

/// Job executor that claims jobs from the queue and runs them.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<JobContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn WorkQueue>,
        processor: Arc<dyn JobProcessor>,
        store: Arc<dyn MediaStore>,
        events: Arc<dyn JobEventSink>,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let ctx = Arc::new(JobContext {
            queue,
            processor,
            store,
            events,
            lease_heartbeat: config.lease_heartbeat,
        });

        Self {
            config,
            ctx,
            job_semaphore,
            shutdown,
        }
    }

    /// Claim and run jobs until shutdown is signalled.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor ({}) with {} max concurrent jobs",
            self.ctx.processor.operation(),
            self.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.claim_next() => {
                    if let Err(e) = result {
                        error!("Error claiming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("In-flight jobs still running after {:?}", self.config.shutdown_timeout);
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Claim one job and spawn it, or sleep for the poll interval when idle.
    async fn claim_next(&self) -> WorkerResult<()> {
        let permit = Arc::clone(&self.job_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::workspace("job semaphore closed"))?;

        match self.ctx.queue.claim().await? {
            Some(claim) => {
                debug!(job_id = %claim.job_id(), "Claimed job");
                let ctx = Arc::clone(&self.ctx);
                tokio::spawn(async move {
                    let _permit = permit;
                    Self::execute_job(ctx, claim).await;
                });
            }
            None => {
                drop(permit);
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
        Ok(())
    }

    /// Claim and run a single job on the current task. Returns `false` when
    /// the queue had nothing ready.
    pub async fn run_once(&self) -> WorkerResult<bool> {
        match self.ctx.queue.claim().await? {
            Some(claim) => {
                Self::execute_job(Arc::clone(&self.ctx), claim).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run one delivery and report its outcome to the queue.
    async fn execute_job(ctx: Arc<JobContext>, claim: Claim) {
        let job = &claim.job;
        let media_id = job.payload.video_id.clone();
        let logger = JobLogger::new(&job.id, &media_id, ctx.processor.operation());

        let heartbeat = Self::spawn_heartbeat(Arc::clone(&ctx), claim.clone());
        let result = ctx
            .processor
            .process(job)
            .instrument(logger.create_span())
            .await;
        heartbeat.abort();

        match result {
            Ok(()) => {
                if let Err(e) = ctx.queue.complete(&claim).await {
                    logger.log_error(&format!("failed to mark job completed: {}", e));
                }
                if let Err(e) = ctx.events.publish(&JobEvent::completed(job.id.clone())).await {
                    logger.log_warning(&format!("failed to publish completion: {}", e));
                }
                metrics::record_job("completed");
                logger.log_completion("all artifacts published");
            }
            Err(e) => {
                let message = e.to_string();
                logger.log_error(&format!("{} stage failed: {}", e.kind(), message));

                match ctx.queue.fail(&claim, &message).await {
                    Ok(FailureOutcome::Retrying { attempt, delay }) => {
                        metrics::record_job("retrying");
                        logger.log_warning(&format!(
                            "attempt {}/{} failed, retrying in {:?}",
                            attempt, job.options.attempts, delay
                        ));
                    }
                    Ok(FailureOutcome::Exhausted { attempts }) => {
                        metrics::record_job("failed");
                        logger.log_error(&format!("giving up after {} attempts", attempts));
                        if let Err(store_err) = ctx.store.mark_failed(&media_id, &message).await {
                            logger.log_error(&format!("failed to mark media failed: {}", store_err));
                        }
                        if let Err(event_err) = ctx.events.publish(&JobEvent::failed(job.id.clone(), &message)).await {
                            logger.log_warning(&format!("failed to publish failure: {}", event_err));
                        }
                    }
                    Err(queue_err) => {
                        logger.log_error(&format!("failed to record failure: {}", queue_err));
                    }
                }
            }
        }
    }

    /// Keep the claim's lease alive while the job runs.
    fn spawn_heartbeat(ctx: Arc<JobContext>, claim: Claim) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ctx.lease_heartbeat);
            interval.tick().await;
            loop {
                interval.tick().await;
                match ctx.queue.extend_lease(&claim).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(job_id = %claim.job_id(), "Lease lost; job may be redelivered");
                        break;
                    }
                    Err(e) => warn!(job_id = %claim.job_id(), "Failed to extend lease: {}", e),
                }
            }
        })
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
