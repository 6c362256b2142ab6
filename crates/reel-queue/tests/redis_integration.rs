//! Redis queue integration tests.

use std::time::Duration;

use futures_util::StreamExt;
use reel_models::{JobEvent, JobId, MediaId};
use reel_queue::{
    Backoff, FailureOutcome, JobEventSink, JobOptions, ProgressChannel, QueueConfig, RedisQueue,
    TranscodeJob, WorkQueue, STALLED_ERROR,
};

fn queue() -> RedisQueue {
    dotenvy::dotenv().ok();
    let config = QueueConfig {
        queue_name: format!("it-{}", JobId::new()),
        ..QueueConfig::from_env()
    };
    RedisQueue::new(config).expect("Failed to create Redis queue")
}

fn job() -> TranscodeJob {
    TranscodeJob::new(b"payload".to_vec(), "video/mp4", MediaId::from("m1"))
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_claim_order_and_complete() {
    let queue = queue();
    let later = queue.enqueue(job(), JobOptions::default().with_priority(1)).await.unwrap();
    let first = queue.enqueue(job(), JobOptions::default()).await.unwrap();

    let claim = queue.claim().await.unwrap().expect("claim");
    assert_eq!(claim.job.id, first);
    assert_eq!(claim.job.payload.file, b"payload");
    queue.complete(&claim).await.unwrap();

    let claim = queue.claim().await.unwrap().expect("claim");
    assert_eq!(claim.job.id, later);
    assert!(queue.extend_lease(&claim).await.unwrap());
    queue.complete(&claim).await.unwrap();

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.waiting, 0);
    assert_eq!(queue.recent_completed(1).await.unwrap()[0].id, later);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_retry_then_exhaust() {
    let queue = queue();
    let options = JobOptions::default()
        .with_attempts(2)
        .with_backoff(Backoff::Exponential { base_ms: 200 });
    queue.enqueue(job(), options).await.unwrap();

    let claim = queue.claim().await.unwrap().expect("claim");
    let outcome = queue.fail(&claim, "boom").await.unwrap();
    assert!(matches!(outcome, FailureOutcome::Retrying { attempt: 1, .. }));
    assert!(queue.claim().await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let claim = queue.claim().await.unwrap().expect("redelivered");
    assert_eq!(claim.job.attempts_made, 1);
    let outcome = queue.fail(&claim, "boom again").await.unwrap();
    assert_eq!(outcome, FailureOutcome::Exhausted { attempts: 2 });

    let failed = queue.recent_failed(10).await.unwrap();
    assert_eq!(failed[0].last_error.as_deref(), Some("boom again"));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_abandoned_job_fails_after_stall_limit() {
    dotenvy::dotenv().ok();
    let config = QueueConfig {
        queue_name: format!("it-{}", JobId::new()),
        lease: Duration::from_millis(50),
        max_stalled: 1,
        ..QueueConfig::from_env()
    };
    let queue = RedisQueue::new(config).expect("Failed to create Redis queue");
    let id = queue.enqueue(job(), JobOptions::default()).await.unwrap();

    assert!(queue.claim().await.unwrap().is_some());
    tokio::time::sleep(Duration::from_millis(80)).await;
    let claim = queue.claim().await.unwrap().expect("redelivered once");
    assert_eq!(claim.job.id, id);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(queue.claim().await.unwrap().is_none());

    let failed = queue.recent_failed(10).await.unwrap();
    assert_eq!(failed[0].id, id);
    assert_eq!(failed[0].last_error.as_deref(), Some(STALLED_ERROR));
    assert_eq!(queue.counts().await.unwrap().active, 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_events_reach_subscribers() {
    dotenvy::dotenv().ok();
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let channel = ProgressChannel::new(&url).unwrap();
    let job_id = JobId::new();

    let mut stream = channel.subscribe(&job_id).await.unwrap();
    channel.publish(&JobEvent::completed(job_id.clone())).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("event within timeout")
        .expect("stream open");
    assert_eq!(event.job_id(), &job_id);
}
