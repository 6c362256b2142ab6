//! Redis-backed work queue.
//!
//! Layout under `reel:<queue>`:
//! - `:job:<id>` hash with the JSON envelope (`data`) and mutable fields
//!   (`state`, `attempts`, `stalled`, `priority`, `seq`, `token`, `last_error`,
//!   `finished_at`)
//! - `:wait` ZSET scored `priority × 2^32 + seq`
//! - `:delayed` ZSET scored by ready-at ms
//! - `:active` ZSET scored by lease expiry ms
//! - `:completed` / `:failed` LISTs of ids, newest first, trimmed to retention
//! - `:seq` insertion counter
//!
//! A lease that expires puts the job back in `:wait`; once it has expired
//! more than `max_stalled` times the job goes to `:failed` instead.
//!
//! Every state transition is a Lua script so claims are single-owner across
//! worker processes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::Script;
use tracing::{debug, info, warn};
use uuid::Uuid;

use reel_models::{JobId, JobState};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobOptions, JobSummary, QueuedJob, TranscodeJob};
use crate::queue::{failure_outcome, Claim, FailureOutcome, QueueConfig, QueueCounts, WorkQueue, STALLED_ERROR};

const ENQUEUE_SCRIPT: &str = r#"
local seq = redis.call('INCR', KEYS[1])
local job_key = ARGV[1] .. ARGV[2]
local priority = tonumber(ARGV[4])
local delay = tonumber(ARGV[5])
local state = 'waiting'
if delay > 0 then state = 'delayed' end
redis.call('HSET', job_key, 'data', ARGV[3], 'state', state, 'attempts', 0,
    'priority', priority, 'seq', seq)
if delay > 0 then
    redis.call('ZADD', KEYS[3], tonumber(ARGV[6]) + delay, ARGV[2])
else
    redis.call('ZADD', KEYS[2], priority * 4294967296 + seq, ARGV[2])
end
return seq
"#;

const CLAIM_SCRIPT: &str = r#"
local now = tonumber(ARGV[2])
local function requeue(id)
    local job_key = ARGV[1] .. id
    local priority = tonumber(redis.call('HGET', job_key, 'priority') or '0')
    local seq = tonumber(redis.call('HGET', job_key, 'seq') or '0')
    redis.call('ZADD', KEYS[1], priority * 4294967296 + seq, id)
    redis.call('HSET', job_key, 'state', 'waiting')
    redis.call('HDEL', job_key, 'token')
end
for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)) do
    redis.call('ZREM', KEYS[2], id)
    requeue(id)
end
for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', now)) do
    redis.call('ZREM', KEYS[3], id)
    local job_key = ARGV[1] .. id
    local stalled = redis.call('HINCRBY', job_key, 'stalled', 1)
    if stalled > tonumber(ARGV[5]) then
        redis.call('HSET', job_key, 'state', 'failed', 'finished_at', ARGV[7], 'last_error', ARGV[8])
        redis.call('HDEL', job_key, 'token')
        redis.call('LPUSH', KEYS[4], id)
        local keep = tonumber(ARGV[6])
        for _, old in ipairs(redis.call('LRANGE', KEYS[4], keep, -1)) do
            redis.call('DEL', ARGV[1] .. old)
        end
        redis.call('LTRIM', KEYS[4], 0, keep - 1)
    else
        requeue(id)
    end
end
local popped = redis.call('ZPOPMIN', KEYS[1])
if #popped == 0 then
    return false
end
local id = popped[1]
local job_key = ARGV[1] .. id
redis.call('HSET', job_key, 'state', 'active', 'token', ARGV[4])
redis.call('ZADD', KEYS[3], now + tonumber(ARGV[3]), id)
local fields = redis.call('HMGET', job_key, 'data', 'attempts')
return {id, fields[1], tonumber(fields[2] or '0')}
"#;

/// Shared by complete and exhausted failure: move to a history list and trim.
const FINISH_SCRIPT: &str = r#"
local job_key = ARGV[1] .. ARGV[2]
if redis.call('HGET', job_key, 'token') ~= ARGV[3] then
    return 0
end
redis.call('ZREM', KEYS[1], ARGV[2])
redis.call('HSET', job_key, 'state', ARGV[4], 'finished_at', ARGV[5], 'attempts', ARGV[7])
if ARGV[8] ~= '' then
    redis.call('HSET', job_key, 'last_error', ARGV[8])
end
redis.call('HDEL', job_key, 'token')
redis.call('LPUSH', KEYS[2], ARGV[2])
local keep = tonumber(ARGV[6])
for _, old in ipairs(redis.call('LRANGE', KEYS[2], keep, -1)) do
    redis.call('DEL', ARGV[1] .. old)
end
redis.call('LTRIM', KEYS[2], 0, keep - 1)
return 1
"#;

const RETRY_SCRIPT: &str = r#"
local job_key = ARGV[1] .. ARGV[2]
if redis.call('HGET', job_key, 'token') ~= ARGV[3] then
    return 0
end
redis.call('ZREM', KEYS[1], ARGV[2])
redis.call('HSET', job_key, 'state', 'delayed', 'attempts', ARGV[4], 'last_error', ARGV[5])
redis.call('HDEL', job_key, 'token')
redis.call('ZADD', KEYS[2], tonumber(ARGV[6]), ARGV[2])
return 1
"#;

const EXTEND_SCRIPT: &str = r#"
if redis.call('HGET', ARGV[1] .. ARGV[2], 'token') ~= ARGV[3] then
    return 0
end
redis.call('ZADD', KEYS[1], 'XX', tonumber(ARGV[4]), ARGV[2])
return 1
"#;

/// `WorkQueue` on Redis.
pub struct RedisQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn key(&self, suffix: &str) -> String {
        format!("reel:{}:{}", self.config.queue_name, suffix)
    }

    fn job_prefix(&self) -> String {
        self.key("job:")
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    async fn finish(
        &self,
        job_id: &JobId,
        token: &str,
        state: JobState,
        keep: usize,
        attempts: u32,
        error: Option<&str>,
    ) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let history = match state {
            JobState::Completed => self.key("completed"),
            _ => self.key("failed"),
        };

        let finished: i32 = Script::new(FINISH_SCRIPT)
            .key(self.key("active"))
            .key(history)
            .arg(self.job_prefix())
            .arg(job_id.as_str())
            .arg(token)
            .arg(state.as_str())
            .arg(Utc::now().to_rfc3339())
            .arg(keep.max(1))
            .arg(attempts)
            .arg(error.unwrap_or(""))
            .invoke_async(&mut conn)
            .await?;

        if finished == 0 {
            return Err(QueueError::LeaseLost(job_id.to_string()));
        }
        Ok(())
    }

    async fn history(&self, list: &str, limit: usize) -> QueueResult<Vec<JobSummary>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let ids: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key(list))
            .arg(0)
            .arg(limit as isize - 1)
            .query_async(&mut conn)
            .await?;

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let fields: (Option<String>, Option<u32>, Option<String>, Option<String>) = redis::cmd("HMGET")
                .arg(format!("{}{}", self.job_prefix(), id))
                .arg("state")
                .arg("attempts")
                .arg("last_error")
                .arg("finished_at")
                .query_async(&mut conn)
                .await?;

            // Evicted between LRANGE and HMGET
            let Some(state) = fields.0.as_deref().and_then(JobState::parse) else {
                continue;
            };
            summaries.push(JobSummary {
                id: JobId::from_string(id),
                state,
                attempts_made: fields.1.unwrap_or(0),
                last_error: fields.2,
                finished_at: fields
                    .3
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|d| d.with_timezone(&Utc)),
            });
        }
        Ok(summaries)
    }
}

#[async_trait]
impl WorkQueue for RedisQueue {
    async fn enqueue(&self, job: TranscodeJob, options: JobOptions) -> QueueResult<JobId> {
        let queued = QueuedJob::new(job, options);
        let data = serde_json::to_string(&queued)?;
        let mut conn = self.conn().await?;

        let _seq: i64 = Script::new(ENQUEUE_SCRIPT)
            .key(self.key("seq"))
            .key(self.key("wait"))
            .key(self.key("delayed"))
            .arg(self.job_prefix())
            .arg(queued.id.as_str())
            .arg(data)
            .arg(queued.options.priority)
            .arg(options.delay_ms)
            .arg(Self::now_ms())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!(
            job_id = %queued.id,
            media_id = %queued.payload.video_id,
            priority = queued.options.priority,
            "Enqueued transcode job"
        );
        Ok(queued.id)
    }

    async fn claim(&self) -> QueueResult<Option<Claim>> {
        let mut conn = self.conn().await?;
        let token = Uuid::new_v4().to_string();

        let claimed: Option<(String, String, u32)> = Script::new(CLAIM_SCRIPT)
            .key(self.key("wait"))
            .key(self.key("delayed"))
            .key(self.key("active"))
            .key(self.key("failed"))
            .arg(self.job_prefix())
            .arg(Self::now_ms())
            .arg(self.config.lease.as_millis() as u64)
            .arg(&token)
            .arg(self.config.max_stalled)
            .arg(self.config.keep_failed.max(1))
            .arg(Utc::now().to_rfc3339())
            .arg(STALLED_ERROR)
            .invoke_async(&mut conn)
            .await?;

        let Some((id, data, attempts)) = claimed else {
            return Ok(None);
        };

        let mut job: QueuedJob = match serde_json::from_str(&data) {
            Ok(job) => job,
            Err(e) => {
                // Park the malformed job so it is not handed out again
                warn!(job_id = %id, "Failed to parse job envelope: {}", e);
                self.finish(
                    &JobId::from_string(id.clone()),
                    &token,
                    JobState::Failed,
                    self.config.keep_failed,
                    attempts,
                    Some("invalid job envelope"),
                )
                .await?;
                return Err(QueueError::invalid_payload(format!("job {}: {}", id, e)));
            }
        };
        job.attempts_made = attempts;

        debug!(job_id = %job.id, attempt = job.attempt(), "Claimed job");
        Ok(Some(Claim { job, token }))
    }

    async fn complete(&self, claim: &Claim) -> QueueResult<()> {
        self.finish(
            claim.job_id(),
            &claim.token,
            JobState::Completed,
            self.config.keep_completed,
            claim.job.attempts_made,
            None,
        )
        .await?;
        info!(job_id = %claim.job_id(), "Job completed");
        Ok(())
    }

    async fn fail(&self, claim: &Claim, error: &str) -> QueueResult<FailureOutcome> {
        let outcome = failure_outcome(&claim.job);

        match outcome {
            FailureOutcome::Retrying { attempt, delay } => {
                let mut conn = self.conn().await?;
                let ready_at = Self::now_ms() + delay.as_millis() as i64;
                let retried: i32 = Script::new(RETRY_SCRIPT)
                    .key(self.key("active"))
                    .key(self.key("delayed"))
                    .arg(self.job_prefix())
                    .arg(claim.job_id().as_str())
                    .arg(&claim.token)
                    .arg(attempt)
                    .arg(error)
                    .arg(ready_at)
                    .invoke_async(&mut conn)
                    .await?;
                if retried == 0 {
                    return Err(QueueError::LeaseLost(claim.job_id().to_string()));
                }
            }
            FailureOutcome::Exhausted { attempts } => {
                self.finish(
                    claim.job_id(),
                    &claim.token,
                    JobState::Failed,
                    self.config.keep_failed,
                    attempts,
                    Some(error),
                )
                .await?;
            }
        }

        Ok(outcome)
    }

    async fn extend_lease(&self, claim: &Claim) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let expiry = Self::now_ms() + self.config.lease.as_millis() as i64;
        let extended: i32 = Script::new(EXTEND_SCRIPT)
            .key(self.key("active"))
            .arg(self.job_prefix())
            .arg(claim.job_id().as_str())
            .arg(&claim.token)
            .arg(expiry)
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        let mut conn = self.conn().await?;
        let (waiting, delayed, active, completed, failed): (u64, u64, u64, u64, u64) = redis::pipe()
            .cmd("ZCARD")
            .arg(self.key("wait"))
            .cmd("ZCARD")
            .arg(self.key("delayed"))
            .cmd("ZCARD")
            .arg(self.key("active"))
            .cmd("LLEN")
            .arg(self.key("completed"))
            .cmd("LLEN")
            .arg(self.key("failed"))
            .query_async(&mut conn)
            .await?;

        Ok(QueueCounts {
            waiting,
            delayed,
            active,
            completed,
            failed,
        })
    }

    async fn recent_completed(&self, limit: usize) -> QueueResult<Vec<JobSummary>> {
        self.history("completed", limit).await
    }

    async fn recent_failed(&self, limit: usize) -> QueueResult<Vec<JobSummary>> {
        self.history("failed", limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let queue = RedisQueue::new(QueueConfig {
            queue_name: "transcode".to_string(),
            ..QueueConfig::default()
        })
        .unwrap();
        assert_eq!(queue.key("wait"), "reel:transcode:wait");
        assert_eq!(queue.job_prefix(), "reel:transcode:job:");
    }
}
