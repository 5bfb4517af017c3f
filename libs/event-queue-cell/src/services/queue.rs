use chrono::Utc;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::QueueError;
use crate::models::WebhookJob;

const JOB_KEY_PREFIX: &str = "webhook_job:";
const QUEUE_PENDING: &str = "webhook_queue:pending";
const QUEUE_PROCESSING: &str = "webhook_queue:processing";
const QUEUE_DELAYED: &str = "webhook_queue:delayed";

/// Redis-backed delivery queue. Pending and processing are lists bridged by
/// BRPOPLPUSH so a crashed worker never loses a job; retries wait in a
/// delayed sorted set scored by their due time.
pub struct RedisQueueService {
    pool: Pool,
    visibility_timeout_secs: u64,
}

impl RedisQueueService {
    pub async fn new(config: &AppConfig) -> Result<Self, QueueError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| QueueError::Unavailable(format!("pool creation failed: {}", e)))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| QueueError::Unavailable(format!("connection failed: {}", e)))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("Redis queue service initialized");

        Ok(Self {
            pool,
            visibility_timeout_secs: config.job_visibility_timeout_secs,
        })
    }

    pub async fn enqueue(&self, job: &WebhookJob) -> Result<(), QueueError> {
        let mut conn = self.get_connection().await?;

        self.store_job(&mut conn, job).await?;
        let _: () = conn.lpush(QUEUE_PENDING, job.job_id.to_string()).await?;

        debug!("Job {} enqueued for event {}", job.job_id, job.event_id);
        Ok(())
    }

    /// Blocks briefly for the next pending job and claims it for the worker.
    /// The job stays on the processing list until acked, so an interrupted
    /// worker leaves it recoverable by the janitor.
    pub async fn dequeue(&self, worker_id: &str) -> Result<Option<WebhookJob>, QueueError> {
        let mut conn = self.get_connection().await?;

        let job_id: Option<String> = conn
            .brpoplpush(QUEUE_PENDING, QUEUE_PROCESSING, 1.0)
            .await?;

        let Some(job_id) = job_id else {
            return Ok(None);
        };

        let Some(mut job) = self.load_job(&mut conn, &job_id).await? else {
            // Record expired while its id sat in the queue; drop the orphan.
            let _: () = conn.lrem(QUEUE_PROCESSING, 1, &job_id).await?;
            return Ok(None);
        };

        job.attempt_count += 1;
        job.dequeued_at = Some(Utc::now());
        job.worker_id = Some(worker_id.to_string());
        self.store_job(&mut conn, &job).await?;

        debug!(
            "Job {} dequeued by {} (attempt {}/{})",
            job.job_id, worker_id, job.attempt_count, job.max_attempts
        );
        Ok(Some(job))
    }

    /// Removes a finished job from the processing list and deletes its record.
    pub async fn ack(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.get_connection().await?;
        let _: () = conn.lrem(QUEUE_PROCESSING, 1, job_id.to_string()).await?;
        let _: () = conn.del(format!("{}{}", JOB_KEY_PREFIX, job_id)).await?;
        Ok(())
    }

    /// Moves a failed job off the processing list into the delayed set, due
    /// again after `delay_secs`.
    pub async fn schedule_retry(
        &self,
        job: &mut WebhookJob,
        delay_secs: u64,
        error: &str,
    ) -> Result<(), QueueError> {
        let mut conn = self.get_connection().await?;

        job.dequeued_at = None;
        job.worker_id = None;
        job.last_error = Some(error.to_string());
        self.store_job(&mut conn, job).await?;

        let due_at = Utc::now().timestamp() + delay_secs as i64;
        let _: () = conn.lrem(QUEUE_PROCESSING, 1, job.job_id.to_string()).await?;
        let _: () = conn.zadd(QUEUE_DELAYED, job.job_id.to_string(), due_at).await?;

        info!(
            "Job {} scheduled for retry in {}s (attempt {}/{})",
            job.job_id, delay_secs, job.attempt_count, job.max_attempts
        );
        Ok(())
    }

    /// Promotes delayed jobs whose due time has passed back onto the pending
    /// list. Returns how many were promoted.
    pub async fn promote_due(&self) -> Result<u64, QueueError> {
        let mut conn = self.get_connection().await?;
        let now = Utc::now().timestamp();

        let due: Vec<String> = conn.zrangebyscore(QUEUE_DELAYED, "-inf", now).await?;
        let mut promoted = 0;

        for job_id in due {
            let removed: i64 = conn.zrem(QUEUE_DELAYED, &job_id).await?;
            // zrem deciding the race keeps two janitors from double-queueing.
            if removed > 0 {
                let _: () = conn.lpush(QUEUE_PENDING, &job_id).await?;
                promoted += 1;
            }
        }

        if promoted > 0 {
            debug!("Promoted {} delayed jobs", promoted);
        }
        Ok(promoted)
    }

    /// Requeues jobs stuck on the processing list past the visibility
    /// timeout, recovering work claimed by a worker that died mid-job.
    pub async fn reap_stale(&self) -> Result<u64, QueueError> {
        let mut conn = self.get_connection().await?;

        let in_flight: Vec<String> = conn.lrange(QUEUE_PROCESSING, 0, -1).await?;
        let cutoff = Utc::now() - chrono::Duration::seconds(self.visibility_timeout_secs as i64);
        let mut reaped = 0;

        for job_id in in_flight {
            let Some(mut job) = self.load_job(&mut conn, &job_id).await? else {
                let _: () = conn.lrem(QUEUE_PROCESSING, 1, &job_id).await?;
                continue;
            };

            let stale = match job.dequeued_at {
                Some(at) => at < cutoff,
                None => true,
            };
            if !stale {
                continue;
            }

            let removed: i64 = conn.lrem(QUEUE_PROCESSING, 1, &job_id).await?;
            if removed > 0 {
                job.dequeued_at = None;
                job.worker_id = None;
                self.store_job(&mut conn, &job).await?;
                let _: () = conn.lpush(QUEUE_PENDING, &job_id).await?;
                reaped += 1;
            }
        }

        if reaped > 0 {
            info!("Requeued {} stale in-flight jobs", reaped);
        }
        Ok(reaped)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<WebhookJob>, QueueError> {
        let mut conn = self.get_connection().await?;
        self.load_job(&mut conn, &job_id.to_string()).await
    }

    async fn get_connection(&self) -> Result<Connection, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::Unavailable(format!("connection failed: {}", e)))
    }

    async fn store_job(&self, conn: &mut Connection, job: &WebhookJob) -> Result<(), QueueError> {
        let key = format!("{}{}", JOB_KEY_PREFIX, job.job_id);
        let data = serde_json::to_string(job)?;
        let _: () = conn.hset(&key, "data", data).await?;
        // Job records expire after 7 days whatever happened to them.
        let _: () = conn.expire(&key, 604800).await?;
        Ok(())
    }

    async fn load_job(
        &self,
        conn: &mut Connection,
        job_id: &str,
    ) -> Result<Option<WebhookJob>, QueueError> {
        let key = format!("{}{}", JOB_KEY_PREFIX, job_id);
        let data: Option<String> = conn.hget(&key, "data").await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}
