use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::Provider;

/// One accepted webhook delivery, queued for asynchronous processing. The
/// payload rides along verbatim; workers re-parse it per provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookJob {
    pub job_id: Uuid,
    /// Provider-scoped event id, the idempotency key in the ledger.
    pub event_id: String,
    pub provider: Provider,
    pub payload: Value,
    /// Request id of the HTTP delivery that produced this job.
    pub correlation_id: String,
    pub enqueued_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    /// Set when a worker picks the job up; used to reap stalled deliveries.
    pub dequeued_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
}

impl WebhookJob {
    pub fn new(
        event_id: String,
        provider: Provider,
        payload: Value,
        correlation_id: String,
        max_attempts: u32,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            event_id,
            provider,
            payload,
            correlation_id,
            enqueued_at: Utc::now(),
            attempt_count: 0,
            max_attempts,
            dequeued_at: None,
            worker_id: None,
            last_error: None,
        }
    }

    /// Whether another attempt is allowed after the current one failed.
    /// `attempt_count` is the number of the attempt that just ran, so the
    /// job retries until exactly `max_attempts` deliveries have happened.
    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_attempts
    }
}

/// Backoff schedule for failed jobs, derived from configuration. Delays
/// double per attempt up to the cap; jitter is added at scheduling time.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub cap_secs: u64,
    pub jitter_secs: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.max_job_attempts,
            base_delay_secs: config.retry_base_secs,
            cap_secs: config.retry_cap_secs,
            jitter_secs: config.retry_base_secs / 4,
        }
    }

    /// Deterministic delay before the given attempt (1-based), without
    /// jitter: base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        self.base_delay_secs
            .saturating_mul(1u64 << exponent)
            .min(self.cap_secs)
    }

    pub fn delay_with_jitter(&self, attempt: u32) -> u64 {
        use rand::Rng;
        let jitter = if self.jitter_secs == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_secs)
        };
        self.delay_for(attempt).saturating_add(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_secs: 60,
            cap_secs: 900,
            jitter_secs: 15,
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let p = policy();
        assert_eq!(p.delay_for(1), 60);
        assert_eq!(p.delay_for(2), 120);
        assert_eq!(p.delay_for(3), 240);
    }

    #[test]
    fn delay_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(10), 900);
        assert_eq!(p.delay_for(64), 900);
    }

    #[test]
    fn jittered_delay_stays_within_bounds() {
        let p = policy();
        for _ in 0..20 {
            let d = p.delay_with_jitter(2);
            assert!((120..=135).contains(&d));
        }
    }

    #[test]
    fn retry_allowance_tracks_max_attempts() {
        let mut job = WebhookJob::new(
            "evt_1".to_string(),
            shared_models::Provider::Whatsapp,
            serde_json::json!({}),
            "req-1".to_string(),
            3,
        );
        // After the first failed delivery two more are still allowed.
        job.attempt_count = 1;
        assert!(job.can_retry());
        job.attempt_count = 2;
        assert!(job.can_retry());
        job.attempt_count = 3;
        assert!(!job.can_retry());
    }

    #[test]
    fn failing_job_is_delivered_exactly_max_attempts_times() {
        let mut job = WebhookJob::new(
            "evt_1".to_string(),
            shared_models::Provider::Whatsapp,
            serde_json::json!({}),
            "req-1".to_string(),
            3,
        );

        // Dequeue increments the attempt counter, then the attempt fails;
        // the job must go around until three deliveries have run.
        let mut deliveries = 0;
        loop {
            job.attempt_count += 1;
            deliveries += 1;
            if !job.can_retry() {
                break;
            }
        }
        assert_eq!(deliveries, 3);
    }
}
