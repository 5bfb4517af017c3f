use std::sync::Arc;

use event_queue_cell::RedisQueueService;
use ledger_cell::{DeadLetterStore, IdempotencyLedger};
use shared_config::AppConfig;

/// Everything the ingestion handlers need, shared across requests.
pub struct WebhookState {
    pub config: Arc<AppConfig>,
    pub ledger: Arc<IdempotencyLedger>,
    pub dead_letters: Arc<DeadLetterStore>,
    pub queue: Arc<RedisQueueService>,
}
