use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use conversation_cell::{ConversationEngine, ConversationError, InboundMessage};
use ledger_cell::{DeadLetterStore, IdempotencyLedger};
use payment_cell::{PaymentError, ReconciliationService};
use serde_json::Value;
use shared_config::AppConfig;
use shared_models::Provider;

use crate::error::QueueError;
use crate::models::{RetryPolicy, WebhookJob};
use crate::services::queue::RedisQueueService;

/// How often the janitor promotes due retries and reaps stalled jobs.
const JANITOR_INTERVAL_SECS: u64 = 15;

/// Pool of queue consumers plus a janitor task. Each consumer claims jobs
/// via the queue's blocking dequeue and routes them by provider; the janitor
/// moves due retries back to pending and recovers jobs from dead workers.
pub struct WorkerPool {
    worker_id: String,
    concurrency: usize,
    policy: RetryPolicy,
    queue: Arc<RedisQueueService>,
    ledger: Arc<IdempotencyLedger>,
    dead_letters: Arc<DeadLetterStore>,
    engine: Arc<ConversationEngine>,
    reconciliation: Arc<ReconciliationService>,
    is_shutdown: Arc<tokio::sync::RwLock<bool>>,
}

impl WorkerPool {
    pub fn new(
        config: &AppConfig,
        queue: Arc<RedisQueueService>,
        ledger: Arc<IdempotencyLedger>,
        dead_letters: Arc<DeadLetterStore>,
        engine: Arc<ConversationEngine>,
        reconciliation: Arc<ReconciliationService>,
    ) -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            concurrency: config.worker_concurrency,
            policy: RetryPolicy::from_config(config),
            queue,
            ledger,
            dead_letters,
            engine,
            reconciliation,
            is_shutdown: Arc::new(tokio::sync::RwLock::new(false)),
        }
    }

    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn start(&self) -> Result<(), QueueError> {
        info!("Starting webhook worker pool ({} consumers)", self.concurrency);

        let mut handles = Vec::new();

        for i in 0..self.concurrency {
            let consumer = self.clone_for_task();
            let name = format!("{}-{}", self.worker_id, i);
            handles.push(tokio::spawn(async move { consumer.consumer_loop(name).await }));
        }

        let janitor = self.clone_for_task();
        handles.push(tokio::spawn(async move { janitor.janitor_loop().await }));

        tokio::select! {
            _ = self.wait_for_shutdown() => {
                info!("Shutdown signal received, stopping worker pool");
            }
            _ = futures::future::join_all(handles) => {
                warn!("All worker tasks exited unexpectedly");
            }
        }

        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of worker pool");
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }

    async fn wait_for_shutdown(&self) {
        loop {
            if *self.is_shutdown.read().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    fn clone_for_task(&self) -> Self {
        Self {
            worker_id: self.worker_id.clone(),
            concurrency: self.concurrency,
            policy: self.policy,
            queue: Arc::clone(&self.queue),
            ledger: Arc::clone(&self.ledger),
            dead_letters: Arc::clone(&self.dead_letters),
            engine: Arc::clone(&self.engine),
            reconciliation: Arc::clone(&self.reconciliation),
            is_shutdown: Arc::clone(&self.is_shutdown),
        }
    }

    async fn consumer_loop(&self, name: String) {
        debug!("Consumer loop started: {}", name);

        loop {
            if *self.is_shutdown.read().await {
                debug!("Consumer {} stopping", name);
                break;
            }

            match self.queue.dequeue(&name).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job).await {
                        error!("Consumer {} failed to settle a job: {}", name, e);
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    error!("Consumer {} dequeue failed: {}", name, e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn janitor_loop(&self) {
        debug!("Janitor loop started");

        loop {
            if *self.is_shutdown.read().await {
                debug!("Janitor stopping");
                break;
            }

            if let Err(e) = self.queue.promote_due().await {
                error!("Janitor failed to promote delayed jobs: {}", e);
            }
            if let Err(e) = self.queue.reap_stale().await {
                error!("Janitor failed to reap stale jobs: {}", e);
            }

            tokio::time::sleep(Duration::from_secs(JANITOR_INTERVAL_SECS)).await;
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, event_id = %job.event_id, provider = %job.provider, attempt = job.attempt_count))]
    async fn process_job(&self, mut job: WebhookJob) -> Result<(), QueueError> {
        info!("Processing webhook job");

        match self.route(&job).await {
            Ok(()) => {
                self.queue.ack(job.job_id).await?;
                if let Err(e) = self.ledger.mark_processed(&job.event_id, job.provider).await {
                    // The work is done; a ledger write failure must not
                    // trigger a duplicate run of it.
                    error!("Failed to mark event processed in ledger: {}", e);
                }
                info!("Webhook job completed");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Webhook job attempt failed: {}", reason);

                if job.can_retry() {
                    let delay = self.policy.delay_with_jitter(job.attempt_count);
                    self.queue.schedule_retry(&mut job, delay, &reason).await?;
                } else {
                    if let Err(e) = self
                        .dead_letters
                        .store(&job.event_id, job.provider, &job.payload, &reason, job.attempt_count)
                        .await
                    {
                        error!("Failed to archive exhausted job to dead letters: {}", e);
                    }
                    if let Err(e) = self
                        .ledger
                        .mark_failed(&job.event_id, job.provider, &reason, job.attempt_count)
                        .await
                    {
                        error!("Failed to mark event failed in ledger: {}", e);
                    }
                    self.queue.ack(job.job_id).await?;
                }
                Ok(())
            }
        }
    }

    async fn route(&self, job: &WebhookJob) -> Result<(), String> {
        match job.provider {
            Provider::Whatsapp => self.process_channel_event(job).await,
            Provider::Razorpay => self.process_payment_event(job).await,
            Provider::Unknown => {
                // Accepted for auditability but there is nothing to run.
                info!("Ignoring event from unrecognized provider");
                Ok(())
            }
        }
    }

    async fn process_channel_event(&self, job: &WebhookJob) -> Result<(), String> {
        let messages = InboundMessage::parse_whatsapp(&job.payload);
        if messages.is_empty() {
            debug!("Channel event carries no text messages (status update or media)");
            return Ok(());
        }

        for message in &messages {
            match self.engine.handle_message(message).await {
                Ok(()) => {}
                // No doctor behind the receiving number; retrying will not
                // change that.
                Err(ConversationError::ChannelNotLinked(id)) => {
                    warn!("Dropping message for unlinked channel {}", id);
                }
                Err(e) => return Err(e.to_string()),
            }
        }

        Ok(())
    }

    async fn process_payment_event(&self, job: &WebhookJob) -> Result<(), String> {
        let event = job.payload.get("event").and_then(Value::as_str).unwrap_or("");
        if !matches!(event, "payment_link.paid" | "payment.captured") {
            debug!("Ignoring payment event type '{}'", event);
            return Ok(());
        }

        let payment = job
            .payload
            .pointer("/payload/payment/entity")
            .ok_or_else(|| "payment event missing payment entity".to_string())?;

        // Link-based flows identify the order by the payment-link entity;
        // order-based captures fall back to the payment's order id.
        let order_id = job
            .payload
            .pointer("/payload/payment_link/entity/id")
            .and_then(Value::as_str)
            .or_else(|| payment.get("order_id").and_then(Value::as_str))
            .ok_or_else(|| "payment event missing order reference".to_string())?;

        let payment_id = payment.get("id").and_then(Value::as_str);
        let amount_minor = payment.get("amount").and_then(Value::as_i64).unwrap_or(0);
        let currency = payment.get("currency").and_then(Value::as_str).unwrap_or("");

        let outcome = self
            .reconciliation
            .reconcile(order_id, payment_id, amount_minor, currency)
            .await
            .map_err(|e| match e {
                // The payment row may not be visible yet if the capture
                // callback raced link creation; retry covers that window.
                PaymentError::NotFound(id) => format!("payment record {} not found yet", id),
                other => other.to_string(),
            })?;

        if let Some(notice) = outcome.notification {
            // Confirmation delivery is best-effort; the capture stands.
            if let Err(e) = self
                .engine
                .notify_contact(notice.doctor_id, &notice.contact_id, &notice.text)
                .await
            {
                warn!("Failed to deliver payment confirmation: {}", e);
            }
        }

        Ok(())
    }
}
