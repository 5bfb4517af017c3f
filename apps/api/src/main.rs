use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use conversation_cell::{ChannelDeliveryClient, ConversationEngine, FieldCache};
use event_queue_cell::{RedisQueueService, WorkerPool};
use ledger_cell::{DeadLetterStore, IdempotencyLedger, PayloadCipher};
use payment_cell::ReconciliationService;
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use webhook_cell::WebhookState;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Carelink gateway");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    let supabase = Arc::new(SupabaseClient::new(&config));
    let ledger = Arc::new(IdempotencyLedger::new(Arc::clone(&supabase)));

    let cipher = PayloadCipher::from_base64_key(&config.dead_letter_key_b64)
        .expect("DEAD_LETTER_KEY must be a base64-encoded 32-byte key");
    let dead_letters = Arc::new(DeadLetterStore::new(Arc::clone(&supabase), cipher));

    let queue = Arc::new(
        RedisQueueService::new(&config)
            .await
            .expect("Redis must be reachable at startup"),
    );

    // Worker-side services
    let delivery = Arc::new(ChannelDeliveryClient::new(&config));
    let cache = Arc::new(FieldCache::new(config.field_cache_ttl_secs));
    let engine = Arc::new(ConversationEngine::new(
        &config,
        Arc::clone(&supabase),
        Arc::clone(&delivery),
        Arc::clone(&cache),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(Arc::clone(&supabase)));

    let workers = WorkerPool::new(
        &config,
        Arc::clone(&queue),
        Arc::clone(&ledger),
        Arc::clone(&dead_letters),
        Arc::clone(&engine),
        reconciliation,
    );
    tokio::spawn(async move {
        if let Err(e) = workers.start().await {
            error!("Worker pool exited: {}", e);
        }
    });

    // Expired intake entries are dropped even if the conversation never
    // reaches the consent step.
    let eviction_cache = Arc::clone(&cache);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            eviction_cache.evict_expired().await;
        }
    });

    let webhook_state = Arc::new(WebhookState {
        config: Arc::clone(&config),
        ledger,
        dead_letters,
        queue,
    });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(
        webhook_state,
        std::time::Duration::from_secs(config.request_timeout_secs),
    )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
