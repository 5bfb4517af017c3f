use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub redis_url: Option<String>,

    // Messaging channel (WhatsApp Cloud API style)
    pub whatsapp_app_secret: String,
    pub whatsapp_verify_token: String,
    pub whatsapp_api_base: String,

    // Payment gateway (Razorpay)
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_webhook_secret: String,
    pub razorpay_api_base: String,

    // External NLU collaborators
    pub intent_classifier_url: String,
    pub reply_generator_url: String,

    // Dead-letter payload encryption key, base64-encoded 32 bytes
    pub dead_letter_key_b64: String,

    // Tunables
    pub worker_concurrency: usize,
    pub max_job_attempts: u32,
    pub retry_base_secs: u64,
    pub retry_cap_secs: u64,
    pub job_visibility_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub field_cache_ttl_secs: u64,
    pub consultation_fee_minor: i64,
    pub consultation_currency: String,
}

fn env_string(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", name);
        String::new()
    })
}

fn env_string_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid value, using default", name);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env_string("SUPABASE_URL"),
            supabase_service_key: env_string("SUPABASE_SERVICE_KEY"),
            redis_url: env::var("REDIS_URL").ok(),
            whatsapp_app_secret: env_string("WHATSAPP_APP_SECRET"),
            whatsapp_verify_token: env_string("WHATSAPP_VERIFY_TOKEN"),
            whatsapp_api_base: env_string_or(
                "WHATSAPP_API_BASE",
                "https://graph.facebook.com/v19.0",
            ),
            razorpay_key_id: env_string("RAZORPAY_KEY_ID"),
            razorpay_key_secret: env_string("RAZORPAY_KEY_SECRET"),
            razorpay_webhook_secret: env_string("RAZORPAY_WEBHOOK_SECRET"),
            razorpay_api_base: env_string_or("RAZORPAY_API_BASE", "https://api.razorpay.com/v1"),
            intent_classifier_url: env_string("INTENT_CLASSIFIER_URL"),
            reply_generator_url: env_string("REPLY_GENERATOR_URL"),
            dead_letter_key_b64: env_string("DEAD_LETTER_KEY"),
            worker_concurrency: env_parsed("WORKER_CONCURRENCY", 4),
            max_job_attempts: env_parsed("MAX_JOB_ATTEMPTS", 3),
            retry_base_secs: env_parsed("RETRY_BASE_SECS", 60),
            retry_cap_secs: env_parsed("RETRY_CAP_SECS", 900),
            job_visibility_timeout_secs: env_parsed("JOB_VISIBILITY_TIMEOUT_SECS", 120),
            request_timeout_secs: env_parsed("REQUEST_TIMEOUT_SECS", 30),
            field_cache_ttl_secs: env_parsed("FIELD_CACHE_TTL_SECS", 3600),
            consultation_fee_minor: env_parsed("CONSULTATION_FEE_MINOR", 50000),
            consultation_currency: env_string_or("CONSULTATION_CURRENCY", "INR"),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }

    pub fn is_channel_configured(&self) -> bool {
        !self.whatsapp_app_secret.is_empty() && !self.whatsapp_verify_token.is_empty()
    }

    pub fn is_payments_configured(&self) -> bool {
        !self.razorpay_key_id.is_empty()
            && !self.razorpay_key_secret.is_empty()
            && !self.razorpay_webhook_secret.is_empty()
    }
}
