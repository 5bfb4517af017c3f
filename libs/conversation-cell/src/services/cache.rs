use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Transient store for collected field values before consent. Process-local
/// and ephemeral on purpose: values must not touch durable storage until
/// consent is granted, and an entry lost to a restart was by definition
/// never consented. Entries expire after the configured TTL so stale PHI
/// does not linger in memory.
pub struct FieldCache {
    ttl: Duration,
    inner: RwLock<HashMap<Uuid, Entry>>,
}

struct Entry {
    values: HashMap<String, String>,
    expires_at: DateTime<Utc>,
}

impl FieldCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, conversation_id: Uuid, column: &str, value: String) {
        let mut inner = self.inner.write().await;
        let entry = inner.entry(conversation_id).or_insert_with(|| Entry {
            values: HashMap::new(),
            expires_at: Utc::now() + self.ttl,
        });
        entry.values.insert(column.to_string(), value);
        entry.expires_at = Utc::now() + self.ttl;
    }

    /// Removes and returns the cached values for a conversation. Expired
    /// entries come back empty.
    pub async fn take(&self, conversation_id: Uuid) -> HashMap<String, String> {
        let mut inner = self.inner.write().await;
        match inner.remove(&conversation_id) {
            Some(entry) if entry.expires_at > Utc::now() => entry.values,
            _ => HashMap::new(),
        }
    }

    pub async fn purge(&self, conversation_id: Uuid) {
        self.inner.write().await.remove(&conversation_id);
    }

    /// Drops every expired entry. Called periodically by the worker janitor.
    pub async fn evict_expired(&self) {
        let now = Utc::now();
        self.inner.write().await.retain(|_, entry| entry.expires_at > now);
    }
}
