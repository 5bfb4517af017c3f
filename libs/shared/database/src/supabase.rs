use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unique/exclusion constraint violation. Callers racing on the same row
    /// rely on this variant being distinguishable.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for DbError {
    fn from(e: reqwest::Error) -> Self {
        DbError::Other(e.to_string())
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.supabase_url.clone(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    /// Test-only constructor pointing at an arbitrary base URL.
    pub fn with_base_url(base_url: &str, service_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            service_key: service_key.to_string(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&self.service_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.service_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let response = self.execute(method, path, body, extra_headers).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<reqwest::Response, DbError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut headers = self.headers();
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DbError::Auth(error_text),
                StatusCode::NOT_FOUND => DbError::NotFound(error_text),
                StatusCode::CONFLICT => DbError::Conflict(error_text),
                _ => DbError::Other(format!("API error ({}): {}", status, error_text)),
            });
        }

        Ok(response)
    }

    /// Insert with `Prefer: return=representation` so the created row comes
    /// back in the response body. Constraint violations map to `DbError::Conflict`.
    pub async fn insert_returning(&self, path: &str, body: Value) -> Result<Vec<Value>, DbError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(Method::POST, path, Some(body), Some(headers))
            .await
    }

    /// Insert that silently ignores duplicate-key rows. Used where a duplicate
    /// means "already seen", not an error.
    pub async fn insert_ignore_duplicates(&self, path: &str, body: Value) -> Result<(), DbError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=ignore-duplicates,return=minimal"),
        );

        match self.execute(Method::POST, path, Some(body), Some(headers)).await {
            Ok(_) => Ok(()),
            // Older PostgREST deployments report the duplicate anyway.
            Err(DbError::Conflict(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }

    /// Upsert: insert or merge into the existing row on conflict.
    pub async fn upsert(&self, path: &str, body: Value) -> Result<(), DbError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );

        let _ = self
            .execute(Method::POST, path, Some(body), Some(headers))
            .await?;
        Ok(())
    }

    /// PATCH that ignores the (usually empty) response body.
    pub async fn update(&self, path: &str, body: Value) -> Result<(), DbError> {
        let _ = self.execute(Method::PATCH, path, Some(body), None).await?;
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
