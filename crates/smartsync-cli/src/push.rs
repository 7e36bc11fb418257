//! Signed webhook pushes with exponential back-off.
//!
//! Every attempt is re-signed with a fresh timestamp so a retry never trips
//! the server's replay window.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use smartsync_engine::{sign_payload, SignatureError};
use thiserror::Error;

const WEBHOOK_PATH: &str = "/api/v1/sync/webhook";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub(crate) enum PushError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("push body is not valid JSON: {0}")]
    Body(#[from] serde_json::Error),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Network failures, 5xx, and 429 are worth another attempt.
pub(crate) fn is_retriable(err: &PushError) -> bool {
    match err {
        PushError::Http(e) => e.is_timeout() || e.is_connect(),
        PushError::Status { status, .. } => {
            status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
        }
        PushError::Body(_) | PushError::Signature(_) => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors, doubling the delay from `backoff_base_ms` each time (capped at 60 s,
/// ±25 % jitter).
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, PushError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PushError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "webhook push failed, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// The three headers a signed push carries, in sending order.
pub(crate) fn signed_headers(
    api_key: &str,
    body: &[u8],
    timestamp_ms: i64,
) -> Result<[(&'static str, String); 3], SignatureError> {
    let timestamp = timestamp_ms.to_string();
    let signature = sign_payload(api_key, body, &timestamp)?;
    Ok([
        ("x-api-key", api_key.to_string()),
        ("x-timestamp", timestamp),
        ("x-signature", signature),
    ])
}

/// Accepts a `{"payload": [...]}` document or a bare array and returns the
/// exact bytes to send.
pub(crate) fn load_push_body(raw: &[u8]) -> Result<Vec<u8>, PushError> {
    let value: Value = serde_json::from_slice(raw)?;
    if value.is_array() {
        return Ok(serde_json::to_vec(&serde_json::json!({ "payload": value }))?);
    }
    Ok(raw.to_vec())
}

pub(crate) struct PushClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl PushClient {
    pub(crate) fn new(base_url: &str, api_key: &str) -> Result<Self, PushError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}{WEBHOOK_PATH}", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            max_retries: 3,
            backoff_base_ms: 1_000,
        })
    }

    #[must_use]
    pub(crate) fn with_retries(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Sends `body` and returns the server's JSON response.
    pub(crate) async fn push(&self, body: &[u8]) -> Result<Value, PushError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || self.send_once(body)).await
    }

    async fn send_once(&self, body: &[u8]) -> Result<Value, PushError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        let now_ms = chrono::Utc::now().timestamp_millis();
        for (name, value) in signed_headers(&self.api_key, body, now_ms)? {
            request = request.header(name, value);
        }

        let response = request.body(body.to_vec()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Status { status, body });
        }
        Ok(response.json::<Value>().await?)
    }
}

#[cfg(test)]
#[path = "push_test.rs"]
mod tests;
