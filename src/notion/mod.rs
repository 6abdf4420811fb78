//! Notion REST API plumbing.
//!
//! Modules:
//! - properties: tagged property-value model + extraction
//! - client: database schema validation, task queries, status mutations

pub mod client;
pub mod properties;

use std::time::Duration;

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, thiserror::Error)]
pub enum NotionError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Notion API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("{0}")]
    Config(String),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bounded retry for rate-limited requests. Only HTTP 429 retries; every
/// other failure surfaces after a single attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay when the server sends no usable Retry-After.
    pub default_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Server-suggested delay from a Retry-After header (seconds), capped at
/// the policy maximum; the policy default when absent or unparseable.
fn retry_delay(policy: &RetryPolicy, retry_after: Option<&reqwest::header::HeaderValue>) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.trim().parse::<u64>() {
            return Duration::from_millis(secs.saturating_mul(1_000).min(policy.max_delay_ms));
        }
    }
    Duration::from_millis(policy.default_delay_ms)
}

/// Send a request, transparently absorbing rate-limit bounces.
///
/// Returns the final response — including a final 429 once attempts are
/// exhausted — so callers keep one status-mapping path.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, NotionError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(NotionError::Http);
        };

        let response = cloned.send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt < attempts {
            let delay = retry_delay(
                policy,
                response.headers().get(reqwest::header::RETRY_AFTER),
            );
            log::warn!(
                "notion rate limited, retry {}/{} (sleep {:?})",
                attempt,
                attempts,
                delay
            );
            tokio::time::sleep(delay).await;
            continue;
        }
        return Ok(response);
    }
    unreachable!("loop always returns within max_attempts")
}
