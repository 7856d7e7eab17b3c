//! Link shortener client
//!
//! Best-effort URL shortening ahead of composition. Every failure falls
//! back to the original URL; the dispatcher only records the reason as
//! a warning on the resulting post.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value as JsonValue;

use crate::config::ShortenerConfig;

/// Provider tag for outcomes that never reached the shortener
pub const PROVIDER_NONE: &str = "none";
/// Provider tag for attempted shortener calls
pub const PROVIDER_ABVX: &str = "abvx-shortener";

/// Result of a shorten attempt; `url` is always usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortenOutcome {
    pub url: String,
    pub shortened: bool,
    pub provider: &'static str,
    pub error: Option<String>,
}

impl ShortenOutcome {
    fn fallback(original_url: &str, provider: &'static str, error: Option<String>) -> Self {
        Self {
            url: original_url.to_string(),
            shortened: false,
            provider,
            error,
        }
    }
}

/// Client for the link shortener service
pub struct LinkShortener {
    enabled: bool,
    endpoint: Option<String>,
    api_key: Option<String>,
    public_base_url: Option<String>,
    http_client: Client,
}

impl LinkShortener {
    /// Create a new shortener client from the posting configuration
    pub fn new(config: &ShortenerConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            enabled: config.enabled,
            endpoint: config.api_url.clone(),
            api_key: config.api_key.clone(),
            public_base_url: config.public_base_url.clone(),
            http_client,
        }
    }

    /// Returns a shareable form of `original_url`, falling back to the
    /// original on any shortener problem.
    pub async fn shareable_url(&self, original_url: &str) -> ShortenOutcome {
        if !self.enabled {
            return ShortenOutcome::fallback(original_url, PROVIDER_NONE, None);
        }

        let Some(endpoint) = self.endpoint.as_deref() else {
            return ShortenOutcome::fallback(
                original_url,
                PROVIDER_NONE,
                Some("SHORTENER_API_URL is not configured".to_string()),
            );
        };

        let mut request = self
            .http_client
            .post(endpoint)
            .json(&serde_json::json!({ "url": original_url }));
        if let Some(api_key) = self.api_key.as_deref() {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                return ShortenOutcome::fallback(original_url, PROVIDER_ABVX, Some(err.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return ShortenOutcome::fallback(
                original_url,
                PROVIDER_ABVX,
                Some(format!("shortener_http_{}", status.as_u16())),
            );
        }

        let json: JsonValue = match response.json().await {
            Ok(json) => json,
            Err(err) => {
                return ShortenOutcome::fallback(original_url, PROVIDER_ABVX, Some(err.to_string()));
            }
        };

        let Some(shortened) = extract_short_url(&json) else {
            return ShortenOutcome::fallback(
                original_url,
                PROVIDER_ABVX,
                Some("shortener_invalid_response".to_string()),
            );
        };

        if let Some(base) = self.public_base_url.as_deref() {
            if !shortened.starts_with(base) {
                return ShortenOutcome::fallback(
                    original_url,
                    PROVIDER_ABVX,
                    Some("shortener_unexpected_domain".to_string()),
                );
            }
        }

        ShortenOutcome {
            url: shortened.to_string(),
            shortened: true,
            provider: PROVIDER_ABVX,
            error: None,
        }
    }
}

/// Accepts the response shapes the shortener has been seen to emit:
/// a top-level `shortUrl`/`short_url`/`url`, or the same keys nested
/// under `data`.
fn extract_short_url(body: &JsonValue) -> Option<&str> {
    let top_level = body
        .get("shortUrl")
        .or_else(|| body.get("short_url"))
        .or_else(|| body.get("url"))
        .and_then(JsonValue::as_str)
        .filter(|url| !url.is_empty());
    if top_level.is_some() {
        return top_level;
    }

    let data = body.get("data")?;
    data.get("shortUrl")
        .or_else(|| data.get("short_url"))
        .and_then(JsonValue::as_str)
        .filter(|url| !url.is_empty())
}
