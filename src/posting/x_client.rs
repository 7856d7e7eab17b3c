//! X API client for post publication
//!
//! Wraps the v2 `/tweets` endpoint behind the configured connection
//! mode. Failures are classified outcomes, not errors: the dispatcher
//! records every attempt in the posts ledger and must never abort a
//! delivery because X misbehaved.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::Value as JsonValue;

use crate::config::XConfig;

/// Failure classification stored alongside a FAILED ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XErrorCode {
    NotConnected,
    NotImplemented,
    AuthError,
    RateLimit,
    ValidationError,
    NetworkError,
    RemoteError,
}

impl XErrorCode {
    /// Stable wire form used in ledger error strings
    pub fn as_str(&self) -> &'static str {
        match self {
            XErrorCode::NotConnected => "NOT_CONNECTED",
            XErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            XErrorCode::AuthError => "AUTH_ERROR",
            XErrorCode::RateLimit => "RATE_LIMIT",
            XErrorCode::ValidationError => "VALIDATION_ERROR",
            XErrorCode::NetworkError => "NETWORK_ERROR",
            XErrorCode::RemoteError => "REMOTE_ERROR",
        }
    }
}

/// Outcome of a publish attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XPostOutcome {
    Published { external_id: String },
    Rejected { code: XErrorCode, message: String },
}

/// Client for posting to X
pub struct XClient {
    mode: String,
    env_access_token: Option<String>,
    api_base: String,
    http_client: Client,
}

impl XClient {
    /// Create a new X client from the posting configuration
    pub fn new(config: &XConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            mode: config.connection_mode.to_lowercase(),
            env_access_token: config.access_token.clone(),
            api_base: config.api_base.clone(),
            http_client,
        }
    }

    /// Connection mode this client was built with
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// The environment token only applies in `manual_env` mode; an
    /// explicitly supplied token always wins.
    fn resolve_access_token<'t>(&'t self, explicit: Option<&'t str>) -> Option<&'t str> {
        if let Some(token) = explicit {
            return Some(token);
        }
        if self.mode == "manual_env" {
            return self.env_access_token.as_deref();
        }
        None
    }

    /// Publishes a post, classifying every failure mode.
    ///
    /// `stub_success` short-circuits with a fabricated external id so
    /// the rest of the pipeline can be exercised without credentials.
    pub async fn publish_post(&self, text: &str, access_token: Option<&str>) -> XPostOutcome {
        if self.mode == "stub_success" {
            return XPostOutcome::Published {
                external_id: format!("stub-{}", Utc::now().timestamp_millis()),
            };
        }

        if self.mode != "manual_env" {
            return XPostOutcome::Rejected {
                code: XErrorCode::NotImplemented,
                message: format!("Unsupported X_CONNECTION_MODE: {}", self.mode),
            };
        }

        let Some(token) = self.resolve_access_token(access_token) else {
            return XPostOutcome::Rejected {
                code: XErrorCode::NotConnected,
                message: "X account is not connected. Set X_ACCESS_TOKEN and sync /connect/x."
                    .to_string(),
            };
        };

        let request = self
            .http_client
            .post(format!("{}/tweets", self.api_base))
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", "Announcer/0.1")
            .json(&serde_json::json!({ "text": text }));

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return classify_transport_error(err),
        };

        let status = response.status();
        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(err) => return classify_transport_error(err),
        };
        let json: Option<JsonValue> = serde_json::from_str(&raw).ok();

        if !status.is_success() {
            return classify_api_error(status, json.as_ref());
        }

        let tweet_id = json
            .as_ref()
            .and_then(|body| body.get("data"))
            .and_then(|data| data.get("id"))
            .and_then(JsonValue::as_str);

        match tweet_id {
            Some(id) => XPostOutcome::Published {
                external_id: id.to_string(),
            },
            None => XPostOutcome::Rejected {
                code: XErrorCode::RemoteError,
                message: "X API success response does not include tweet id".to_string(),
            },
        }
    }
}

fn classify_api_error(status: StatusCode, body: Option<&JsonValue>) -> XPostOutcome {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return XPostOutcome::Rejected {
            code: XErrorCode::AuthError,
            message: to_error_message(body, &format!("X API auth error ({})", status.as_u16())),
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return XPostOutcome::Rejected {
            code: XErrorCode::RateLimit,
            message: to_error_message(body, "X API rate limited (429)"),
        };
    }

    if status == StatusCode::BAD_REQUEST {
        return XPostOutcome::Rejected {
            code: XErrorCode::ValidationError,
            message: to_error_message(body, "X API validation error (400)"),
        };
    }

    XPostOutcome::Rejected {
        code: XErrorCode::RemoteError,
        message: to_error_message(body, &format!("X API error ({})", status.as_u16())),
    }
}

fn classify_transport_error(err: reqwest::Error) -> XPostOutcome {
    if err.is_timeout() {
        return XPostOutcome::Rejected {
            code: XErrorCode::NetworkError,
            message: "X API request timed out".to_string(),
        };
    }

    XPostOutcome::Rejected {
        code: XErrorCode::NetworkError,
        message: err.to_string(),
    }
}

/// X problem documents carry `detail` and `title`; prefer them over the
/// status-derived fallback when present and non-empty.
fn to_error_message(body: Option<&JsonValue>, fallback: &str) -> String {
    let Some(body) = body else {
        return fallback.to_string();
    };

    if let Some(detail) = body.get("detail").and_then(JsonValue::as_str) {
        if !detail.is_empty() {
            return detail.to_string();
        }
    }

    if let Some(title) = body.get("title").and_then(JsonValue::as_str) {
        if !title.is_empty() {
            return title.to_string();
        }
    }

    fallback.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(mode: &str, api_base: &str, access_token: Option<&str>) -> XConfig {
        XConfig {
            connection_mode: mode.to_string(),
            access_token: access_token.map(str::to_string),
            account_id: None,
            account_username: None,
            api_base: api_base.to_string(),
            http_timeout_ms: 2_000,
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            authorize_base: "https://x.com/i/oauth2/authorize".to_string(),
            oauth_scope: "tweet.read tweet.write users.read offline.access".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stub_mode_fabricates_external_id() {
        let client = XClient::new(&test_config("stub_success", "http://unused", None));

        let outcome = client.publish_post("hello", None).await;
        match outcome {
            XPostOutcome::Published { external_id } => {
                assert!(external_id.starts_with("stub-"));
            }
            other => panic!("expected published outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_mode_is_not_implemented() {
        let client = XClient::new(&test_config("oauth_pkce", "http://unused", None));

        let outcome = client.publish_post("hello", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Rejected {
                code: XErrorCode::NotImplemented,
                message: "Unsupported X_CONNECTION_MODE: oauth_pkce".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_not_connected() {
        let client = XClient::new(&test_config("manual_env", "http://unused", None));

        let outcome = client.publish_post("hello", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Rejected {
                code: XErrorCode::NotConnected,
                message: "X account is not connected. Set X_ACCESS_TOKEN and sync /connect/x."
                    .to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_successful_publish_returns_tweet_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tweets"))
            .and(header("authorization", "Bearer env-token"))
            .and(body_json(serde_json::json!({ "text": "release is out" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "1845729", "text": "release is out" }
            })))
            .mount(&mock_server)
            .await;

        let client = XClient::new(&test_config(
            "manual_env",
            &mock_server.uri(),
            Some("env-token"),
        ));

        let outcome = client.publish_post("release is out", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Published {
                external_id: "1845729".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_explicit_token_wins_over_env_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tweets"))
            .and(header("authorization", "Bearer stored-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "99" }
            })))
            .mount(&mock_server)
            .await;

        let client = XClient::new(&test_config(
            "manual_env",
            &mock_server.uri(),
            Some("env-token"),
        ));

        let outcome = client.publish_post("hello", Some("stored-token")).await;
        assert_eq!(
            outcome,
            XPostOutcome::Published {
                external_id: "99".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_auth_error_prefers_body_detail() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "title": "Unauthorized",
                "detail": "Token has been revoked"
            })))
            .mount(&mock_server)
            .await;

        let client = XClient::new(&test_config("manual_env", &mock_server.uri(), Some("t")));

        let outcome = client.publish_post("hello", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Rejected {
                code: XErrorCode::AuthError,
                message: "Token has been revoked".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_forbidden_without_body_uses_fallback() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let client = XClient::new(&test_config("manual_env", &mock_server.uri(), Some("t")));

        let outcome = client.publish_post("hello", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Rejected {
                code: XErrorCode::AuthError,
                message: "X API auth error (403)".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limit_and_validation_classification() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = XClient::new(&test_config("manual_env", &mock_server.uri(), Some("t")));
        let outcome = client.publish_post("hello", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Rejected {
                code: XErrorCode::RateLimit,
                message: "X API rate limited (429)".to_string(),
            }
        );

        mock_server.reset().await;
        Mock::given(method("POST"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "detail": "Your Tweet text is too long."
            })))
            .mount(&mock_server)
            .await;

        let outcome = client.publish_post("hello", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Rejected {
                code: XErrorCode::ValidationError,
                message: "Your Tweet text is too long.".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_server_error_is_remote_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = XClient::new(&test_config("manual_env", &mock_server.uri(), Some("t")));

        let outcome = client.publish_post("hello", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Rejected {
                code: XErrorCode::RemoteError,
                message: "X API error (503)".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_success_without_tweet_id_is_remote_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tweets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {}
            })))
            .mount(&mock_server)
            .await;

        let client = XClient::new(&test_config("manual_env", &mock_server.uri(), Some("t")));

        let outcome = client.publish_post("hello", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Rejected {
                code: XErrorCode::RemoteError,
                message: "X API success response does not include tweet id".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_is_classified_as_network_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tweets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "data": { "id": "1" } }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let mut config = test_config("manual_env", &mock_server.uri(), Some("t"));
        config.http_timeout_ms = 200;
        let client = XClient::new(&config);

        let outcome = client.publish_post("hello", None).await;
        assert_eq!(
            outcome,
            XPostOutcome::Rejected {
                code: XErrorCode::NetworkError,
                message: "X API request timed out".to_string(),
            }
        );
    }
}
