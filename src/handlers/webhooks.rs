//! # Webhook Handlers
//!
//! GitHub delivery intake: signature verification against the raw body,
//! payload parsing, and hand-off to the ingestion pipeline. Unsupported
//! event kinds are acknowledged so GitHub stops redelivering them.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::ingestion::{CreatePayload, IngestionPipeline, ReleasePayload};
use crate::server::AppState;
use crate::webhook_verification::{VerificationError, verify_github_webhook};

/// Webhook accept response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAcceptResponse {
    /// `accepted:{event}` for handled kinds, `ignored:{event}` otherwise
    pub status: String,
}

/// Accept a GitHub webhook delivery
///
/// The signature is verified over the raw body before anything is parsed.
/// `release` and `create` deliveries run the ingestion pipeline; every
/// other event kind is acknowledged and dropped.
#[utoipa::path(
    post,
    path = "/webhooks/github",
    params(
        ("X-GitHub-Event" = String, Header, description = "GitHub event kind (e.g., release, create)"),
        ("X-Hub-Signature-256" = String, Header, description = "HMAC-SHA256 signature of the request body (sha256=<hex>)"),
    ),
    request_body(content = JsonValue, description = "Raw GitHub webhook payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Delivery accepted or deliberately ignored", body = WebhookAcceptResponse),
        (status = 400, description = "Malformed signature header, JSON body, or payload schema", body = ApiError),
        (status = 401, description = "Signature verification failed", body = ApiError),
        (status = 500, description = "Webhook secret not configured", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn ingest_github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAcceptResponse>, ApiError> {
    let Some(secret) = state.config.webhook_github_secret.as_deref() else {
        warn!("Refusing webhook delivery: no webhook secret configured");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "GitHub webhook secret is not configured",
        ));
    };

    if let Err(err) = verify_github_webhook(&body, &headers, secret) {
        return Err(match err {
            VerificationError::InvalidSignatureFormat { .. } => {
                warn!(error = %err, "Malformed webhook signature header");
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_FAILED",
                    &err.to_string(),
                )
            }
            _ => {
                warn!(error = %err, "Webhook signature verification failed");
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "INVALID_SIGNATURE",
                    "Invalid webhook signature",
                )
            }
        });
    }

    let event = headers
        .get("x-github-event")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let raw: JsonValue = serde_json::from_slice(&body).map_err(|err| {
        debug!(error = %err, "Webhook body is not valid JSON");
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Invalid JSON payload",
        )
    })?;

    let pipeline = IngestionPipeline::new(&state.db, &state.config);

    let status = match event.as_str() {
        "release" => {
            let payload: ReleasePayload = serde_json::from_value(raw.clone()).map_err(|err| {
                debug!(error = %err, "Release payload does not match expected schema");
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_FAILED",
                    "Unsupported payload schema",
                )
            })?;
            pipeline.handle_release_published(payload, raw).await?;
            "accepted:release".to_string()
        }
        "create" => {
            let payload: CreatePayload = serde_json::from_value(raw.clone()).map_err(|err| {
                debug!(error = %err, "Create payload does not match expected schema");
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_FAILED",
                    "Unsupported payload schema",
                )
            })?;
            pipeline.handle_tag_created(payload, raw).await?;
            "accepted:create".to_string()
        }
        other => {
            info!(event = %other, "Ignoring unsupported webhook event kind");
            format!("ignored:{}", other)
        }
    };

    Ok(Json(WebhookAcceptResponse { status }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::server::tests_support::{setup_test_app, test_config};
    use crate::webhook_verification::signature_header;

    fn release_body(repo_id: i64, release_id: i64, tag: &str) -> String {
        serde_json::json!({
            "action": "published",
            "repository": {
                "id": repo_id,
                "name": "widget",
                "full_name": "acme/widget",
                "html_url": "https://github.com/acme/widget",
                "private": false,
                "topics": ["rust"],
                "owner": { "login": "acme" }
            },
            "release": {
                "id": release_id,
                "tag_name": tag,
                "draft": false,
                "prerelease": false,
                "published_at": "2026-05-01T12:00:00Z"
            }
        })
        .to_string()
    }

    fn signed_request(uri: &str, event: &str, secret: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .header("X-GitHub-Event", event)
            .header(
                "X-Hub-Signature-256",
                signature_header(secret, body.as_bytes()).unwrap(),
            )
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_webhook_rejects_when_secret_unconfigured() {
        let mut config = test_config();
        config.webhook_github_secret = None;
        let (_state, app, _guard) = setup_test_app(config).await;

        let body = release_body(1, 1, "v1.0.0");
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/github")
            .header("Content-Type", "application/json")
            .header("X-GitHub-Event", "release")
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_webhook_rejects_invalid_signature() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let body = release_body(1, 1, "v1.0.0");
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/github")
            .header("Content-Type", "application/json")
            .header("X-GitHub-Event", "release")
            .header(
                "X-Hub-Signature-256",
                signature_header("wrong-secret", body.as_bytes()).unwrap(),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(error["code"], "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn test_webhook_rejects_malformed_signature_header() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let body = release_body(1, 1, "v1.0.0");
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/github")
            .header("Content-Type", "application/json")
            .header("X-GitHub-Event", "release")
            .header("X-Hub-Signature-256", "md5=abcdef")
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_rejects_invalid_json() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let body = "this is not json";
        let request = signed_request("/webhooks/github", "release", "test-secret-123", body);

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_rejects_unsupported_schema() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        // Valid JSON, but missing the repository object
        let body = r#"{"action": "published", "release": {"id": 1, "tag_name": "v1.0.0"}}"#;
        let request = signed_request("/webhooks/github", "release", "test-secret-123", body);

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_ignores_unknown_event_kind() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let body = r#"{"zen": "Design for failure."}"#;
        let request = signed_request("/webhooks/github", "ping", "test-secret-123", body);

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let accepted: WebhookAcceptResponse = serde_json::from_slice(&raw).unwrap();
        assert_eq!(accepted.status, "ignored:ping");
    }

    #[tokio::test]
    async fn test_webhook_accepts_release_delivery() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let body = release_body(813, 9001, "v1.0.0");
        let request = signed_request("/webhooks/github", "release", "test-secret-123", &body);

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let accepted: WebhookAcceptResponse = serde_json::from_slice(&raw).unwrap();
        assert_eq!(accepted.status, "accepted:release");
    }

    #[tokio::test]
    async fn test_webhook_accepts_create_delivery() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let body = serde_json::json!({
            "ref": "v3.1.0",
            "ref_type": "tag",
            "repository": {
                "id": 813,
                "name": "widget",
                "full_name": "acme/widget",
                "html_url": "https://github.com/acme/widget",
                "owner": { "login": "acme" }
            }
        })
        .to_string();
        let request = signed_request("/webhooks/github", "create", "test-secret-123", &body);

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let accepted: WebhookAcceptResponse = serde_json::from_slice(&raw).unwrap();
        assert_eq!(accepted.status, "accepted:create");
    }

    #[tokio::test]
    async fn test_webhook_replay_records_duplicate_skip() {
        let (state, app, _guard) = setup_test_app(test_config()).await;

        let body = release_body(813, 9001, "v2.1.0");
        let first = signed_request("/webhooks/github", "release", "test-secret-123", &body);
        let second = signed_request("/webhooks/github", "release", "test-secret-123", &body);

        let response = app.clone().oneshot(first).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.oneshot(second).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let posts = crate::repositories::PostLedger::new(&state.db)
            .list_recent(100)
            .await
            .unwrap();
        let duplicate_rows = posts
            .iter()
            .filter(|(post, _, _)| post.status == "SKIPPED_DUPLICATE")
            .count();
        assert_eq!(duplicate_rows, 1);
    }

    #[tokio::test]
    async fn test_webhook_secret_required_outside_test_profile() {
        // Config validation refuses a non-local profile without a secret
        let config = AppConfig {
            profile: "production".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
