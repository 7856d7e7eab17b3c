//! # Connect Handlers
//!
//! Provider OAuth flows (authorize redirect and callback), the manual X
//! token sync, and the connection status report. Callback failures never
//! surface as API errors; the browser is mid-redirect, so every outcome
//! lands back on the dashboard with a query parameter.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Redirect},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use url::Url;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::error::{ApiError, refusal};
use crate::github::GithubClient;
use crate::oauth::{
    AccountSummary, ConsumedState, ManualSyncOutcome, OauthStateManager, Provider, XOauthFlow,
};
use crate::server::AppState;

/// Path parameter for a provider slug
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ProviderPath {
    /// Provider slug (`github` or `x`)
    pub provider: String,
}

/// Query parameters a provider sends to the OAuth callback
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CallbackQuery {
    /// Authorization code on success
    pub code: Option<String>,
    /// State token issued at flow start
    pub state: Option<String>,
    /// Provider error code when the user denied or the flow broke
    pub error: Option<String>,
    /// Human-readable detail some providers attach to the error
    pub error_description: Option<String>,
}

/// Connected account as reported by the connections listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectedAccountInfo {
    /// Provider-side account id or username
    pub provider_user: String,
    /// RFC3339 time the grant was last written
    pub updated_at: String,
    /// Whether an access token is stored for the account
    pub has_access_token: bool,
}

/// GitHub connection status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GithubConnectionInfo {
    /// Whether a usable GitHub grant is stored
    pub connected: bool,
    /// Most recently updated GitHub account
    pub account: Option<ConnectedAccountInfo>,
}

/// X connection status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct XConnectionInfo {
    /// Connection mode the service runs in
    pub mode: String,
    /// Whether an environment token is configured
    pub env_configured: bool,
    /// Whether dispatches can currently reach X
    pub can_post: bool,
    /// Most recently updated X account
    pub account: Option<ConnectedAccountInfo>,
    /// Why posting is unavailable, when it is
    pub reason: Option<String>,
}

/// Response for the connections listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionsResponse {
    pub github: GithubConnectionInfo,
    pub x: XConnectionInfo,
}

/// Response for a completed manual X sync
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct XSyncResponse {
    /// Account the environment token was stored under
    pub provider_user: String,
}

fn unknown_provider(slug: &str) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        &format!("provider '{}' not found", slug),
    )
}

fn account_info(summary: AccountSummary) -> ConnectedAccountInfo {
    ConnectedAccountInfo {
        provider_user: summary.provider_user,
        updated_at: summary.updated_at.to_rfc3339(),
        has_access_token: summary.has_access_token,
    }
}

/// Redirect back to the dashboard's connect page with outcome parameters.
fn dashboard_redirect(
    config: &AppConfig,
    provider: Provider,
    params: &[(&str, &str)],
) -> Result<Redirect, ApiError> {
    let base = format!(
        "{}/connect/{}",
        config.dashboard_url.trim_end_matches('/'),
        provider.as_str()
    );
    let mut url = Url::parse(&base).map_err(|_| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Dashboard URL is not a valid URL",
        )
    })?;
    for (key, value) in params {
        url.query_pairs_mut().append_pair(key, value);
    }

    Ok(Redirect::temporary(url.as_str()))
}

async fn connect_github(
    state: &AppState,
    code: &str,
    redirect_uri: &str,
) -> anyhow::Result<String> {
    let client = GithubClient::new(&state.db, &state.config);
    let access_token = client.exchange_code(code, redirect_uri).await?;
    client.save_connection(&access_token).await
}

async fn connect_x(
    state: &AppState,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> anyhow::Result<String> {
    let flow = XOauthFlow::new(&state.db, &state.config);
    let grant = flow.exchange_code(code, code_verifier, redirect_uri).await?;
    let identity = flow.fetch_me(&grant.access_token).await?;
    flow.save_connection(&grant, &identity.id).await?;

    Ok(identity.username.unwrap_or(identity.id))
}

/// Start an OAuth flow
///
/// Issues a single-use state token and redirects to the provider's
/// consent page.
#[utoipa::path(
    get,
    path = "/connect/{provider}/start",
    params(ProviderPath),
    responses(
        (status = 307, description = "Redirect to the provider consent page"),
        (status = 404, description = "Unknown provider", body = ApiError),
        (status = 500, description = "Provider OAuth is not configured", body = ApiError)
    ),
    tag = "connect"
)]
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(path): Path<ProviderPath>,
) -> Result<Redirect, ApiError> {
    let Some(provider) = Provider::from_slug(&path.provider) else {
        return Err(unknown_provider(&path.provider));
    };

    let manager = OauthStateManager::new(&state.db);
    let url = match provider {
        Provider::Github => {
            if state.config.github_oauth().is_none() {
                return Err(ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "GitHub OAuth is not configured",
                ));
            }

            let client = GithubClient::new(&state.db, &state.config);
            let redirect_uri = client.redirect_uri();
            let issued = manager.issue(provider, &redirect_uri).await?;
            client.authorize_url(&issued.state)?
        }
        Provider::X => {
            if state.config.x_oauth().is_none() {
                return Err(ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "X_CLIENT_ID is not configured",
                ));
            }

            let flow = XOauthFlow::new(&state.db, &state.config);
            let redirect_uri = flow.redirect_uri();
            let issued = manager.issue(provider, &redirect_uri).await?;
            let Some(challenge) = issued.code_challenge.as_deref() else {
                return Err(ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "X state issued without a code challenge",
                ));
            };
            flow.authorize_url(&issued.state, challenge)?
        }
    };

    info!(provider = %provider, "OAuth flow started");
    Ok(Redirect::temporary(&url))
}

/// OAuth callback
///
/// Consumes the state token, exchanges the code, stores the grant, and
/// redirects back to the dashboard with `?connected=1` or `?error=`.
#[utoipa::path(
    get,
    path = "/connect/{provider}/callback",
    params(ProviderPath, CallbackQuery),
    responses(
        (status = 307, description = "Redirect back to the dashboard"),
        (status = 404, description = "Unknown provider", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "connect"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(path): Path<ProviderPath>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let Some(provider) = Provider::from_slug(&path.provider) else {
        return Err(unknown_provider(&path.provider));
    };

    if let Some(provider_error) = query.error.as_deref() {
        info!(
            provider = %provider,
            error = %provider_error,
            description = query.error_description.as_deref().unwrap_or(""),
            "Provider reported an authorize error"
        );
        return dashboard_redirect(&state.config, provider, &[("error", provider_error)]);
    }

    let (Some(code), Some(state_token)) = (query.code.as_deref(), query.state.as_deref()) else {
        return dashboard_redirect(&state.config, provider, &[("error", "missing_code_or_state")]);
    };

    let consumed = OauthStateManager::new(&state.db)
        .consume(provider, state_token)
        .await?;
    let (code_verifier, redirect_uri) = match consumed {
        ConsumedState::Refused { reason } => {
            info!(provider = %provider, reason = %reason, "OAuth state refused");
            return dashboard_redirect(&state.config, provider, &[("error", reason)]);
        }
        ConsumedState::Valid {
            code_verifier,
            redirect_uri,
        } => (code_verifier, redirect_uri),
    };

    match provider {
        Provider::Github => match connect_github(&state, code, &redirect_uri).await {
            Ok(login) => {
                info!(account = %login, "GitHub account connected");
                dashboard_redirect(&state.config, provider, &[("connected", "1")])
            }
            Err(err) => {
                error!(error = %err, "GitHub OAuth callback failed");
                dashboard_redirect(&state.config, provider, &[("error", &err.to_string())])
            }
        },
        Provider::X => {
            let Some(verifier) = code_verifier.as_deref() else {
                return dashboard_redirect(
                    &state.config,
                    provider,
                    &[("error", "missing_code_verifier")],
                );
            };

            match connect_x(&state, code, verifier, &redirect_uri).await {
                Ok(account) => {
                    info!(account = %account, "X account connected");
                    dashboard_redirect(
                        &state.config,
                        provider,
                        &[("connected", "1"), ("account", &account)],
                    )
                }
                Err(err) => {
                    error!(error = %err, "X OAuth callback failed");
                    dashboard_redirect(&state.config, provider, &[("error", &err.to_string())])
                }
            }
        }
    }
}

/// Store the environment X token as a connected account
#[utoipa::path(
    post,
    path = "/connect/x/sync",
    responses(
        (status = 200, description = "Token stored", body = XSyncResponse),
        (status = 400, description = "Refused with code x_sync_unavailable", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "connect"
)]
pub async fn sync_x_connection(
    State(state): State<AppState>,
) -> Result<Json<XSyncResponse>, ApiError> {
    match XOauthFlow::new(&state.db, &state.config).manual_sync().await? {
        ManualSyncOutcome::Refused { reason } => Err(refusal("x_sync_unavailable", &reason)),
        ManualSyncOutcome::Completed { provider_user } => {
            info!(account = %provider_user, "X environment token stored");
            Ok(Json(XSyncResponse { provider_user }))
        }
    }
}

/// Report provider connection status
#[utoipa::path(
    get,
    path = "/connections",
    responses(
        (status = 200, description = "Connection status per provider", body = ConnectionsResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "connect"
)]
pub async fn list_connections(
    State(state): State<AppState>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let github = GithubClient::new(&state.db, &state.config)
        .connection_state()
        .await?;
    let x = XOauthFlow::new(&state.db, &state.config)
        .connection_state()
        .await?;

    Ok(Json(ConnectionsResponse {
        github: GithubConnectionInfo {
            connected: github.connected,
            account: github.account.map(account_info),
        },
        x: XConnectionInfo {
            mode: x.mode,
            env_configured: x.env_configured,
            can_post: x.can_post,
            account: x.account.map(account_info),
            reason: x.reason.map(str::to_owned),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::server::tests_support::{setup_test_app, test_config};

    fn location(response: &axum::response::Response) -> String {
        response
            .headers()
            .get("location")
            .expect("location header")
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_start_unknown_provider_returns_404() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let request = Request::builder()
            .method("GET")
            .uri("/connect/slack/start")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_unconfigured_x_returns_500() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let request = Request::builder()
            .method("GET")
            .uri("/connect/x/start")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_start_github_redirects_to_consent_page() {
        let mut config = test_config();
        config.github_client_id = Some("gh-client".to_string());
        config.github_client_secret = Some("gh-secret".to_string());
        let (_state, app, _guard) = setup_test_app(config).await;

        let request = Request::builder()
            .method("GET")
            .uri("/connect/github/start")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let target = location(&response);
        assert!(target.starts_with("https://github.com/login/oauth/authorize"));
        assert!(target.contains("client_id=gh-client"));
        assert!(target.contains("state="));
    }

    #[tokio::test]
    async fn test_start_x_carries_pkce_challenge() {
        let mut config = test_config();
        config.x.client_id = Some("x-client".to_string());
        let (_state, app, _guard) = setup_test_app(config).await;

        let request = Request::builder()
            .method("GET")
            .uri("/connect/x/start")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let target = location(&response);
        assert!(target.starts_with("https://x.com/i/oauth2/authorize"));
        assert!(target.contains("code_challenge="));
        assert!(target.contains("code_challenge_method=S256"));
    }

    #[tokio::test]
    async fn test_callback_passes_provider_error_through() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let request = Request::builder()
            .method("GET")
            .uri("/connect/github/callback?error=access_denied")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let target = location(&response);
        assert!(target.starts_with("http://localhost:3000/connect/github"));
        assert!(target.contains("error=access_denied"));
    }

    #[tokio::test]
    async fn test_callback_without_code_redirects_with_error() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let request = Request::builder()
            .method("GET")
            .uri("/connect/x/callback?state=abc")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(location(&response).contains("error=missing_code_or_state"));
    }

    #[tokio::test]
    async fn test_callback_with_unknown_state_redirects_with_error() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let request = Request::builder()
            .method("GET")
            .uri("/connect/github/callback?code=abc&state=never-issued")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(location(&response).contains("error=state_not_found"));
    }

    #[tokio::test]
    async fn test_connections_report_defaults() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let request = Request::builder()
            .method("GET")
            .uri("/connections")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let connections: ConnectionsResponse = serde_json::from_slice(&raw).unwrap();
        assert!(!connections.github.connected);
        assert!(connections.github.account.is_none());
        assert_eq!(connections.x.mode, "stub_success");
        assert!(!connections.x.env_configured);
        assert!(!connections.x.can_post);
        assert!(connections.x.reason.is_some());
    }

    #[tokio::test]
    async fn test_x_sync_refused_outside_manual_mode() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let request = Request::builder()
            .method("POST")
            .uri("/connect/x/sync")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(error["code"], "x_sync_unavailable");
    }

    #[tokio::test]
    async fn test_x_sync_stores_env_token() {
        let mut config = test_config();
        config.x.connection_mode = "manual_env".to_string();
        config.x.access_token = Some("env-token".to_string());
        config.x.account_username = Some("acme".to_string());
        let (_state, app, _guard) = setup_test_app(config).await;

        let request = Request::builder()
            .method("POST")
            .uri("/connect/x/sync")
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let sync: XSyncResponse = serde_json::from_slice(&raw).unwrap();
        assert_eq!(sync.provider_user, "acme");

        let request = Request::builder()
            .method("GET")
            .uri("/connections")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let connections: ConnectionsResponse = serde_json::from_slice(&raw).unwrap();
        assert!(connections.x.can_post);
        let account = connections.x.account.expect("stored account");
        assert_eq!(account.provider_user, "acme");
        assert!(account.has_access_token);
    }
}
