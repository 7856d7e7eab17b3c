//! OAuth flows for connecting GitHub and X accounts
//!
//! Covers single-use authorize-state management (PKCE for X), the X
//! token exchange and identity fetch, manual env-token sync, and the
//! connection summaries the API reports. GitHub's own exchange and
//! repository sync live in [`crate::github`].

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sea_orm::DatabaseConnection;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{AppConfig, ProviderOAuth};
use crate::models::connected_account;
use crate::repositories::{ConnectionRegistry, NewOauthState, OauthStateStore, UserRepository};

/// Default lifetime of an authorize-flow state row
pub const STATE_TTL_MINUTES: i64 = 10;

/// Providers an account can be connected through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Github,
    X,
}

impl Provider {
    /// Stable lowercase form used in storage and URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::X => "x",
        }
    }

    /// Parses a path segment into a provider
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "github" => Some(Provider::Github),
            "x" => Some(Provider::X),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn random_base64url(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}

/// Random CSRF state token (24 bytes, base64url without padding)
pub fn random_state_token() -> String {
    random_base64url(24)
}

/// Random PKCE code verifier (48 bytes, base64url without padding)
pub fn generate_code_verifier() -> String {
    random_base64url(48)
}

/// S256 code challenge for a PKCE verifier
pub fn code_challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64_url::encode(&digest)
}

/// A freshly issued state, ready to be embedded in an authorize URL.
/// The PKCE verifier never leaves storage; only the challenge does.
pub struct IssuedState {
    pub state: String,
    pub code_challenge: Option<String>,
}

/// Result of consuming a state row
pub enum ConsumedState {
    Valid {
        code_verifier: Option<String>,
        redirect_uri: String,
    },
    Refused {
        reason: &'static str,
    },
}

/// Manager for single-use authorize-flow state
pub struct OauthStateManager<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> OauthStateManager<'a> {
    /// Create a new state manager over the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Issues and persists a state for an authorize redirect. X flows
    /// get a PKCE pair; the verifier is stored, the challenge returned.
    /// Expired leftovers from abandoned flows are swept first.
    pub async fn issue(&self, provider: Provider, redirect_uri: &str) -> Result<IssuedState> {
        let store = OauthStateStore::new(self.db);

        let swept = store.cleanup_expired().await?;
        if swept > 0 {
            debug!(swept, "Swept expired OAuth state rows");
        }

        let state = random_state_token();

        let (code_verifier, code_challenge) = match provider {
            Provider::X => {
                let verifier = generate_code_verifier();
                let challenge = code_challenge_s256(&verifier);
                (Some(verifier), Some(challenge))
            }
            Provider::Github => (None, None),
        };

        store
            .create(NewOauthState {
                provider: provider.as_str(),
                state: &state,
                redirect_uri,
                code_verifier,
                expires_at: Utc::now() + chrono::Duration::minutes(STATE_TTL_MINUTES),
            })
            .await?;

        Ok(IssuedState {
            state,
            code_challenge,
        })
    }

    /// Consumes a state: the row is deleted on lookup before any
    /// validation, so every path burns it and replays always see
    /// `state_not_found`.
    pub async fn consume(&self, provider: Provider, state: &str) -> Result<ConsumedState> {
        let store = OauthStateStore::new(self.db);

        let Some(record) = store.find_by_state(state).await? else {
            return Ok(ConsumedState::Refused {
                reason: "state_not_found",
            });
        };

        if !store.delete_by_id(record.id).await? {
            // another callback raced us to the row
            return Ok(ConsumedState::Refused {
                reason: "state_not_found",
            });
        }

        if record.provider != provider.as_str() {
            return Ok(ConsumedState::Refused {
                reason: "state_provider_mismatch",
            });
        }

        if record.expires_at < Utc::now() {
            return Ok(ConsumedState::Refused {
                reason: "state_expired",
            });
        }

        Ok(ConsumedState::Valid {
            code_verifier: record.code_verifier,
            redirect_uri: record.redirect_uri,
        })
    }
}

/// Token grant returned by the X token endpoint
pub struct XTokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// Identity reported by X `/users/me`
pub struct XIdentity {
    pub id: String,
    pub username: Option<String>,
}

/// Outcome of a manual env-token sync
pub enum ManualSyncOutcome {
    Refused { reason: String },
    Completed { provider_user: String },
}

/// Latest-account summary shared by the connection state reports
#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub provider_user: String,
    pub updated_at: DateTime<Utc>,
    pub has_access_token: bool,
}

impl AccountSummary {
    pub fn from_model(model: &connected_account::Model) -> Self {
        Self {
            provider_user: model.provider_user.clone(),
            updated_at: model.updated_at,
            has_access_token: model.access_token.is_some(),
        }
    }
}

/// Connection status for the X provider
pub struct XConnectionState {
    pub mode: String,
    pub env_configured: bool,
    pub can_post: bool,
    pub account: Option<AccountSummary>,
    pub reason: Option<&'static str>,
}

/// X OAuth and connection flows
pub struct XOauthFlow<'a> {
    db: &'a DatabaseConnection,
    config: &'a AppConfig,
}

impl<'a> XOauthFlow<'a> {
    /// Create a new flow over the given connection and configuration
    pub fn new(db: &'a DatabaseConnection, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    /// Callback URL the authorize request round-trips through
    pub fn redirect_uri(&self) -> String {
        self.config.x.redirect_uri.clone().unwrap_or_else(|| {
            format!(
                "{}/connect/x/callback",
                self.config.dashboard_url.trim_end_matches('/')
            )
        })
    }

    /// Builds the X consent URL for a prepared state and PKCE challenge
    pub fn authorize_url(&self, state: &str, code_challenge: &str) -> Result<String> {
        let Some(ProviderOAuth::X {
            client_id,
            authorize_base,
            scope,
            ..
        }) = self.config.x_oauth()
        else {
            return Err(anyhow!("X_CLIENT_ID is not configured"));
        };

        let mut url = url::Url::parse(&authorize_base)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", &self.redirect_uri())
            .append_pair("scope", &scope)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url.to_string())
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// Confidential clients add Basic auth; public clients rely on the
    /// PKCE verifier alone.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<XTokenGrant> {
        let Some(ProviderOAuth::X {
            client_id,
            client_secret,
            api_base,
            ..
        }) = self.config.x_oauth()
        else {
            return Err(anyhow!("X_CLIENT_ID is not configured"));
        };

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code".to_string());
        params.insert("code", code.to_string());
        params.insert("client_id", client_id.clone());
        params.insert("redirect_uri", redirect_uri.to_string());
        params.insert("code_verifier", code_verifier.to_string());

        let mut request = self
            .http_client()
            .post(format!("{}/oauth2/token", api_base))
            .form(&params);
        if let Some(secret) = client_secret {
            use base64::Engine as _;
            let credentials =
                base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", client_id, secret));
            request = request.header("Authorization", format!("Basic {}", credentials));
        }

        let response = request.send().await?;
        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let json: Option<JsonValue> = serde_json::from_str(&raw).ok();

        if !status.is_success() {
            let message = json
                .as_ref()
                .and_then(|body| body.get("error_description"))
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!("X OAuth token exchange failed ({})", status.as_u16())
                });
            return Err(anyhow!(message));
        }

        let body = json.unwrap_or(JsonValue::Null);
        let access_token = body
            .get("access_token")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| anyhow!("X OAuth response missing access_token"))?
            .to_string();

        Ok(XTokenGrant {
            access_token,
            refresh_token: body
                .get("refresh_token")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            expires_in: body.get("expires_in").and_then(JsonValue::as_i64),
        })
    }

    /// Fetches the authenticated X user
    pub async fn fetch_me(&self, access_token: &str) -> Result<XIdentity> {
        let response = self
            .http_client()
            .get(format!("{}/users/me", self.config.x.api_base))
            .header("Authorization", format!("Bearer {}", access_token))
            .header("User-Agent", "Announcer/0.1")
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let json: Option<JsonValue> = serde_json::from_str(&raw).ok();

        if !status.is_success() {
            return Err(anyhow!("X /users/me failed ({})", status.as_u16()));
        }

        let data = json
            .as_ref()
            .and_then(|body| body.get("data"))
            .cloned()
            .unwrap_or(JsonValue::Null);
        let id = data
            .get("id")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| anyhow!("X /users/me response missing user id"))?
            .to_string();

        Ok(XIdentity {
            id,
            username: data
                .get("username")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
        })
    }

    /// Persists an OAuth grant against the owner user
    pub async fn save_connection(&self, grant: &XTokenGrant, provider_user: &str) -> Result<()> {
        let owner = UserRepository::new(self.db)
            .ensure_owner(&self.config.owner_email)
            .await?;

        let expires_at = grant
            .expires_in
            .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds));

        ConnectionRegistry::new(self.db)
            .upsert_oauth_grant(
                owner.id,
                Provider::X.as_str(),
                provider_user,
                &grant.access_token,
                grant.refresh_token.clone(),
                expires_at,
            )
            .await?;

        Ok(())
    }

    /// Stores the env-configured manual token as a connected account.
    /// Only meaningful in `manual_env` mode.
    pub async fn manual_sync(&self) -> Result<ManualSyncOutcome> {
        let mode = self.config.x.connection_mode.to_lowercase();
        if mode != "manual_env" {
            return Ok(ManualSyncOutcome::Refused {
                reason: format!("manual sync is not available for mode {}", mode),
            });
        }

        let Some(access_token) = self.config.x.access_token.as_deref().filter(|t| !t.is_empty())
        else {
            return Ok(ManualSyncOutcome::Refused {
                reason: "X_ACCESS_TOKEN is not configured".to_string(),
            });
        };

        let provider_user = self
            .config
            .x
            .account_id
            .clone()
            .or_else(|| self.config.x.account_username.clone())
            .unwrap_or_else(|| "manual-env-account".to_string());

        let owner = UserRepository::new(self.db)
            .ensure_owner(&self.config.owner_email)
            .await?;
        ConnectionRegistry::new(self.db)
            .upsert_token(owner.id, Provider::X.as_str(), &provider_user, access_token)
            .await?;

        Ok(ManualSyncOutcome::Completed { provider_user })
    }

    /// Current X connection status for the connections report
    pub async fn connection_state(&self) -> Result<XConnectionState> {
        let mode = self.config.x.connection_mode.to_lowercase();
        let env_configured = self
            .config
            .x
            .access_token
            .as_deref()
            .is_some_and(|t| !t.is_empty());

        let account = ConnectionRegistry::new(self.db)
            .latest_by_provider(Provider::X.as_str())
            .await?;
        let has_stored_token = account
            .as_ref()
            .is_some_and(|model| model.access_token.is_some());

        let reason = if !env_configured && account.is_none() {
            Some("No X credentials configured yet")
        } else {
            None
        };

        Ok(XConnectionState {
            can_post: mode == "manual_env" && (env_configured || has_stored_token),
            account: account.as_ref().map(AccountSummary::from_model),
            mode,
            env_configured,
            reason,
        })
    }

    fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.x.http_timeout_ms))
            .build()
            .expect("Failed to create HTTP client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_challenge_matches_rfc7636_vector() {
        let challenge = code_challenge_s256("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cw");
    }

    #[test]
    fn test_state_token_shape() {
        let token = random_state_token();
        // 24 bytes -> 32 base64url chars, no padding
        assert_eq!(token.len(), 32);
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn test_state_tokens_are_unique() {
        let first = random_state_token();
        let second = random_state_token();
        assert_ne!(first, second);
    }

    #[test]
    fn test_code_verifier_shape() {
        let verifier = generate_code_verifier();
        // 48 bytes -> 64 base64url chars
        assert_eq!(verifier.len(), 64);
        assert!(!verifier.contains('='));
    }

    #[test]
    fn test_provider_slug_round_trip() {
        assert_eq!(Provider::from_slug("github"), Some(Provider::Github));
        assert_eq!(Provider::from_slug("x"), Some(Provider::X));
        assert_eq!(Provider::from_slug("mastodon"), None);
        assert_eq!(Provider::Github.as_str(), "github");
        assert_eq!(Provider::X.as_str(), "x");
    }
}
