//! GitHub API client: OAuth connection and repository sync
//!
//! Mirrors the X side of [`crate::oauth`] for GitHub (no PKCE) and owns
//! the paged repository sync that seeds the catalog. Webhook intake
//! never depends on this module; a repository can exist purely from
//! deliveries.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, anyhow};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::config::{AppConfig, ProviderOAuth};
use crate::oauth::{AccountSummary, Provider};
use crate::repositories::{ConnectionRegistry, RepositoryStore, RepositoryUpsert, UserRepository};

const SYNC_PAGE_SIZE: usize = 100;
const SYNC_MAX_PAGES: u32 = 10;

/// Repository entry returned by the GitHub list API
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepoPayload {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub private: bool,
    pub html_url: String,
    pub default_branch: String,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    pub owner: GithubRepoOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepoOwner {
    pub login: String,
}

/// Counts reported after a completed sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub public_repos: usize,
    pub private_repos: usize,
}

/// Result of a sync request
pub enum SyncOutcome {
    Refused { reason: &'static str },
    Completed(SyncReport),
}

/// Connection status for the GitHub provider
pub struct GithubConnectionState {
    pub connected: bool,
    pub account: Option<AccountSummary>,
}

/// Client for GitHub OAuth and repository sync
pub struct GithubClient<'a> {
    db: &'a DatabaseConnection,
    config: &'a AppConfig,
}

impl<'a> GithubClient<'a> {
    /// Create a new client over the given connection and configuration
    pub fn new(db: &'a DatabaseConnection, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    /// Callback URL the authorize request round-trips through
    pub fn redirect_uri(&self) -> String {
        self.config.github_redirect_uri.clone().unwrap_or_else(|| {
            format!(
                "{}/connect/github/callback",
                self.config.dashboard_url.trim_end_matches('/')
            )
        })
    }

    /// Builds the GitHub consent URL for a prepared state
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let Some(ProviderOAuth::Github {
            client_id,
            oauth_base,
            scope,
            ..
        }) = self.config.github_oauth()
        else {
            return Err(anyhow!("GitHub OAuth is not configured"));
        };

        let mut url = url::Url::parse(&format!("{}/login/oauth/authorize", oauth_base))?;
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", &self.redirect_uri())
            .append_pair("scope", &scope)
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// Exchanges an authorization code for an access token.
    ///
    /// GitHub reports bad codes inside a 200 body, so a missing
    /// `access_token` is treated the same as a non-2xx status.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String> {
        let Some(ProviderOAuth::Github {
            client_id,
            client_secret,
            oauth_base,
            ..
        }) = self.config.github_oauth()
        else {
            return Err(anyhow!("GitHub OAuth is not configured"));
        };

        let mut params = HashMap::new();
        params.insert("client_id", client_id);
        params.insert("client_secret", client_secret);
        params.insert("code", code.to_string());
        params.insert("redirect_uri", redirect_uri.to_string());

        let response = self
            .http_client()
            .post(format!("{}/login/oauth/access_token", oauth_base))
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let json: Option<JsonValue> = serde_json::from_str(&raw).ok();

        let access_token = json
            .as_ref()
            .and_then(|body| body.get("access_token"))
            .and_then(JsonValue::as_str);

        match access_token {
            Some(token) if status.is_success() => Ok(token.to_string()),
            _ => {
                let message = json
                    .as_ref()
                    .and_then(|body| {
                        body.get("error_description")
                            .or_else(|| body.get("error"))
                            .and_then(JsonValue::as_str)
                    })
                    .map(str::to_string)
                    .unwrap_or_else(|| "GitHub OAuth token exchange failed".to_string());
                Err(anyhow!(message))
            }
        }
    }

    /// Saves a GitHub connection keyed by the authenticated login
    pub async fn save_connection(&self, access_token: &str) -> Result<String> {
        let profile: JsonValue = self.github_fetch("/user", access_token).await?;
        let login = profile
            .get("login")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| anyhow!("GitHub /user response missing login"))?
            .to_string();

        let owner = UserRepository::new(self.db)
            .ensure_owner(&self.config.owner_email)
            .await?;
        ConnectionRegistry::new(self.db)
            .upsert_token(owner.id, Provider::Github.as_str(), &login, access_token)
            .await?;

        Ok(login)
    }

    /// Current GitHub connection status for the connections report
    pub async fn connection_state(&self) -> Result<GithubConnectionState> {
        let account = ConnectionRegistry::new(self.db)
            .latest_by_provider(Provider::Github.as_str())
            .await?;

        Ok(GithubConnectionState {
            connected: account
                .as_ref()
                .is_some_and(|model| model.access_token.is_some()),
            account: account.as_ref().map(AccountSummary::from_model),
        })
    }

    /// Pages through the owner's repositories and upserts the catalog.
    ///
    /// At most ten pages; a short page ends the walk. Private
    /// repositories always get their settings forced inactive, even if
    /// someone activated them while they were public.
    pub async fn sync_repositories(&self) -> Result<SyncOutcome> {
        let Some(account) = ConnectionRegistry::new(self.db)
            .latest_with_token(Provider::Github.as_str())
            .await?
        else {
            return Ok(SyncOutcome::Refused {
                reason: "github_not_connected",
            });
        };
        let Some(access_token) = account.access_token.as_deref() else {
            return Ok(SyncOutcome::Refused {
                reason: "github_not_connected",
            });
        };

        let mut repos: Vec<GithubRepoPayload> = Vec::new();
        for page in 1..=SYNC_MAX_PAGES {
            let path = format!(
                "/user/repos?visibility=all&affiliation=owner&per_page={}&page={}&sort=updated",
                SYNC_PAGE_SIZE, page
            );
            let chunk: Vec<GithubRepoPayload> = self.github_fetch(&path, access_token).await?;
            let short_page = chunk.len() < SYNC_PAGE_SIZE;
            repos.extend(chunk);
            if short_page {
                break;
            }
        }

        let private_repos = repos.iter().filter(|repo| repo.private).count();
        let public_repos = repos.len() - private_repos;

        let store = RepositoryStore::new(self.db);
        for repo in &repos {
            let topics = repo.topics.clone().unwrap_or_default();
            let record = store
                .upsert(
                    account.user_id,
                    RepositoryUpsert {
                        github_id: repo.id,
                        owner: &repo.owner.login,
                        name: &repo.name,
                        full_name: &repo.full_name,
                        html_url: &repo.html_url,
                        topics: &topics,
                        default_branch: Some(&repo.default_branch),
                        is_private: Some(repo.private),
                    },
                )
                .await?;

            if repo.private {
                store.set_activation(record.id, false).await?;
            }
        }

        tracing::info!(
            synced = repos.len(),
            public_repos,
            private_repos,
            "GitHub repository sync completed"
        );

        Ok(SyncOutcome::Completed(SyncReport {
            synced: repos.len(),
            public_repos,
            private_repos,
        }))
    }

    /// GET against the GitHub API, surfacing the body's `message` on
    /// failure.
    async fn github_fetch<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T> {
        let response = self
            .http_client()
            .get(format!("{}{}", self.config.github_api_base, path))
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "Announcer/0.1")
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = serde_json::from_str::<JsonValue>(&raw)
                .ok()
                .and_then(|body| {
                    body.get("message")
                        .and_then(JsonValue::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("GitHub API error ({})", status.as_u16()));
            return Err(anyhow!(message));
        }

        Ok(serde_json::from_str(&raw)?)
    }

    fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client")
    }
}
