//! # Repository Handlers
//!
//! Dashboard listing, the per-repository activation switch, and the
//! manual GitHub sync trigger.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, refusal};
use crate::github::{GithubClient, SyncOutcome};
use crate::models::{repository, repository_settings};
use crate::repositories::RepositoryStore;
use crate::server::AppState;

/// Path parameter for a repository id
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct RepositoryPath {
    /// Repository UUID
    pub repository_id: Uuid,
}

/// One repository for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RepositoryInfo {
    /// Unique identifier for the repository
    #[schema(value_type = String)]
    pub id: Uuid,
    /// External GitHub repository id
    pub github_id: i64,
    /// GitHub owner login
    pub owner: String,
    /// Repository name without the owner prefix
    pub name: String,
    /// Full `owner/name` form
    pub full_name: String,
    /// Public GitHub URL
    pub html_url: String,
    /// Default branch name
    pub default_branch: String,
    /// Repository topics
    pub topics: Vec<String>,
    /// `public` or `private`
    pub visibility: String,
    /// Whether announcements can be enabled (private repositories cannot)
    pub supported: bool,
    /// Activation switch, false when no settings row exists yet
    pub is_active: bool,
    /// RFC3339 time of the last metadata refresh
    pub updated_at: String,
}

/// Response wrapper for the repository listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RepositoriesResponse {
    /// Repositories ordered by full name
    pub repositories: Vec<RepositoryInfo>,
}

/// Request body for the activation switch
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivationRequest {
    /// Desired activation state
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

/// Response for the activation switch
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivationResponse {
    /// Repository the switch belongs to
    #[schema(value_type = String)]
    pub repository_id: Uuid,
    /// Activation state after the change
    pub is_active: bool,
}

/// Response for a completed repository sync
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    /// Repositories written during the sync
    pub synced: usize,
    /// Public repositories seen in the GitHub listing
    pub public_repos: usize,
    /// Private repositories seen in the GitHub listing
    pub private_repos: usize,
}

fn repository_info(
    repo: repository::Model,
    settings: Option<repository_settings::Model>,
) -> RepositoryInfo {
    let topics = repo.topic_list();
    let visibility = if repo.is_private { "private" } else { "public" };

    RepositoryInfo {
        id: repo.id,
        github_id: repo.github_id,
        owner: repo.owner,
        name: repo.name,
        full_name: repo.full_name,
        html_url: repo.html_url,
        default_branch: repo.default_branch,
        topics,
        visibility: visibility.to_string(),
        supported: !repo.is_private,
        is_active: settings.map(|s| s.is_active).unwrap_or(false),
        updated_at: repo.updated_at.to_rfc3339(),
    }
}

/// List known repositories
#[utoipa::path(
    get,
    path = "/repositories",
    responses(
        (status = 200, description = "Repositories with activation state, ordered by full name", body = RepositoriesResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn list_repositories(
    State(state): State<AppState>,
) -> Result<Json<RepositoriesResponse>, ApiError> {
    let rows = RepositoryStore::new(&state.db).list_with_settings().await?;

    Ok(Json(RepositoriesResponse {
        repositories: rows
            .into_iter()
            .map(|(repo, settings)| repository_info(repo, settings))
            .collect(),
    }))
}

/// Set the activation switch for a repository
#[utoipa::path(
    patch,
    path = "/repositories/{repository_id}/activation",
    params(RepositoryPath),
    request_body = ActivationRequest,
    responses(
        (status = 200, description = "Activation state after the change", body = ActivationResponse),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 404, description = "Repository not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn set_repository_activation(
    State(state): State<AppState>,
    Path(path): Path<RepositoryPath>,
    payload: Result<Json<ActivationRequest>, JsonRejection>,
) -> Result<Json<ActivationResponse>, ApiError> {
    let Json(request) = payload?;

    let store = RepositoryStore::new(&state.db);
    let Some(repo) = store.find_by_id(path.repository_id).await? else {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("repository '{}' not found", path.repository_id),
        ));
    };

    let settings = store.set_activation(repo.id, request.is_active).await?;
    info!(
        repository = %repo.full_name,
        is_active = settings.is_active,
        "Repository activation changed"
    );

    Ok(Json(ActivationResponse {
        repository_id: repo.id,
        is_active: settings.is_active,
    }))
}

/// Sync repositories from the connected GitHub account
#[utoipa::path(
    post,
    path = "/repositories/sync",
    responses(
        (status = 200, description = "Sync counts", body = SyncResponse),
        (status = 400, description = "Refused with code github_not_connected", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn sync_repositories(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, ApiError> {
    let client = GithubClient::new(&state.db, &state.config);

    match client.sync_repositories().await? {
        SyncOutcome::Refused { reason } => {
            Err(refusal(reason, "GitHub account is not connected"))
        }
        SyncOutcome::Completed(report) => {
            info!(
                synced = report.synced,
                public_repos = report.public_repos,
                private_repos = report.private_repos,
                "Repository sync completed"
            );
            Ok(Json(SyncResponse {
                synced: report.synced,
                public_repos: report.public_repos,
                private_repos: report.private_repos,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::server::tests_support::{seed_repository, setup_test_app, test_config};

    #[tokio::test]
    async fn test_list_repositories_orders_and_maps() {
        let (state, app, _guard) = setup_test_app(test_config()).await;
        seed_repository(&state, 11, "zeta/last", false).await;
        seed_repository(&state, 12, "acme/first", true).await;

        let request = Request::builder()
            .method("GET")
            .uri("/repositories")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let listing: RepositoriesResponse = serde_json::from_slice(&raw).unwrap();
        assert_eq!(listing.repositories.len(), 2);

        let first = &listing.repositories[0];
        assert_eq!(first.full_name, "acme/first");
        assert_eq!(first.visibility, "private");
        assert!(!first.supported);
        assert!(!first.is_active);

        let second = &listing.repositories[1];
        assert_eq!(second.full_name, "zeta/last");
        assert_eq!(second.visibility, "public");
        assert!(second.supported);
    }

    #[tokio::test]
    async fn test_activation_unknown_repository_returns_404() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/repositories/{}/activation", Uuid::new_v4()))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"isActive": true}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_activation_rejects_invalid_payload() {
        let (state, app, _guard) = setup_test_app(test_config()).await;
        let repo = seed_repository(&state, 21, "acme/widget", false).await;

        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/repositories/{}/activation", repo.id))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"active": true}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_activation_toggles_and_persists() {
        let (state, app, _guard) = setup_test_app(test_config()).await;
        let repo = seed_repository(&state, 31, "acme/widget", false).await;

        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/repositories/{}/activation", repo.id))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"isActive": true}"#))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let activation: ActivationResponse = serde_json::from_slice(&raw).unwrap();
        assert_eq!(activation.repository_id, repo.id);
        assert!(activation.is_active);

        let settings = RepositoryStore::new(&state.db)
            .find_settings(repo.id)
            .await
            .unwrap()
            .expect("settings row");
        assert!(settings.is_active);

        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/repositories/{}/activation", repo.id))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"isActive": false}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let activation: ActivationResponse = serde_json::from_slice(&raw).unwrap();
        assert!(!activation.is_active);
    }

    #[tokio::test]
    async fn test_sync_refused_without_github_connection() {
        let (_state, app, _guard) = setup_test_app(test_config()).await;

        let request = Request::builder()
            .method("POST")
            .uri("/repositories/sync")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(error["code"], "github_not_connected");
    }
}
