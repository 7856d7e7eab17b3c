//! # Post Handlers
//!
//! Ledger listing with event and repository context, and the manual
//! rerun of failed dispatches.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, refusal};
use crate::models::{event, post, repository};
use crate::posting::{PostingDispatcher, RerunOutcome};
use crate::repositories::PostLedger;
use crate::server::AppState;

/// Newest-first listing cap
const LIST_LIMIT: u64 = 100;

/// Path parameter for a post id
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PostPath {
    /// Post UUID
    pub post_id: Uuid,
}

/// One ledger row for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PostInfo {
    /// Unique identifier for the ledger row
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Dispatch status (POSTED, FAILED, SKIPPED_DUPLICATE, SKIPPED_POLICY)
    pub status: String,
    /// Composed post text, or the skip description
    pub text: String,
    /// URL the post points at
    pub target_url: String,
    /// Remote post id when dispatch succeeded
    pub external_id: Option<String>,
    /// Failure detail, skip reason, or carried warning
    pub error: Option<String>,
    /// RFC3339 creation time
    pub created_at: String,
    /// Event the row belongs to
    pub event: Option<PostEventInfo>,
}

/// Event context embedded in a post listing entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PostEventInfo {
    /// Unique identifier for the event
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Event kind (RELEASE_PUBLISHED, FIRST_PUBLIC_RELEASE, ...)
    pub event_type: String,
    /// Idempotency key the event was stored under
    pub source_key: String,
    /// RFC3339 time the event occurred at the source
    pub occurred_at: String,
    /// Release or tag name when the event carries one
    pub release_tag: Option<String>,
    /// Repository context
    pub repository: Option<PostRepositoryInfo>,
}

/// Repository context embedded in a post listing entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PostRepositoryInfo {
    /// Unique identifier for the repository
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Full `owner/name` form
    pub full_name: String,
    /// Public GitHub URL
    pub html_url: String,
}

/// Response wrapper for the ledger listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PostsResponse {
    /// Ledger rows, newest first
    pub posts: Vec<PostInfo>,
}

/// Rerun response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RerunResponse {
    /// Identifier of the freshly appended ledger row
    #[schema(value_type = String)]
    pub post_id: Uuid,
    /// Status the new dispatch attempt ended in
    pub status: String,
}

fn post_info(
    post: post::Model,
    event: Option<event::Model>,
    repo: Option<repository::Model>,
) -> PostInfo {
    PostInfo {
        id: post.id,
        status: post.status,
        text: post.text,
        target_url: post.target_url,
        external_id: post.external_id,
        error: post.error,
        created_at: post.created_at.to_rfc3339(),
        event: event.map(|event| PostEventInfo {
            id: event.id,
            event_type: event.event_type,
            source_key: event.source_key,
            occurred_at: event.occurred_at.to_rfc3339(),
            release_tag: event.release_tag,
            repository: repo.map(|repo| PostRepositoryInfo {
                id: repo.id,
                full_name: repo.full_name,
                html_url: repo.html_url,
            }),
        }),
    }
}

/// List recent ledger rows
#[utoipa::path(
    get,
    path = "/posts",
    responses(
        (status = 200, description = "Ledger rows with event and repository context, newest first", body = PostsResponse),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "posts"
)]
pub async fn list_posts(State(state): State<AppState>) -> Result<Json<PostsResponse>, ApiError> {
    let rows = PostLedger::new(&state.db).list_recent(LIST_LIMIT).await?;

    Ok(Json(PostsResponse {
        posts: rows
            .into_iter()
            .map(|(post, event, repo)| post_info(post, event, repo))
            .collect(),
    }))
}

/// Rerun a failed dispatch
///
/// Appends a fresh dispatch attempt for the addressed post's event. Only
/// allowed while the event's most recent ledger row is FAILED.
#[utoipa::path(
    post,
    path = "/posts/{post_id}/rerun",
    params(PostPath),
    responses(
        (status = 200, description = "New dispatch attempt recorded", body = RerunResponse),
        (status = 400, description = "Refused with code post_not_found or post_is_not_failed", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "posts"
)]
pub async fn rerun_post(
    State(state): State<AppState>,
    Path(path): Path<PostPath>,
) -> Result<Json<RerunResponse>, ApiError> {
    let dispatcher = PostingDispatcher::new(&state.db, &state.config);

    match dispatcher.rerun_failed_post(path.post_id).await? {
        RerunOutcome::Refused { reason } => {
            let message = match reason {
                "post_not_found" => "No post with that id",
                "post_is_not_failed" => "Only the latest failed post for an event can be rerun",
                other => other,
            };
            Err(refusal(reason, message))
        }
        RerunOutcome::Completed { post } => {
            info!(post_id = %post.id, status = %post.status, "Rerun dispatch recorded");
            Ok(Json(RerunResponse {
                post_id: post.id,
                status: post.status,
            }))
        }
    }
}
