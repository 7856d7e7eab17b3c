//! Posting pipeline: token resolution, X dispatch, ledger writes
//!
//! The dispatcher owns the posts ledger. Every decision about an event
//! lands as exactly one new row: published, failed with a classified
//! error, or skipped with a reason. Rows are never rewritten; reruns
//! append a fresh row pointing back at the one they retry.

pub mod shortener;
pub mod x_client;

pub use shortener::{LinkShortener, PROVIDER_ABVX, PROVIDER_NONE, ShortenOutcome};
pub use x_client::{XClient, XErrorCode, XPostOutcome};

use anyhow::Result;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::ingestion::composer::{ComposeParams, compose_post};
use crate::models::event::EventType;
use crate::models::post::{self, PostStatus};
use crate::oauth::Provider;
use crate::repositories::{ConnectionRegistry, NewPost, PostLedger, select_latest_token};

/// Ledger-ready form of a publish outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub status: PostStatus,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

/// Maps a publish outcome onto ledger columns.
///
/// A success keeps an advisory warning in the error field without
/// affecting status; a failure joins the warning and the classified
/// `CODE: message` with `" | "`.
pub fn map_outcome_to_record(outcome: XPostOutcome, warning: Option<&str>) -> PostRecord {
    match outcome {
        XPostOutcome::Published { external_id } => PostRecord {
            status: PostStatus::Posted,
            external_id: Some(external_id),
            error: warning.map(str::to_string),
        },
        XPostOutcome::Rejected { code, message } => {
            let failure = format!("{}: {}", code.as_str(), message);
            let error = match warning {
                Some(warning) => format!("{} | {}", warning, failure),
                None => failure,
            };
            PostRecord {
                status: PostStatus::Failed,
                external_id: None,
                error: Some(error),
            }
        }
    }
}

/// Everything needed to compose and dispatch one event's post
pub struct DispatchParams<'a> {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub project_name: &'a str,
    pub repo_url: &'a str,
    pub topics: &'a [String],
    pub release_tag: Option<&'a str>,
    pub access_token: Option<&'a str>,
}

/// Result of a rerun request
pub enum RerunOutcome {
    Refused { reason: &'static str },
    Completed { post: post::Model },
}

/// Dispatcher for composing, publishing, and recording posts
pub struct PostingDispatcher<'a> {
    db: &'a DatabaseConnection,
    config: &'a AppConfig,
}

impl<'a> PostingDispatcher<'a> {
    /// Create a new dispatcher over the given connection and configuration
    pub fn new(db: &'a DatabaseConnection, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    /// Resolves the access token for a dispatch: explicit argument,
    /// else the environment-seeded manual token, else the most recently
    /// updated stored X grant.
    pub async fn resolve_access_token(&self, explicit: Option<&str>) -> Result<Option<String>> {
        if let Some(token) = explicit {
            return Ok(Some(token.to_string()));
        }

        if self.config.x.connection_mode.to_lowercase() == "manual_env" {
            if let Some(token) = self.config.x.access_token.as_deref() {
                if !token.is_empty() {
                    return Ok(Some(token.to_string()));
                }
            }
        }

        let accounts = ConnectionRegistry::new(self.db)
            .list_by_provider(Provider::X.as_str())
            .await?;
        Ok(select_latest_token(&accounts, Provider::X.as_str()).map(str::to_string))
    }

    /// Shortens the repository URL, composes the post text, and
    /// dispatches it. Shortener failures degrade to the original URL
    /// and surface as a `shortener_fallback:` warning on the row.
    pub async fn compose_and_dispatch(&self, params: DispatchParams<'_>) -> Result<post::Model> {
        let shareable = LinkShortener::new(&self.config.shortener)
            .shareable_url(params.repo_url)
            .await;
        let warning = shortener_warning(&shareable);

        let text = compose_post(ComposeParams {
            event_type: params.event_type,
            project_name: params.project_name,
            repo_url: &shareable.url,
            topics: params.topics,
            release_tag: params.release_tag,
        });

        self.dispatch(
            params.event_id,
            &text,
            &shareable.url,
            params.access_token,
            warning.as_deref(),
        )
        .await
    }

    /// Publishes `text` for an event and appends exactly one ledger row
    pub async fn dispatch(
        &self,
        event_id: Uuid,
        text: &str,
        target_url: &str,
        explicit_token: Option<&str>,
        warning: Option<&str>,
    ) -> Result<post::Model> {
        let token = self.resolve_access_token(explicit_token).await?;
        let outcome = XClient::new(&self.config.x)
            .publish_post(text, token.as_deref())
            .await;
        let record = map_outcome_to_record(outcome, warning);

        if record.status == PostStatus::Failed {
            tracing::warn!(
                event_id = %event_id,
                error = record.error.as_deref().unwrap_or(""),
                "Post dispatch failed"
            );
        } else {
            tracing::info!(
                event_id = %event_id,
                external_id = record.external_id.as_deref().unwrap_or(""),
                "Post dispatched"
            );
        }

        PostLedger::new(self.db)
            .append(NewPost {
                event_id,
                status: record.status,
                text,
                target_url,
                external_id: record.external_id,
                error: record.error,
            })
            .await
    }

    /// Records a duplicate-delivery skip for an already-known event
    pub async fn save_skipped_duplicate(
        &self,
        event_id: Uuid,
        text: &str,
        target_url: &str,
    ) -> Result<post::Model> {
        PostLedger::new(self.db)
            .append(NewPost {
                event_id,
                status: PostStatus::SkippedDuplicate,
                text,
                target_url,
                external_id: None,
                error: None,
            })
            .await
    }

    /// Records a guardrail or coverage skip with its reason
    pub async fn save_skipped_policy(
        &self,
        event_id: Uuid,
        text: &str,
        target_url: &str,
        reason: &str,
    ) -> Result<post::Model> {
        PostLedger::new(self.db)
            .append(NewPost {
                event_id,
                status: PostStatus::SkippedPolicy,
                text,
                target_url,
                external_id: None,
                error: Some(reason.to_string()),
            })
            .await
    }

    /// Re-dispatches a failed post's stored text and target URL.
    ///
    /// Only allowed while the event's most recent ledger row is FAILED;
    /// a rerun that already succeeded closes the gate. The new row
    /// carries `manual_rerun_from:{post_id}` so provenance survives in
    /// the append-only ledger.
    pub async fn rerun_failed_post(&self, post_id: Uuid) -> Result<RerunOutcome> {
        let ledger = PostLedger::new(self.db);

        let Some(post) = ledger.find_by_id(post_id).await? else {
            return Ok(RerunOutcome::Refused {
                reason: "post_not_found",
            });
        };

        let latest_status = ledger
            .latest_for_event(post.event_id)
            .await?
            .map(|latest| latest.status)
            .unwrap_or_else(|| post.status.clone());
        if latest_status != PostStatus::Failed.as_str() {
            return Ok(RerunOutcome::Refused {
                reason: "post_is_not_failed",
            });
        }

        let token = self.resolve_access_token(None).await?;
        let warning = format!("manual_rerun_from:{}", post.id);
        let new_post = self
            .dispatch(
                post.event_id,
                &post.text,
                &post.target_url,
                token.as_deref(),
                Some(&warning),
            )
            .await?;

        Ok(RerunOutcome::Completed { post: new_post })
    }
}

fn shortener_warning(outcome: &ShortenOutcome) -> Option<String> {
    if outcome.provider == PROVIDER_ABVX {
        if let Some(error) = &outcome.error {
            return Some(format!("shortener_fallback: {}", error));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_outcome_keeps_warning_without_failing() {
        let record = map_outcome_to_record(
            XPostOutcome::Published {
                external_id: "123".to_string(),
            },
            Some("shortener_fallback: shortener_http_500"),
        );

        assert_eq!(record.status, PostStatus::Posted);
        assert_eq!(record.external_id.as_deref(), Some("123"));
        assert_eq!(
            record.error.as_deref(),
            Some("shortener_fallback: shortener_http_500")
        );
    }

    #[test]
    fn test_published_outcome_without_warning_has_no_error() {
        let record = map_outcome_to_record(
            XPostOutcome::Published {
                external_id: "123".to_string(),
            },
            None,
        );

        assert_eq!(record.status, PostStatus::Posted);
        assert_eq!(record.error, None);
    }

    #[test]
    fn test_rejected_outcome_formats_code_and_message() {
        let record = map_outcome_to_record(
            XPostOutcome::Rejected {
                code: XErrorCode::RateLimit,
                message: "X API rate limited (429)".to_string(),
            },
            None,
        );

        assert_eq!(record.status, PostStatus::Failed);
        assert_eq!(record.external_id, None);
        assert_eq!(
            record.error.as_deref(),
            Some("RATE_LIMIT: X API rate limited (429)")
        );
    }

    #[test]
    fn test_rejected_outcome_joins_warning_with_pipe() {
        let record = map_outcome_to_record(
            XPostOutcome::Rejected {
                code: XErrorCode::NetworkError,
                message: "X API request timed out".to_string(),
            },
            Some("shortener_fallback: shortener_invalid_response"),
        );

        assert_eq!(
            record.error.as_deref(),
            Some(
                "shortener_fallback: shortener_invalid_response | NETWORK_ERROR: X API request timed out"
            )
        );
    }

    #[test]
    fn test_shortener_warning_only_for_attempted_calls() {
        let attempted = ShortenOutcome {
            url: "https://github.com/acme/widget".to_string(),
            shortened: false,
            provider: PROVIDER_ABVX,
            error: Some("shortener_http_502".to_string()),
        };
        assert_eq!(
            shortener_warning(&attempted).as_deref(),
            Some("shortener_fallback: shortener_http_502")
        );

        let disabled = ShortenOutcome {
            url: "https://github.com/acme/widget".to_string(),
            shortened: false,
            provider: PROVIDER_NONE,
            error: None,
        };
        assert_eq!(shortener_warning(&disabled), None);

        let misconfigured = ShortenOutcome {
            url: "https://github.com/acme/widget".to_string(),
            shortened: false,
            provider: PROVIDER_NONE,
            error: Some("SHORTENER_API_URL is not configured".to_string()),
        };
        assert_eq!(shortener_warning(&misconfigured), None);
    }
}
