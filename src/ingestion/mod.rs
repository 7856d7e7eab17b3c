//! Webhook ingestion pipeline
//!
//! Turns verified GitHub deliveries into stored events and ledger rows.
//! Deduplication rides on the events table's unique source key; the
//! guardrail decides eligibility once per delivery; every decision ends
//! as exactly one post row per event.

pub mod composer;
pub mod guardrail;
pub mod semver;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::config::AppConfig;
use crate::models::event::EventType;
use crate::models::{repository, repository_settings};
use crate::posting::{DispatchParams, PostingDispatcher};
use crate::repositories::{EventStore, NewEvent, RepositoryStore, RepositoryUpsert, UserRepository};

use guardrail::{duplicate_skip_message, evaluate_repository_activation};
use semver::{is_major_version_tag, parse_semver_tag};

/// Reason recorded when a guardrail refusal carries no specific reason
const FALLBACK_POLICY_REASON: &str = "repository_not_eligible_for_posting";

/// `release` webhook payload, trimmed to the fields ingestion reads
#[derive(Debug, Clone, Deserialize)]
pub struct ReleasePayload {
    pub action: String,
    pub repository: RepositoryInfo,
    pub release: ReleaseInfo,
}

/// `create` webhook payload (tags and branches)
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayload {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub ref_type: String,
    pub repository: RepositoryInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInfo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    pub owner: OwnerInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerInfo {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseInfo {
    pub id: i64,
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<String>,
}

/// Pipeline turning webhook payloads into events and ledger rows
pub struct IngestionPipeline<'a> {
    db: &'a DatabaseConnection,
    config: &'a AppConfig,
}

impl<'a> IngestionPipeline<'a> {
    /// Create a new pipeline over the given connection and configuration
    pub fn new(db: &'a DatabaseConnection, config: &'a AppConfig) -> Self {
        Self { db, config }
    }

    /// Handles a `release` delivery.
    ///
    /// Only published, non-draft, non-prerelease releases count. A new
    /// primary event may derive FIRST_PUBLIC_RELEASE (release count
    /// became 1) and MAJOR_VERSION (tag is `X.0.0`, `X >= 1`); both
    /// reuse the primary guardrail decision and token snapshot.
    pub async fn handle_release_published(
        &self,
        payload: ReleasePayload,
        raw: JsonValue,
    ) -> Result<()> {
        if payload.action != "published" || payload.release.draft || payload.release.prerelease {
            tracing::debug!(
                action = %payload.action,
                draft = payload.release.draft,
                prerelease = payload.release.prerelease,
                "Ignoring release delivery"
            );
            return Ok(());
        }

        let (repo, settings) = self.ensure_repository(&payload.repository).await?;

        let release_tag = payload.release.tag_name.clone();
        let occurred_at = parse_occurred_at(payload.release.published_at.as_deref());
        let source_key = format!("release:{}:published", payload.release.id);

        let events = EventStore::new(self.db);
        let dispatcher = PostingDispatcher::new(self.db, self.config);

        let primary = events
            .try_create(NewEvent {
                repository_id: repo.id,
                event_type: EventType::ReleasePublished,
                source_key: &source_key,
                occurred_at,
                payload: raw.clone(),
                release_tag: Some(release_tag.clone()),
            })
            .await?;

        if !primary.created {
            dispatcher
                .save_skipped_duplicate(
                    primary.event.id,
                    &duplicate_skip_message(&source_key),
                    &repo.html_url,
                )
                .await?;
            return Ok(());
        }

        // One guardrail decision covers the primary and both derived
        // events for this delivery.
        let activation = evaluate_repository_activation(repo.is_private, settings.as_ref());
        if !activation.can_post {
            dispatcher
                .save_skipped_policy(
                    primary.event.id,
                    &format!("Release event skipped for {}", repo.full_name),
                    &repo.html_url,
                    activation.reason.unwrap_or(FALLBACK_POLICY_REASON),
                )
                .await?;
            return Ok(());
        }

        let access_token = dispatcher.resolve_access_token(None).await?;
        let topics = repo.topic_list();

        dispatcher
            .compose_and_dispatch(DispatchParams {
                event_id: primary.event.id,
                event_type: EventType::ReleasePublished,
                project_name: &repo.name,
                repo_url: &repo.html_url,
                topics: &topics,
                release_tag: Some(&release_tag),
                access_token: access_token.as_deref(),
            })
            .await?;

        if events.count_releases(repo.id).await? == 1 {
            let first_source_key =
                format!("repo:{}:first_public_release", payload.repository.id);
            let first = events
                .try_create(NewEvent {
                    repository_id: repo.id,
                    event_type: EventType::FirstPublicRelease,
                    source_key: &first_source_key,
                    occurred_at,
                    payload: raw.clone(),
                    release_tag: Some(release_tag.clone()),
                })
                .await?;

            if first.created {
                dispatcher
                    .compose_and_dispatch(DispatchParams {
                        event_id: first.event.id,
                        event_type: EventType::FirstPublicRelease,
                        project_name: &repo.name,
                        repo_url: &repo.html_url,
                        topics: &topics,
                        release_tag: Some(&release_tag),
                        access_token: access_token.as_deref(),
                    })
                    .await?;
            } else {
                dispatcher
                    .save_skipped_duplicate(
                        first.event.id,
                        &duplicate_skip_message(&first_source_key),
                        &repo.html_url,
                    )
                    .await?;
            }
        }

        if is_major_version_tag(&release_tag) {
            let major_source_key =
                format!("repo:{}:major:{}", payload.repository.id, release_tag);
            let major = events
                .try_create(NewEvent {
                    repository_id: repo.id,
                    event_type: EventType::MajorVersion,
                    source_key: &major_source_key,
                    occurred_at,
                    payload: raw,
                    release_tag: Some(release_tag.clone()),
                })
                .await?;

            if major.created {
                dispatcher
                    .compose_and_dispatch(DispatchParams {
                        event_id: major.event.id,
                        event_type: EventType::MajorVersion,
                        project_name: &repo.name,
                        repo_url: &repo.html_url,
                        topics: &topics,
                        release_tag: Some(&release_tag),
                        access_token: access_token.as_deref(),
                    })
                    .await?;
            } else {
                dispatcher
                    .save_skipped_duplicate(
                        major.event.id,
                        &duplicate_skip_message(&major_source_key),
                        &repo.html_url,
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Handles a `create` delivery for tags.
    ///
    /// Non-tag refs and tags that do not parse as semver are silently
    /// ignored. A tag already covered by a RELEASE_PUBLISHED event for
    /// the same tag string records a coverage skip against that event
    /// instead of a second milestone.
    pub async fn handle_tag_created(&self, payload: CreatePayload, raw: JsonValue) -> Result<()> {
        if payload.ref_type != "tag" {
            return Ok(());
        }

        let Some(semver) = parse_semver_tag(&payload.ref_name) else {
            tracing::debug!(tag = %payload.ref_name, "Ignoring non-semver tag");
            return Ok(());
        };

        let (repo, settings) = self.ensure_repository(&payload.repository).await?;

        let events = EventStore::new(self.db);
        let dispatcher = PostingDispatcher::new(self.db, self.config);

        if let Some(covering) = events
            .find_release_by_tag(repo.id, &payload.ref_name)
            .await?
        {
            dispatcher
                .save_skipped_policy(
                    covering.id,
                    &format!("Tag event skipped for {}", repo.full_name),
                    &repo.html_url,
                    "covered_by_release_published",
                )
                .await?;
            return Ok(());
        }

        let source_key = format!("repo:{}:tag:{}", payload.repository.id, semver.normalized);
        let created = events
            .try_create(NewEvent {
                repository_id: repo.id,
                event_type: EventType::VersionTag,
                source_key: &source_key,
                occurred_at: Utc::now(),
                payload: raw,
                release_tag: Some(payload.ref_name.clone()),
            })
            .await?;

        if !created.created {
            dispatcher
                .save_skipped_duplicate(
                    created.event.id,
                    &duplicate_skip_message(&source_key),
                    &repo.html_url,
                )
                .await?;
            return Ok(());
        }

        let activation = evaluate_repository_activation(repo.is_private, settings.as_ref());
        if !activation.can_post {
            dispatcher
                .save_skipped_policy(
                    created.event.id,
                    &format!("Version tag skipped for {}", repo.full_name),
                    &repo.html_url,
                    activation.reason.unwrap_or(FALLBACK_POLICY_REASON),
                )
                .await?;
            return Ok(());
        }

        let access_token = dispatcher.resolve_access_token(None).await?;
        let topics = repo.topic_list();

        dispatcher
            .compose_and_dispatch(DispatchParams {
                event_id: created.event.id,
                event_type: EventType::VersionTag,
                project_name: &repo.name,
                repo_url: &repo.html_url,
                topics: &topics,
                release_tag: Some(&payload.ref_name),
                access_token: access_token.as_deref(),
            })
            .await?;

        Ok(())
    }

    /// Upserts the repository a delivery references, owned by the local
    /// owner user. Webhook payloads never carry visibility or branch
    /// changes; those stay as created (or as the last sync set them).
    async fn ensure_repository(
        &self,
        info: &RepositoryInfo,
    ) -> Result<(repository::Model, Option<repository_settings::Model>)> {
        let owner = UserRepository::new(self.db)
            .ensure_owner(&self.config.owner_email)
            .await?;

        let topics = info.topics.clone().unwrap_or_default();
        let store = RepositoryStore::new(self.db);
        let repo = store
            .upsert(
                owner.id,
                RepositoryUpsert {
                    github_id: info.id,
                    owner: &info.owner.login,
                    name: &info.name,
                    full_name: &info.full_name,
                    html_url: &info.html_url,
                    topics: &topics,
                    default_branch: None,
                    is_private: None,
                },
            )
            .await?;
        let settings = store.find_settings(repo.id).await?;

        Ok((repo, settings))
    }
}

fn parse_occurred_at(published_at: Option<&str>) -> DateTime<Utc> {
    published_at
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
