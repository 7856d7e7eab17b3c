//! Event store for database operations
//!
//! Idempotent event persistence keyed on the unique source key. Creation
//! is a single constrained insert, never a check-then-insert pair, so
//! concurrent redeliveries of the same webhook resolve to exactly one
//! stored row.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::EventType;
use crate::models::event::{self, Entity as Event};

/// Attributes for one event insert
#[derive(Debug, Clone)]
pub struct NewEvent<'a> {
    pub repository_id: Uuid,
    pub event_type: EventType,
    pub source_key: &'a str,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
    pub release_tag: Option<String>,
}

/// Result of an idempotent insert attempt.
///
/// `created` is false when the source key already existed; `event` is
/// then the pre-existing row.
#[derive(Debug, Clone)]
pub struct TryCreate {
    pub created: bool,
    pub event: event::Model,
}

/// Store for event rows
pub struct EventStore<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> EventStore<'a> {
    /// Create a new EventStore with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts an event, yielding the existing row on a source key clash.
    ///
    /// The unique index on source_key is the only arbiter: under
    /// concurrent redelivery exactly one caller observes `created`.
    pub async fn try_create(&self, attrs: NewEvent<'_>) -> Result<TryCreate> {
        let now = Utc::now();
        let active = event::ActiveModel {
            id: Set(Uuid::new_v4()),
            repository_id: Set(attrs.repository_id),
            event_type: Set(attrs.event_type.as_str().to_string()),
            source_key: Set(attrs.source_key.to_string()),
            occurred_at: Set(attrs.occurred_at),
            payload: Set(attrs.payload),
            release_tag: Set(attrs.release_tag),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match active.insert(self.db).await {
            Ok(model) => Ok(TryCreate {
                created: true,
                event: model,
            }),
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .find_by_source_key(attrs.source_key)
                    .await?
                    .ok_or_else(|| {
                        anyhow!(
                            "event with source key '{}' not found after insert conflict",
                            attrs.source_key
                        )
                    })?;
                Ok(TryCreate {
                    created: false,
                    event: existing,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns whether an event with the given source key exists
    pub async fn exists(&self, source_key: &str) -> Result<bool> {
        Ok(self.find_by_source_key(source_key).await?.is_some())
    }

    /// Finds an event by its unique source key
    pub async fn find_by_source_key(&self, source_key: &str) -> Result<Option<event::Model>> {
        Ok(Event::find()
            .filter(event::Column::SourceKey.eq(source_key))
            .one(self.db)
            .await?)
    }

    /// Finds an event by its primary key
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<event::Model>> {
        Ok(Event::find_by_id(id).one(self.db).await?)
    }

    /// Counts RELEASE_PUBLISHED events stored for a repository
    pub async fn count_releases(&self, repository_id: Uuid) -> Result<u64> {
        Ok(Event::find()
            .filter(event::Column::RepositoryId.eq(repository_id))
            .filter(event::Column::EventType.eq(EventType::ReleasePublished.as_str()))
            .count(self.db)
            .await?)
    }

    /// Finds a stored RELEASE_PUBLISHED event carrying this exact tag
    pub async fn find_release_by_tag(
        &self,
        repository_id: Uuid,
        release_tag: &str,
    ) -> Result<Option<event::Model>> {
        Ok(Event::find()
            .filter(event::Column::RepositoryId.eq(repository_id))
            .filter(event::Column::EventType.eq(EventType::ReleasePublished.as_str()))
            .filter(event::Column::ReleaseTag.eq(release_tag))
            .one(self.db)
            .await?)
    }
}
