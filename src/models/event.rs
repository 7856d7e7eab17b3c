//! Event entity model
//!
//! This module contains the SeaORM entity model for the events table. Each
//! row is one logical occurrence with a globally unique source key; the
//! unique constraint on that key is what makes ingestion idempotent.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Event entity representing one stored occurrence
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Repository the event belongs to
    pub repository_id: Uuid,

    /// Event kind, one of the [`EventType`] wire forms
    pub event_type: String,

    /// Globally unique idempotency key
    pub source_key: String,

    /// When the event occurred at the source
    pub occurred_at: chrono::DateTime<chrono::Utc>,

    /// Raw webhook delivery payload
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Release or tag name when the event carries one
    pub release_tag: Option<String>,

    /// When the event row was created
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// When the event row was last updated
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::repository::Entity",
        from = "Column::RepositoryId",
        to = "super::repository::Column::Id"
    )]
    Repository,
    #[sea_orm(has_many = "super::post::Entity")]
    Posts,
}

impl Related<super::repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repository.def()
    }
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Kinds of stored events.
///
/// `ReleasePublished` and `VersionTag` arrive over the webhook; the other
/// two are derived milestones synthesized from a release delivery.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    ReleasePublished,
    FirstPublicRelease,
    MajorVersion,
    VersionTag,
}

impl EventType {
    /// Stable column value for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ReleasePublished => "RELEASE_PUBLISHED",
            EventType::FirstPublicRelease => "FIRST_PUBLIC_RELEASE",
            EventType::MajorVersion => "MAJOR_VERSION",
            EventType::VersionTag => "VERSION_TAG",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
