//! Post entity model
//!
//! This module contains the SeaORM entity model for the posts table, the
//! append-only dispatch ledger. Every posting decision lands here as a new
//! row, including skips and failures; nothing is ever rewritten.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Post ledger entity recording one dispatch decision
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "posts")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Event this decision belongs to
    pub event_id: Uuid,

    /// Ledger status, one of the [`PostStatus`] wire forms
    pub status: String,

    /// Composed post text (or skip description for skipped rows)
    pub text: String,

    /// URL the post points at
    pub target_url: String,

    /// Remote post id when dispatch succeeded
    pub external_id: Option<String>,

    /// Failure detail, skip reason, or carried warning
    pub error: Option<String>,

    /// When the ledger row was created
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// When the ledger row was last updated
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::event::Entity",
        from = "Column::EventId",
        to = "super::event::Column::Id"
    )]
    Event,
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Ledger statuses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostStatus {
    Posted,
    Failed,
    SkippedDuplicate,
    SkippedPolicy,
}

impl PostStatus {
    /// Stable column value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Posted => "POSTED",
            PostStatus::Failed => "FAILED",
            PostStatus::SkippedDuplicate => "SKIPPED_DUPLICATE",
            PostStatus::SkippedPolicy => "SKIPPED_POLICY",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
