//! Repository entity model
//!
//! This module contains the SeaORM entity model for the repositories table,
//! which mirrors GitHub repository metadata keyed by the external GitHub id.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Repository entity mirroring a GitHub repository
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// External GitHub repository id, unique across the table
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

    /// Repository topics, stored as a JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub topics: JsonValue,

    /// Whether the repository is private on GitHub
    pub is_private: bool,

    /// When the repository row was created
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// When the repository row was last updated
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_one = "super::repository_settings::Entity")]
    Settings,
    #[sea_orm(has_many = "super::event::Entity")]
    Events,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::repository_settings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Settings.def()
    }
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Topics as plain strings, tolerating non-string entries in the stored
    /// JSON array.
    pub fn topic_list(&self) -> Vec<String> {
        self.topics
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }
}
