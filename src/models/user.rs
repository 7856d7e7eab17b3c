//! User entity model
//!
//! This module contains the SeaORM entity model for the users table. The
//! service is single-owner, so in practice the table holds one row that
//! anchors repositories and connected accounts.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User entity representing the local owner account
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owner email, unique across the table
    pub email: String,

    /// When the user was created
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// When the user was last updated
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::connected_account::Entity")]
    ConnectedAccounts,
    #[sea_orm(has_many = "super::repository::Entity")]
    Repositories,
}

impl Related<super::connected_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConnectedAccounts.def()
    }
}

impl Related<super::repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repositories.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
