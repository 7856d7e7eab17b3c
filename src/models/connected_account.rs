//! Connected account entity model
//!
//! This module contains the SeaORM entity model for the connected_accounts
//! table, which stores provider grants (GitHub, X) for the owner. Multiple
//! rows per provider may accumulate; readers take the latest by update time.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connected account entity holding one provider grant
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "connected_accounts")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Provider discriminator, `github` or `x`
    pub provider: String,

    /// Provider-side account identifier (login or numeric id)
    pub provider_user: String,

    /// Access token, absent when the grant was revoked upstream
    pub access_token: Option<String>,

    /// Refresh token when the provider issued one
    pub refresh_token: Option<String>,

    /// Access token expiry when the provider reported one
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,

    /// When the account row was created
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// When the account row was last updated
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
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
