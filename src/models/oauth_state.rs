//! # OAuth State Model
//!
//! This module contains the OAuth state entity for storing OAuth flow state
//! tokens. Rows are single-use: consumption deletes before validating.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use uuid::Uuid;

/// OAuth State entity for storing OAuth flow state tokens
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Provider name (`github` or `x`)
    pub provider: String,

    /// State token generated for CSRF protection
    pub state: String,

    /// Redirect URI the authorize request was issued with
    pub redirect_uri: String,

    /// PKCE code verifier (X only)
    pub code_verifier: Option<String>,

    /// Expiration timestamp
    pub expires_at: chrono::DateTime<chrono::Utc>,

    /// When the state was created
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// When the state was last updated
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
