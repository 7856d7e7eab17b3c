//! OAuth state store for database operations
//!
//! Holds single-use authorize-flow state rows. Consumption order
//! (delete before validating) is enforced by the OAuth layer; this
//! store only provides the primitives.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::models::oauth_state::{self, Entity as OauthState};

/// Attributes of a freshly issued authorize-flow state
pub struct NewOauthState<'a> {
    pub provider: &'a str,
    pub state: &'a str,
    pub redirect_uri: &'a str,
    pub code_verifier: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Store for OAuth state rows
pub struct OauthStateStore<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> OauthStateStore<'a> {
    /// Create a new OauthStateStore with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Persists a new state row
    pub async fn create(&self, attrs: NewOauthState<'_>) -> Result<oauth_state::Model> {
        let now = Utc::now();
        let active = oauth_state::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider: Set(attrs.provider.to_string()),
            state: Set(attrs.state.to_string()),
            redirect_uri: Set(attrs.redirect_uri.to_string()),
            code_verifier: Set(attrs.code_verifier),
            expires_at: Set(attrs.expires_at),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(active.insert(self.db).await?)
    }

    /// Finds a state row by its token value
    pub async fn find_by_state(&self, state: &str) -> Result<Option<oauth_state::Model>> {
        Ok(OauthState::find()
            .filter(oauth_state::Column::State.eq(state))
            .one(self.db)
            .await?)
    }

    /// Deletes a state row, reporting whether it still existed
    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let result = OauthState::delete_by_id(id).exec(self.db).await?;
        Ok(result.rows_affected > 0)
    }

    /// Removes every expired state row, returning how many were dropped
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = OauthState::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lt(Utc::now()))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
