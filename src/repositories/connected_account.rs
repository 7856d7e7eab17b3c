//! Connected account registry for database operations
//!
//! Stores provider grants keyed by `(provider, provider_user)` and
//! answers "latest token wins" lookups. Token selection itself is a pure
//! function over a row slice so call sites and tests share one rule.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::connected_account::{self, Entity as ConnectedAccount};

/// Registry for connected account rows
pub struct ConnectionRegistry<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ConnectionRegistry<'a> {
    /// Create a new ConnectionRegistry with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Upserts a bare access token grant (manual sync, GitHub OAuth).
    ///
    /// On update only the owner and access token move; an existing
    /// refresh token or expiry is left alone.
    pub async fn upsert_token(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user: &str,
        access_token: &str,
    ) -> Result<connected_account::Model> {
        if let Some(existing) = self.find_by_provider_user(provider, provider_user).await? {
            let mut model: connected_account::ActiveModel = existing.into();
            model.user_id = Set(user_id);
            model.access_token = Set(Some(access_token.to_string()));
            model.updated_at = Set(Utc::now());
            return Ok(model.update(self.db).await?);
        }

        self.insert_grant(user_id, provider, provider_user, access_token, None, None)
            .await
    }

    /// Upserts a full OAuth grant (X authorization code flow).
    ///
    /// A missing refresh token keeps any stored one; the expiry is
    /// always overwritten, clearing it when the provider reported none.
    pub async fn upsert_oauth_grant(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user: &str,
        access_token: &str,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<connected_account::Model> {
        if let Some(existing) = self.find_by_provider_user(provider, provider_user).await? {
            let mut model: connected_account::ActiveModel = existing.into();
            model.user_id = Set(user_id);
            model.access_token = Set(Some(access_token.to_string()));
            if let Some(refresh) = refresh_token {
                model.refresh_token = Set(Some(refresh));
            }
            model.expires_at = Set(expires_at);
            model.updated_at = Set(Utc::now());
            return Ok(model.update(self.db).await?);
        }

        self.insert_grant(
            user_id,
            provider,
            provider_user,
            access_token,
            refresh_token,
            expires_at,
        )
        .await
    }

    async fn insert_grant(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user: &str,
        access_token: &str,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<connected_account::Model> {
        let now = Utc::now();
        let active = connected_account::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider: Set(provider.to_string()),
            provider_user: Set(provider_user.to_string()),
            access_token: Set(Some(access_token.to_string())),
            refresh_token: Set(refresh_token),
            expires_at: Set(expires_at),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match active.insert(self.db).await {
            Ok(model) => Ok(model),
            Err(err) if is_unique_violation(&err) => {
                // racing upsert; hand the row to the update path
                let existing = self
                    .find_by_provider_user(provider, provider_user)
                    .await?
                    .ok_or_else(|| {
                        anyhow!(
                            "account '{}/{}' not found after insert conflict",
                            provider,
                            provider_user
                        )
                    })?;
                let mut model: connected_account::ActiveModel = existing.into();
                model.user_id = Set(user_id);
                model.access_token = Set(Some(access_token.to_string()));
                model.updated_at = Set(Utc::now());
                Ok(model.update(self.db).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Finds an account by its unique `(provider, provider_user)` pair
    pub async fn find_by_provider_user(
        &self,
        provider: &str,
        provider_user: &str,
    ) -> Result<Option<connected_account::Model>> {
        Ok(ConnectedAccount::find()
            .filter(connected_account::Column::Provider.eq(provider))
            .filter(connected_account::Column::ProviderUser.eq(provider_user))
            .one(self.db)
            .await?)
    }

    /// Lists all accounts for a provider, newest update first
    pub async fn list_by_provider(
        &self,
        provider: &str,
    ) -> Result<Vec<connected_account::Model>> {
        Ok(ConnectedAccount::find()
            .filter(connected_account::Column::Provider.eq(provider))
            .order_by_desc(connected_account::Column::UpdatedAt)
            .all(self.db)
            .await?)
    }

    /// Most recently updated account for a provider
    pub async fn latest_by_provider(
        &self,
        provider: &str,
    ) -> Result<Option<connected_account::Model>> {
        Ok(ConnectedAccount::find()
            .filter(connected_account::Column::Provider.eq(provider))
            .order_by_desc(connected_account::Column::UpdatedAt)
            .one(self.db)
            .await?)
    }

    /// Most recently updated account for a provider that still holds a token
    pub async fn latest_with_token(
        &self,
        provider: &str,
    ) -> Result<Option<connected_account::Model>> {
        Ok(ConnectedAccount::find()
            .filter(connected_account::Column::Provider.eq(provider))
            .filter(connected_account::Column::AccessToken.is_not_null())
            .order_by_desc(connected_account::Column::UpdatedAt)
            .one(self.db)
            .await?)
    }
}

/// Picks the access token of the provider's most recently updated row.
///
/// Returns `None` when no row matches or when the newest row has no
/// token; an older row's token never wins over a newer revoked one.
pub fn select_latest_token<'m>(
    accounts: &'m [connected_account::Model],
    provider: &str,
) -> Option<&'m str> {
    accounts
        .iter()
        .filter(|account| account.provider == provider)
        .max_by_key(|account| account.updated_at)
        .and_then(|account| account.access_token.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(
        provider: &str,
        token: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> connected_account::Model {
        connected_account::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider: provider.to_string(),
            provider_user: format!("user-{}", Uuid::new_v4()),
            access_token: token.map(str::to_string),
            refresh_token: None,
            expires_at: None,
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn latest_token_prefers_newest_row() {
        let now = Utc::now();
        let accounts = vec![
            account("x", Some("old-token"), now - Duration::hours(2)),
            account("x", Some("new-token"), now),
            account("x", Some("mid-token"), now - Duration::hours(1)),
        ];

        assert_eq!(select_latest_token(&accounts, "x"), Some("new-token"));
    }

    #[test]
    fn latest_token_ignores_other_providers() {
        let now = Utc::now();
        let accounts = vec![
            account("github", Some("gh-token"), now),
            account("x", Some("x-token"), now - Duration::hours(3)),
        ];

        assert_eq!(select_latest_token(&accounts, "x"), Some("x-token"));
        assert_eq!(select_latest_token(&accounts, "github"), Some("gh-token"));
    }

    #[test]
    fn latest_token_empty_when_no_rows() {
        assert_eq!(select_latest_token(&[], "x"), None);
    }

    #[test]
    fn newest_revoked_row_shadows_older_token() {
        let now = Utc::now();
        let accounts = vec![
            account("x", Some("stale-token"), now - Duration::hours(1)),
            account("x", None, now),
        ];

        assert_eq!(select_latest_token(&accounts, "x"), None);
    }
}
