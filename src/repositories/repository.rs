//! Repository store for database operations
//!
//! Upserts keyed on the external GitHub id, settings management, and the
//! listing used by the dashboard API. Webhook-driven upserts refresh
//! repository metadata but never touch the activation switch; a settings
//! row is attached inactive on first contact.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::repository::{self, Entity as Repository};
use crate::models::repository_settings::{self, Entity as RepositorySettings};

/// Attributes for one repository upsert.
///
/// `default_branch` and `is_private` are `None` on the webhook path,
/// which leaves existing values alone (and falls back to `main` / public
/// on create). The sync path supplies both from the GitHub listing.
#[derive(Debug, Clone)]
pub struct RepositoryUpsert<'a> {
    pub github_id: i64,
    pub owner: &'a str,
    pub name: &'a str,
    pub full_name: &'a str,
    pub html_url: &'a str,
    pub topics: &'a [String],
    pub default_branch: Option<&'a str>,
    pub is_private: Option<bool>,
}

/// Repository store for repository and settings rows
pub struct RepositoryStore<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> RepositoryStore<'a> {
    /// Create a new RepositoryStore with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Upserts a repository by its external GitHub id.
    ///
    /// Newly created repositories get a settings row with `is_active`
    /// false. Concurrent creates race on the unique github_id index; the
    /// loser re-reads and applies its update to the winner's row.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        attrs: RepositoryUpsert<'_>,
    ) -> Result<repository::Model> {
        if let Some(existing) = self.find_by_github_id(attrs.github_id).await? {
            return self.apply_update(existing, user_id, &attrs).await;
        }

        let now = Utc::now();
        let active = repository::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            github_id: Set(attrs.github_id),
            owner: Set(attrs.owner.to_string()),
            name: Set(attrs.name.to_string()),
            full_name: Set(attrs.full_name.to_string()),
            html_url: Set(attrs.html_url.to_string()),
            default_branch: Set(attrs.default_branch.unwrap_or("main").to_string()),
            topics: Set(serde_json::json!(attrs.topics)),
            is_private: Set(attrs.is_private.unwrap_or(false)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match active.insert(self.db).await {
            Ok(model) => {
                self.ensure_settings(model.id).await?;
                Ok(model)
            }
            Err(err) if is_unique_violation(&err) => {
                let existing = self.find_by_github_id(attrs.github_id).await?.ok_or_else(|| {
                    anyhow!(
                        "repository with github id {} not found after insert conflict",
                        attrs.github_id
                    )
                })?;
                self.apply_update(existing, user_id, &attrs).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_update(
        &self,
        existing: repository::Model,
        user_id: Uuid,
        attrs: &RepositoryUpsert<'_>,
    ) -> Result<repository::Model> {
        let mut model: repository::ActiveModel = existing.into();
        model.user_id = Set(user_id);
        model.owner = Set(attrs.owner.to_string());
        model.name = Set(attrs.name.to_string());
        model.full_name = Set(attrs.full_name.to_string());
        model.html_url = Set(attrs.html_url.to_string());
        model.topics = Set(serde_json::json!(attrs.topics));
        if let Some(branch) = attrs.default_branch {
            model.default_branch = Set(branch.to_string());
        }
        if let Some(private) = attrs.is_private {
            model.is_private = Set(private);
        }
        model.updated_at = Set(Utc::now());

        Ok(model.update(self.db).await?)
    }

    /// Inserts an inactive settings row, tolerating a concurrent insert.
    async fn ensure_settings(&self, repository_id: Uuid) -> Result<()> {
        let now = Utc::now();
        let active = repository_settings::ActiveModel {
            id: Set(Uuid::new_v4()),
            repository_id: Set(repository_id),
            is_active: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match active.insert(self.db).await {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Finds a repository by its primary key
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<repository::Model>> {
        Ok(Repository::find_by_id(id).one(self.db).await?)
    }

    /// Finds a repository by its external GitHub id
    pub async fn find_by_github_id(&self, github_id: i64) -> Result<Option<repository::Model>> {
        Ok(Repository::find()
            .filter(repository::Column::GithubId.eq(github_id))
            .one(self.db)
            .await?)
    }

    /// Finds the settings row for a repository
    pub async fn find_settings(
        &self,
        repository_id: Uuid,
    ) -> Result<Option<repository_settings::Model>> {
        Ok(RepositorySettings::find()
            .filter(repository_settings::Column::RepositoryId.eq(repository_id))
            .one(self.db)
            .await?)
    }

    /// Lists all repositories with their settings, ordered by full name
    pub async fn list_with_settings(
        &self,
    ) -> Result<Vec<(repository::Model, Option<repository_settings::Model>)>> {
        Ok(Repository::find()
            .find_also_related(RepositorySettings)
            .order_by_asc(repository::Column::FullName)
            .all(self.db)
            .await?)
    }

    /// Sets the activation switch, creating the settings row if absent.
    pub async fn set_activation(
        &self,
        repository_id: Uuid,
        is_active: bool,
    ) -> Result<repository_settings::Model> {
        if let Some(existing) = self.find_settings(repository_id).await? {
            return self.apply_activation(existing, is_active).await;
        }

        let now = Utc::now();
        let active = repository_settings::ActiveModel {
            id: Set(Uuid::new_v4()),
            repository_id: Set(repository_id),
            is_active: Set(is_active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match active.insert(self.db).await {
            Ok(model) => Ok(model),
            Err(err) if is_unique_violation(&err) => {
                let existing = self.find_settings(repository_id).await?.ok_or_else(|| {
                    anyhow!(
                        "settings for repository '{}' not found after insert conflict",
                        repository_id
                    )
                })?;
                self.apply_activation(existing, is_active).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_activation(
        &self,
        existing: repository_settings::Model,
        is_active: bool,
    ) -> Result<repository_settings::Model> {
        let mut model: repository_settings::ActiveModel = existing.into();
        model.is_active = Set(is_active);
        model.updated_at = Set(Utc::now());
        Ok(model.update(self.db).await?)
    }
}
