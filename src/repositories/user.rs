//! User repository for database operations
//!
//! The service is single-owner: every ingestion path anchors rows to one
//! user record looked up (or created) by the configured owner email.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::user::{self, Entity as User};

/// Repository for user database operations
pub struct UserRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds the owner user by email, creating it on first contact.
    ///
    /// Concurrent first contacts race on the unique email index; the
    /// loser re-reads the winner's row.
    pub async fn ensure_owner(&self, email: &str) -> Result<user::Model> {
        if let Some(existing) = self.find_by_email(email).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let active = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match active.insert(self.db).await {
            Ok(model) => Ok(model),
            Err(err) if is_unique_violation(&err) => self
                .find_by_email(email)
                .await?
                .ok_or_else(|| anyhow!("owner user '{}' not found after insert conflict", email)),
            Err(err) => Err(err.into()),
        }
    }

    /// Finds a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db)
            .await?)
    }
}
