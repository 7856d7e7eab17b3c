//! Post ledger store for database operations
//!
//! The ledger is append-only: every dispatch decision inserts a new row
//! and nothing ever updates one. Reads serve the audit listing and the
//! rerun eligibility check.

use std::collections::HashMap;

use anyhow::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::models::PostStatus;
use crate::models::event::{self, Entity as Event};
use crate::models::post::{self, Entity as Post};
use crate::models::repository::{self, Entity as Repository};

/// Attributes for one ledger row
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub event_id: Uuid,
    pub status: PostStatus,
    pub text: &'a str,
    pub target_url: &'a str,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

/// One ledger row joined with its event and repository context
pub type PostWithContext = (
    post::Model,
    Option<event::Model>,
    Option<repository::Model>,
);

/// Store for post ledger rows
pub struct PostLedger<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> PostLedger<'a> {
    /// Create a new PostLedger with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Appends one ledger row
    pub async fn append(&self, attrs: NewPost<'_>) -> Result<post::Model> {
        let now = chrono::Utc::now();
        let active = post::ActiveModel {
            id: Set(Uuid::new_v4()),
            event_id: Set(attrs.event_id),
            status: Set(attrs.status.as_str().to_string()),
            text: Set(attrs.text.to_string()),
            target_url: Set(attrs.target_url.to_string()),
            external_id: Set(attrs.external_id),
            error: Set(attrs.error),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(active.insert(self.db).await?)
    }

    /// Finds a ledger row by its primary key
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<post::Model>> {
        Ok(Post::find_by_id(id).one(self.db).await?)
    }

    /// Most recent ledger row for an event, ordered by creation time
    /// then id for stability
    pub async fn latest_for_event(&self, event_id: Uuid) -> Result<Option<post::Model>> {
        Ok(Post::find()
            .filter(post::Column::EventId.eq(event_id))
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
            .one(self.db)
            .await?)
    }

    /// Newest ledger rows with their event and repository context
    pub async fn list_recent(&self, limit: u64) -> Result<Vec<PostWithContext>> {
        let rows = Post::find()
            .find_also_related(Event)
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
            .limit(limit)
            .all(self.db)
            .await?;

        let repository_ids: Vec<Uuid> = rows
            .iter()
            .filter_map(|(_, event)| event.as_ref().map(|e| e.repository_id))
            .collect();

        let repositories: HashMap<Uuid, repository::Model> = if repository_ids.is_empty() {
            HashMap::new()
        } else {
            Repository::find()
                .filter(repository::Column::Id.is_in(repository_ids))
                .all(self.db)
                .await?
                .into_iter()
                .map(|repo| (repo.id, repo))
                .collect()
        };

        Ok(rows
            .into_iter()
            .map(|(post, event)| {
                let repo = event
                    .as_ref()
                    .and_then(|e| repositories.get(&e.repository_id).cloned());
                (post, event, repo)
            })
            .collect())
    }
}
