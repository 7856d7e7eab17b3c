//! # Data Models
//!
//! This module contains all the data models used throughout the Announcer
//! service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connected_account;
pub mod event;
pub mod oauth_state;
pub mod post;
pub mod repository;
pub mod repository_settings;
pub mod user;

pub use connected_account::Entity as ConnectedAccount;
pub use event::Entity as Event;
pub use event::EventType;
pub use oauth_state::Entity as OAuthState;
pub use post::Entity as Post;
pub use post::PostStatus;
pub use repository::Entity as Repository;
pub use repository_settings::Entity as RepositorySettings;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "announcer".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
