//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for database entities, providing a clean API for data access.

pub mod connected_account;
pub mod event;
pub mod oauth_state;
pub mod post;
pub mod repository;
pub mod user;

pub use connected_account::{ConnectionRegistry, select_latest_token};
pub use event::{EventStore, NewEvent, TryCreate};
pub use oauth_state::{NewOauthState, OauthStateStore};
pub use post::{NewPost, PostLedger, PostWithContext};
pub use repository::{RepositoryStore, RepositoryUpsert};
pub use user::UserRepository;
