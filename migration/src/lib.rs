//! Database migrations for the Announcer service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_08_01_100000_create_users;
mod m2026_08_01_100100_create_repositories;
mod m2026_08_01_100200_create_repository_settings;
mod m2026_08_01_100300_create_connected_accounts;
mod m2026_08_01_100400_create_events;
mod m2026_08_01_100500_create_posts;
mod m2026_08_01_100600_create_oauth_states;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_08_01_100000_create_users::Migration),
            Box::new(m2026_08_01_100100_create_repositories::Migration),
            Box::new(m2026_08_01_100200_create_repository_settings::Migration),
            Box::new(m2026_08_01_100300_create_connected_accounts::Migration),
            Box::new(m2026_08_01_100400_create_events::Migration),
            Box::new(m2026_08_01_100500_create_posts::Migration),
            Box::new(m2026_08_01_100600_create_oauth_states::Migration),
        ]
    }
}
