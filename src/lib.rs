//! # Announcer Library
//!
//! This library provides the core functionality for the Announcer service:
//! GitHub webhook ingestion, derived release milestones, guardrail policy,
//! X dispatch with an append-only posts ledger, and the dashboard API.

pub mod config;
pub mod db;
pub mod error;
pub mod github;
pub mod handlers;
pub mod ingestion;
pub mod models;
pub mod oauth;
pub mod posting;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod webhook_verification;
pub use migration;
