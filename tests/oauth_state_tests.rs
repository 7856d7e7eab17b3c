//! Single-use OAuth state tests
//!
//! Authorize-flow state rows against a migrated database: every consume
//! burns the row regardless of outcome, X states carry a PKCE verifier,
//! and expired rows refuse and clean up.

use announcer::config::AppConfig;
use announcer::db;
use announcer::oauth::{ConsumedState, OauthStateManager, Provider, code_challenge_s256};
use announcer::repositories::{NewOauthState, OauthStateStore};
use chrono::{Duration, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use tempfile::TempDir;

const REDIRECT_URI: &str = "http://localhost:3000/connect/x/callback";

async fn setup_db() -> (DatabaseConnection, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("announcer_oauth_state.sqlite");
    let config = AppConfig {
        database_url: format!("sqlite://{}?mode=rwc", db_path.display()),
        ..AppConfig::default()
    };

    let db = db::init_pool(&config)
        .await
        .expect("Failed to initialize test database");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    (db, dir)
}

#[tokio::test]
async fn test_github_state_round_trip_has_no_verifier() {
    let (db, _guard) = setup_db().await;
    let manager = OauthStateManager::new(&db);

    let issued = manager
        .issue(Provider::Github, "http://localhost:3000/connect/github/callback")
        .await
        .unwrap();
    assert!(issued.code_challenge.is_none());

    let consumed = manager
        .consume(Provider::Github, &issued.state)
        .await
        .unwrap();
    match consumed {
        ConsumedState::Valid {
            code_verifier,
            redirect_uri,
        } => {
            assert!(code_verifier.is_none());
            assert_eq!(
                redirect_uri,
                "http://localhost:3000/connect/github/callback"
            );
        }
        _ => panic!("expected a valid consumption"),
    }
}

#[tokio::test]
async fn test_x_state_round_trip_carries_pkce_verifier() {
    let (db, _guard) = setup_db().await;
    let manager = OauthStateManager::new(&db);

    let issued = manager.issue(Provider::X, REDIRECT_URI).await.unwrap();
    let challenge = issued.code_challenge.clone().expect("X issues a challenge");

    let consumed = manager.consume(Provider::X, &issued.state).await.unwrap();
    match consumed {
        ConsumedState::Valid { code_verifier, .. } => {
            let verifier = code_verifier.expect("verifier stored for X");
            // The stored verifier must hash to the challenge that went
            // into the authorize URL
            assert_eq!(code_challenge_s256(&verifier), challenge);
        }
        _ => panic!("expected a valid consumption"),
    }
}

#[tokio::test]
async fn test_state_is_single_use() {
    let (db, _guard) = setup_db().await;
    let manager = OauthStateManager::new(&db);

    let issued = manager.issue(Provider::X, REDIRECT_URI).await.unwrap();

    let first = manager.consume(Provider::X, &issued.state).await.unwrap();
    assert!(matches!(first, ConsumedState::Valid { .. }));

    let replay = manager.consume(Provider::X, &issued.state).await.unwrap();
    match replay {
        ConsumedState::Refused { reason } => assert_eq!(reason, "state_not_found"),
        _ => panic!("replayed state must be refused"),
    }
}

#[tokio::test]
async fn test_provider_mismatch_burns_the_state() {
    let (db, _guard) = setup_db().await;
    let manager = OauthStateManager::new(&db);

    let issued = manager
        .issue(Provider::Github, "http://localhost:3000/connect/github/callback")
        .await
        .unwrap();

    let crossed = manager.consume(Provider::X, &issued.state).await.unwrap();
    match crossed {
        ConsumedState::Refused { reason } => assert_eq!(reason, "state_provider_mismatch"),
        _ => panic!("crossed provider must be refused"),
    }

    // The mismatch consumed the row, so the right provider is too late
    let retry = manager
        .consume(Provider::Github, &issued.state)
        .await
        .unwrap();
    match retry {
        ConsumedState::Refused { reason } => assert_eq!(reason, "state_not_found"),
        _ => panic!("burned state must be refused"),
    }
}

#[tokio::test]
async fn test_expired_state_is_refused_and_burned() {
    let (db, _guard) = setup_db().await;

    OauthStateStore::new(&db)
        .create(NewOauthState {
            provider: "x",
            state: "expired-token",
            redirect_uri: REDIRECT_URI,
            code_verifier: Some("verifier".to_string()),
            expires_at: Utc::now() - Duration::minutes(5),
        })
        .await
        .unwrap();

    let manager = OauthStateManager::new(&db);
    let consumed = manager.consume(Provider::X, "expired-token").await.unwrap();
    match consumed {
        ConsumedState::Refused { reason } => assert_eq!(reason, "state_expired"),
        _ => panic!("expired state must be refused"),
    }

    let retry = manager.consume(Provider::X, "expired-token").await.unwrap();
    match retry {
        ConsumedState::Refused { reason } => assert_eq!(reason, "state_not_found"),
        _ => panic!("burned state must be refused"),
    }
}

#[tokio::test]
async fn test_expired_rows_are_swept_on_issue() {
    let (db, _guard) = setup_db().await;
    let store = OauthStateStore::new(&db);

    store
        .create(NewOauthState {
            provider: "github",
            state: "stale-direct",
            redirect_uri: REDIRECT_URI,
            code_verifier: None,
            expires_at: Utc::now() - Duration::minutes(30),
        })
        .await
        .unwrap();
    assert_eq!(store.cleanup_expired().await.unwrap(), 1);

    store
        .create(NewOauthState {
            provider: "github",
            state: "stale-on-issue",
            redirect_uri: REDIRECT_URI,
            code_verifier: None,
            expires_at: Utc::now() - Duration::minutes(30),
        })
        .await
        .unwrap();
    let fresh = OauthStateManager::new(&db)
        .issue(Provider::Github, REDIRECT_URI)
        .await
        .unwrap();

    // Issuing the fresh state already swept the stale row
    assert!(store.find_by_state("stale-on-issue").await.unwrap().is_none());
    assert!(store.find_by_state(&fresh.state).await.unwrap().is_some());
}
