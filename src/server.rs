//! # Server Configuration
//!
//! This module contains the router assembly, shared state, and startup
//! for the Announcer API.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::handlers;
use crate::telemetry::{self, TraceContext};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/webhooks/github",
            post(handlers::webhooks::ingest_github_webhook),
        )
        .route("/posts", get(handlers::posts::list_posts))
        .route("/posts/{post_id}/rerun", post(handlers::posts::rerun_post))
        .route(
            "/repositories",
            get(handlers::repositories::list_repositories),
        )
        .route(
            "/repositories/{repository_id}/activation",
            patch(handlers::repositories::set_repository_activation),
        )
        .route(
            "/repositories/sync",
            post(handlers::repositories::sync_repositories),
        )
        .route(
            "/connect/{provider}/start",
            get(handlers::connect::oauth_start),
        )
        .route(
            "/connect/{provider}/callback",
            get(handlers::connect::oauth_callback),
        )
        .route("/connect/x/sync", post(handlers::connect::sync_x_connection))
        .route("/connections", get(handlers::connect::list_connections))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Scopes each request in a task-local trace context so error responses
/// carry a correlation id
async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let context = TraceContext {
        trace_id: Uuid::new_v4().to_string(),
    };
    telemetry::with_trace_context(context, next.run(request)).await
}

/// CORS restricted to the configured dashboard origin
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE]);

    match HeaderValue::from_str(config.dashboard_url.trim_end_matches('/')) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => layer,
    }
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState {
        config: Arc::new(config),
        db,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on: {}", addr);
    println!("Running in profile: {}", profile);

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::webhooks::ingest_github_webhook,
        crate::handlers::posts::list_posts,
        crate::handlers::posts::rerun_post,
        crate::handlers::repositories::list_repositories,
        crate::handlers::repositories::set_repository_activation,
        crate::handlers::repositories::sync_repositories,
        crate::handlers::connect::oauth_start,
        crate::handlers::connect::oauth_callback,
        crate::handlers::connect::sync_x_connection,
        crate::handlers::connect::list_connections,
    ),
    components(
        schemas(
            crate::error::ApiError,
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::webhooks::WebhookAcceptResponse,
            crate::handlers::posts::PostInfo,
            crate::handlers::posts::PostEventInfo,
            crate::handlers::posts::PostRepositoryInfo,
            crate::handlers::posts::PostsResponse,
            crate::handlers::posts::RerunResponse,
            crate::handlers::repositories::RepositoryInfo,
            crate::handlers::repositories::RepositoriesResponse,
            crate::handlers::repositories::ActivationRequest,
            crate::handlers::repositories::ActivationResponse,
            crate::handlers::repositories::SyncResponse,
            crate::handlers::connect::ConnectedAccountInfo,
            crate::handlers::connect::GithubConnectionInfo,
            crate::handlers::connect::XConnectionInfo,
            crate::handlers::connect::ConnectionsResponse,
            crate::handlers::connect::XSyncResponse,
        )
    ),
    info(
        title = "Announcer API",
        description = "GitHub release ingestion and X announcement dispatch",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
