mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::error::ApiResponse;
use crate::services::{Mailer, ResendMailer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linklet=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Linklet...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    // Outbound email
    let mailer: Arc<dyn Mailer> = Arc::new(ResendMailer::new(&config.email));

    // Create app state
    let state = AppState {
        db,
        config: config.clone(),
        mailer,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/users", post(handlers::auth::signup))
        .route("/users/login", post(handlers::auth::login))
        .route("/users/verify-2fa", post(handlers::auth::verify_2fa));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/users/me", get(handlers::auth::me))
        .route(
            "/links",
            get(handlers::link::list_links).post(handlers::link::create_link),
        )
        .route("/links/:id", delete(handlers::link::delete_link))
        .route("/links/:id/stats", get(handlers::link::link_stats))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/r/:short_code", get(handlers::link::redirect))
        .nest("/api/v1", public_routes.merge(protected_routes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<ApiResponse<()>> {
    Json(ApiResponse::<()>::success_message("API is running"))
}
