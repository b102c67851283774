//! Asset Relay Server Library
//!
//! Receives assets in chunks, groups them into client-defined sessions and
//! publishes each session to a GitHub repository as a single commit.
//!
//! # Modules
//!
//! - `upload`: Session store and chunk assembly
//! - `publish`: Commit pipeline over the Git Data API
//! - `github`: Remote API seam and its GitHub client
//! - `routes`: HTTP handlers

pub mod assets;
pub mod config;
pub mod error;
pub mod github;
pub mod publish;
pub mod routes;
pub mod state;
pub mod upload;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_body_bytes = state.config().upload.max_body_bytes;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/upload", routes::upload::router(max_body_bytes))
        .nest("/stars", routes::stars::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
