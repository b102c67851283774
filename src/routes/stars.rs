//! Repository star-count proxy

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::Result;
use crate::state::AppState;

#[derive(Serialize)]
struct StarsResponse {
    stars: u64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(stars))
}

/// GET /stars
async fn stars(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let repo = state.publisher().api().get_repository().await?;
    tracing::debug!(repo = %repo.full_name, stars = repo.stars, "Fetched star count");

    Ok((
        [(header::CACHE_CONTROL, "public, max-age=600")],
        Json(StarsResponse { stars: repo.stars }),
    ))
}
