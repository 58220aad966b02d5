//! Route modules for the OmniPage server

pub mod health;
pub mod ocr;

use axum::{extract::DefaultBodyLimit, Router};

use crate::state::AppState;

/// Build the application router
///
/// Transport layers (tracing, CORS) are added by the binary.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config().server.max_upload_bytes;

    Router::new()
        .merge(health::router())
        .merge(ocr::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
