// crates/server/src/routes/mod.rs
//! API route handlers for the markbook server.

pub mod health;
pub mod jobs;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` router with all routes attached to the given state.
pub fn api_routes(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(jobs::router())
        .with_state(state);

    Router::new().nest("/api", api)
}
