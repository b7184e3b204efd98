// crates/server/src/lib.rs
//! Markbook server library.
//!
//! Axum-based HTTP server around the markbook-core job orchestration:
//! clients submit a roster CSV plus results-portal URL, poll the returned
//! job id, and download the generated spreadsheet once the job completes.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod sweep;

pub use config::Config;
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::api_routes;
pub use state::AppState;
pub use sweep::spawn_eviction_sweep;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, jobs)
/// - CORS for local development (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
