//! Control-plane REST API and WebSocket stream.
//!
//! ## Endpoints
//!
//! - `GET  /api/v1/health` - storage health probe
//! - `GET  /api/v1/alerts/history` - recent alerts for a subject
//! - `GET  /api/v1/trends` - five fixed windows per parameter
//! - `GET  /api/v1/detector` - current detector selection
//! - `POST /api/v1/detector` - change the detector selection
//! - `GET  /api/v1/subjects/:subject_id/baselines` - learning statistics
//! - `POST /api/v1/subjects/:subject_id/baselines/reset` - reset learning
//! - `WS   /ws/stream` - processed samples and alerts, live

pub mod dto;
pub mod error;
pub mod handlers;
pub mod state;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Build the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/alerts/history", get(handlers::alerts_history))
        .route("/api/v1/trends", get(handlers::trends))
        .route(
            "/api/v1/detector",
            get(handlers::get_detector).post(handlers::set_detector),
        )
        .route(
            "/api/v1/subjects/:subject_id/baselines",
            get(handlers::baseline_statistics),
        )
        .route(
            "/api/v1/subjects/:subject_id/baselines/reset",
            post(handlers::reset_baselines),
        )
        .route("/ws/stream", get(websocket::ws_handler))
        .with_state(state)
}
