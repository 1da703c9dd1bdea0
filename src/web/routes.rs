use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// REST API plus the message-envelope entry point
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Message contract endpoint
            .route("/message", post(handlers::api::message))
            // Query endpoint
            .route("/query", post(handlers::api::nl_query))
            // Schema passthrough
            .route("/schema", get(handlers::api::get_schema))
            // Pipeline history
            .route("/history", get(handlers::api::get_history))
            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}
