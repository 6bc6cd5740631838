pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::dispatch::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Print API
        .route("/api/v1/print", post(handlers::handle_print))
        .route("/api/v1/print/single", post(handlers::handle_print_single))
        .route("/api/v1/print/batch", post(handlers::handle_print_batch))
        .with_state(state)
}
