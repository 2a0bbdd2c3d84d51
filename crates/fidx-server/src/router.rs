use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router over shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handler::health_handler))
        .route("/api/manage/list", get(handler::list_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
