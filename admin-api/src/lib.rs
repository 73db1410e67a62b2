//! HTTP admin surface for managing sources and inspecting deliveries.

pub mod error;
pub mod handlers;

pub use error::ApiError;

use axum::{
    routing::{get, post, put},
    Router,
};
use background_service::SourceScheduler;
use relay_core::{ConfigStore, DedupLedger, SourceDirectory};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn ConfigStore>,
    pub ledger: Arc<dyn DedupLedger>,
    pub directory: Arc<dyn SourceDirectory>,
    pub scheduler: Arc<SourceScheduler>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/api/health", get(|| async { "ok" }))
        .route("/api/subreddits/search", get(handlers::search_subreddits))
        .route(
            "/api/configs",
            get(handlers::list_configs).post(handlers::create_config),
        )
        .route(
            "/api/configs/{id}",
            get(handlers::get_config)
                .put(handlers::update_config)
                .delete(handlers::delete_config),
        )
        .route("/api/configs/{id}/toggle", post(handlers::toggle_config))
        .route("/api/configs/{id}/send-now", post(handlers::send_now))
        .route("/api/deliveries", get(handlers::recent_deliveries))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
