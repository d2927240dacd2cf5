// lib.rs - Template builder core: streaming schema extraction, chat session, preview service
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod session;

use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use models::template::{ParsedField, ParsedObject, PartialSchema};
pub use services::streaming_schema::{parse_streaming_schema, SchemaStream};
pub use session::{ChatSession, SessionError, SessionState};

// Shared state handed to every handler through an Extension layer
pub struct AppState {
    pub config: config::AppConfig,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::preview::preview_routes())
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}
