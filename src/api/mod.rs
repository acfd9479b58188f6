//! REST API for the Litper Pro dashboard

pub mod handlers;
pub mod service;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use handlers::AppState;
pub use service::DashboardService;

/// Largest accepted workbook upload
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn create_rest_router(service: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        // Historical data
        .route(
            "/api/v1/historical",
            get(handlers::get_historical).delete(handlers::delete_historical),
        )
        .route(
            "/api/v1/historical/upload",
            post(handlers::upload_historical).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/v1/historical/template", get(handlers::get_template))
        .route("/api/v1/historical/export", get(handlers::export_historical))
        // Heuristics
        .route("/api/v1/risk", post(handlers::post_risk))
        .route("/api/v1/recommend/:city", get(handlers::get_recommendation))
        .route("/api/v1/report", post(handlers::post_report))
        // Integrations
        .route("/api/v1/integrations", get(handlers::get_integrations))
        .route(
            "/api/v1/integrations/providers/:provider",
            put(handlers::put_provider),
        )
        .route(
            "/api/v1/integrations/providers/:provider/test",
            post(handlers::test_provider),
        )
        .route(
            "/api/v1/integrations/assignments/:function",
            put(handlers::put_assignment),
        )
        // AI
        .route("/api/v1/chat", post(handlers::post_chat))
        .route("/api/v1/command", post(handlers::post_command))
        .route("/api/v1/whatsapp", post(handlers::post_whatsapp))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
