use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{error::AppError, ServerState};

use super::handlers::{ai, email};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        // The bundled frontend is served from arbitrary origins.
        let cors_layer = CorsLayer::permissive();

        Router::new()
            .route("/", get(|| async { "Onebox server" }))
            .nest(
                "/api",
                Router::new()
                    .route("/init-sync", get(email::init_sync))
                    .route("/emails", post(email::add_email))
                    .route("/emails/search", get(email::search))
                    .route("/emails/reprocess-ai", post(email::reprocess_ai))
                    .route("/emails/ai-process", post(ai::ai_process))
                    .route("/ai/analyze-email", post(ai::analyze_email)),
            )
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer)
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    AppError::NotFound("Route does not exist".to_string())
}
