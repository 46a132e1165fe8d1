use axum::Router;
use axum::routing::{get, post};

use crate::handlers::{AppState, chat_completions, healthz, list_models, stats};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/chat/completions", post(chat_completions))
        .route("/models", get(list_models))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .with_state(state)
}
