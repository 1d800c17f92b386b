pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::backend::handlers as backend;
use crate::preview::handlers as preview;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Preview API
        .route(
            "/api/v1/preview",
            get(preview::handle_get_preview).delete(preview::handle_teardown),
        )
        .route(
            "/api/v1/preview/document",
            put(preview::handle_update_document),
        )
        .route(
            "/api/v1/preview/template",
            post(preview::handle_select_template),
        )
        .route("/api/v1/preview/compile", post(preview::handle_compile_now))
        .route(
            "/api/v1/preview/page/:page",
            post(preview::handle_go_to_page),
        )
        .route("/api/v1/preview/image", get(preview::handle_get_image))
        .route("/api/v1/preview/pdf", post(preview::handle_download_pdf))
        // Backend pass-through
        .route("/api/v1/templates", get(backend::handle_list_templates))
        .route("/api/v1/llm/status", get(backend::handle_llm_status))
        .with_state(state)
}
