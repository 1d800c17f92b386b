//! Pass-through handlers for backend data the shell shows next to the preview.

use axum::{extract::State, Json};

use crate::backend::{LlmStatus, TemplateInfo};
use crate::errors::AppError;
use crate::state::AppState;

/// GET /api/v1/templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<TemplateInfo>>, AppError> {
    Ok(Json(state.backend.list_templates().await?))
}

/// GET /api/v1/llm/status
pub async fn handle_llm_status(
    State(state): State<AppState>,
) -> Result<Json<LlmStatus>, AppError> {
    Ok(Json(state.backend.llm_status().await?))
}
