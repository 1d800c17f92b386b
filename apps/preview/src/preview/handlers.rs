//! Axum route handlers for the Preview API.

use std::sync::atomic::Ordering;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::drafts::Draft;
use crate::errors::AppError;
use crate::preview::{PreviewSnapshot, UPLOADED_FILE_TEMPLATE};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DocumentUpdate {
    pub template_id: Option<String>,
    pub resume_data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct PreviewStatusResponse {
    #[serde(flatten)]
    pub snapshot: PreviewSnapshot,
    /// True exactly once after the first preview of a session is ready.
    pub collapse_side_panel: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/preview
pub async fn handle_get_preview(State(state): State<AppState>) -> Json<PreviewStatusResponse> {
    Json(PreviewStatusResponse {
        snapshot: state.coordinator.snapshot(),
        collapse_side_panel: state.collapse_panel.swap(false, Ordering::SeqCst),
    })
}

/// PUT /api/v1/preview/document
///
/// Called on every edit. Schedules a debounced compile and, if the edit was
/// accepted, saves it as the draft. Incomplete edits leave both untouched.
pub async fn handle_update_document(
    State(state): State<AppState>,
    Json(update): Json<DocumentUpdate>,
) -> (StatusCode, Json<PreviewSnapshot>) {
    if state
        .coordinator
        .schedule_compile(update.resume_data, update.template_id)
    {
        save_session_draft(&state).await;
    }
    (StatusCode::ACCEPTED, Json(state.coordinator.snapshot()))
}

/// POST /api/v1/preview/template
///
/// Selects a template. Editable templates compile right away; the uploaded-file
/// template ends the preview session.
pub async fn handle_select_template(
    State(state): State<AppState>,
    Json(update): Json<DocumentUpdate>,
) -> Result<(StatusCode, Json<PreviewSnapshot>), AppError> {
    let template = update
        .template_id
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("template_id is required".to_string()))?
        .to_string();

    if template == UPLOADED_FILE_TEMPLATE {
        info!("Uploaded file selected; closing preview session");
        state.coordinator.teardown();
        // Restoring this draft is a no-op, like the session it replaces.
        save_draft(&state, &Draft::new(Some(template), update.resume_data)).await;
        return Ok((StatusCode::OK, Json(state.coordinator.snapshot())));
    }

    info!("Template selected: {template}");
    if state
        .coordinator
        .schedule_compile(update.resume_data, Some(template))
    {
        save_session_draft(&state).await;
    }
    state.coordinator.trigger_immediate_compile();
    Ok((StatusCode::ACCEPTED, Json(state.coordinator.snapshot())))
}

/// POST /api/v1/preview/compile
pub async fn handle_compile_now(
    State(state): State<AppState>,
) -> (StatusCode, Json<PreviewSnapshot>) {
    state.coordinator.trigger_immediate_compile();
    (StatusCode::ACCEPTED, Json(state.coordinator.snapshot()))
}

/// POST /api/v1/preview/page/:page
pub async fn handle_go_to_page(
    State(state): State<AppState>,
    Path(page): Path<u32>,
) -> Result<(StatusCode, Json<PreviewSnapshot>), AppError> {
    let page_count = state.coordinator.snapshot().page_count;
    if page >= page_count {
        return Err(AppError::Validation(format!(
            "page {page} is out of range (document has {page_count} pages)"
        )));
    }
    state.coordinator.go_to_page(page);
    Ok((StatusCode::ACCEPTED, Json(state.coordinator.snapshot())))
}

/// DELETE /api/v1/preview
pub async fn handle_teardown(State(state): State<AppState>) -> StatusCode {
    state.coordinator.teardown();
    StatusCode::NO_CONTENT
}

/// GET /api/v1/preview/image
pub async fn handle_get_image(State(state): State<AppState>) -> Result<Response, AppError> {
    let (image, content_type) = state
        .coordinator
        .preview_image()
        .ok_or_else(|| AppError::NotFound("No preview has been rendered yet".to_string()))?;
    Ok(([(header::CONTENT_TYPE, content_type)], image).into_response())
}

/// POST /api/v1/preview/pdf
///
/// Final, non-paginated compile of the document being edited.
pub async fn handle_download_pdf(State(state): State<AppState>) -> Result<Response, AppError> {
    let (document, template) = state.coordinator.inputs();
    let (Some(document), Some(template)) = (document, template) else {
        return Err(AppError::Validation(
            "Select a template and enter resume data before downloading".to_string(),
        ));
    };

    let pdf = state.backend.compile_pdf(&template, &document).await?;
    info!("Compiled PDF with {template} ({} bytes)", pdf.len());

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"resume.pdf\"".to_string(),
            ),
        ],
        pdf,
    )
        .into_response())
}

/// Saves what the session is editing, so a restore reproduces it.
async fn save_session_draft(state: &AppState) {
    let (document, template) = state.coordinator.inputs();
    save_draft(state, &Draft::new(template, document)).await;
}

async fn save_draft(state: &AppState, draft: &Draft) {
    if let Err(e) = state.drafts.save(draft).await {
        warn!("Could not save draft: {e:#}");
    }
}
