use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::backend::BackendClient;
use crate::config::Config;
use crate::drafts::DraftStore;
use crate::preview::Coordinator;

/// Shared sidecar state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub backend: BackendClient,
    pub drafts: DraftStore,
    pub config: Config,
    /// Raised by the coordinator's first-success hook; cleared when the shell
    /// reads it, so the side panel collapses once per session.
    pub collapse_panel: Arc<AtomicBool>,
}
