//! Auto-compile coordinator — turns edits and page changes into compile requests.
//!
//! Edits are debounced (trailing edge); explicit compiles and page changes go out
//! immediately. Each request runs on its own task with a cancellation token, and
//! its result is applied only if no newer request has been issued since
//! (last issued wins, not last completed).
//!
//! The public operations never fail and never block on I/O. They must be called
//! from inside a tokio runtime. The state mutex is never held while a preview
//! file is written or deleted.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{CompileBackend, CompileError, RenderedPage};
use crate::preview::resource::PreviewResource;
use crate::preview::session::{CompileSession, Completion, Issued, PreviewSnapshot};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Called once per session, the first time a preview is installed.
pub type FirstSuccessHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub debounce: Duration,
    /// Where preview image files are written.
    pub preview_dir: PathBuf,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            preview_dir: std::env::temp_dir(),
        }
    }
}

struct State {
    session: CompileSession,
    timer: Option<JoinHandle<()>>,
    // Bumped whenever the timer is disarmed, so a timer that already woke up
    // cannot fire after being replaced.
    timer_generation: u64,
}

impl State {
    fn disarm_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.timer_generation += 1;
    }
}

struct Shared {
    state: Mutex<State>,
    backend: Arc<dyn CompileBackend>,
    settings: CoordinatorSettings,
    on_first_success: Option<FirstSuccessHook>,
}

#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    pub fn new(
        backend: Arc<dyn CompileBackend>,
        settings: CoordinatorSettings,
        on_first_success: Option<FirstSuccessHook>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    session: CompileSession::new(),
                    timer: None,
                    timer_generation: 0,
                }),
                backend,
                settings,
                on_first_success,
            }),
        }
    }

    /// Records an edit and (re)arms the debounce timer. When it fires, page 0
    /// is compiled. Missing inputs or the uploaded-file template make this a
    /// no-op that returns false.
    pub fn schedule_compile(&self, document: Option<Value>, template: Option<String>) -> bool {
        let mut state = self.shared.lock();
        if !state.session.set_inputs(document, template) {
            debug!("Compile not scheduled: nothing compilable selected");
            return false;
        }
        state.disarm_timer();

        let generation = state.timer_generation;
        let deadline = Instant::now() + self.shared.settings.debounce;
        let shared = Arc::clone(&self.shared);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut state = shared.lock();
            if state.timer_generation != generation {
                return;
            }
            state.timer = None;
            Shared::issue(&shared, &mut state, 0);
        }));
        true
    }

    /// Compiles the current page now, skipping the debounce.
    pub fn trigger_immediate_compile(&self) {
        let mut state = self.shared.lock();
        state.disarm_timer();
        let page = state.session.current_page();
        Shared::issue(&self.shared, &mut state, page);
    }

    /// Switches to `page` and compiles it now. The page is not range-checked.
    pub fn go_to_page(&self, page: u32) {
        let mut state = self.shared.lock();
        state.session.set_page(page);
        state.disarm_timer();
        Shared::issue(&self.shared, &mut state, page);
    }

    /// Ends the session: disarms the timer, cancels the in-flight request and
    /// releases the preview.
    pub fn teardown(&self) {
        let released = {
            let mut state = self.shared.lock();
            state.disarm_timer();
            state.session.teardown()
        };
        drop(released);
        info!("Preview session torn down");
    }

    pub fn snapshot(&self) -> PreviewSnapshot {
        self.shared.lock().session.snapshot()
    }

    /// Bytes and content type of the preview on screen, if any.
    pub fn preview_image(&self) -> Option<(Bytes, String)> {
        self.shared
            .lock()
            .session
            .preview()
            .map(|p| (p.image(), p.content_type().to_string()))
    }

    /// The document and template the session is editing.
    pub fn inputs(&self) -> (Option<Value>, Option<String>) {
        let state = self.shared.lock();
        let (document, template) = state.session.inputs();
        (document.cloned(), template.map(str::to_string))
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut CompileSession) -> R) -> R {
        f(&mut self.lock().session)
    }

    /// The compile primitive. Allocates a sequence and spawns the request.
    fn issue(shared: &Arc<Shared>, state: &mut State, page: u32) {
        let Some(issued) = state.session.begin(page) else {
            debug!("Compile skipped: nothing compilable selected");
            return;
        };
        let shared = Arc::clone(shared);
        tokio::spawn(async move { shared.run(issued).await });
    }

    async fn run(&self, issued: Issued) {
        let Issued {
            sequence,
            request,
            cancel,
        } = issued;
        debug!(sequence, page = request.page, template = %request.template_id, "Issuing compile");

        let outcome = self.backend.compile_page(&request, &cancel).await;

        let completion = match outcome {
            Ok(page) => self.install(sequence, page).await,
            Err(CompileError::Cancelled) => self.with_session(|s| s.apply_cancelled(sequence)),
            Err(_) if cancel.is_cancelled() => self.with_session(|s| s.apply_cancelled(sequence)),
            Err(e) => self.with_session(|s| s.apply_failure(sequence, e.user_message())),
        };

        match completion {
            Completion::Installed { first_success } => {
                debug!(sequence, "Preview updated");
                if first_success {
                    info!("First preview of this session is ready");
                    if let Some(hook) = &self.on_first_success {
                        hook();
                    }
                }
            }
            Completion::Failed => warn!(sequence, "Compile failed"),
            Completion::Stale => debug!(sequence, "Discarded stale compile result"),
            Completion::Cancelled => debug!(sequence, "Compile cancelled"),
        }
    }

    /// Writes the page to disk off the runtime, then swaps it in. Whatever the
    /// session hands back is dropped (and its file deleted) after unlocking.
    async fn install(&self, sequence: u64, page: RenderedPage) -> Completion {
        if !self.with_session(|s| s.is_current(sequence)) {
            return Completion::Stale;
        }

        let RenderedPage {
            image,
            content_type,
            page_count,
        } = page;
        let dir = self.settings.preview_dir.clone();
        let written =
            tokio::task::spawn_blocking(move || PreviewResource::create(&dir, image, content_type))
                .await
                .unwrap_or_else(|e| Err(e.into()));

        let resource = match written {
            Ok(resource) => resource,
            Err(e) => {
                let message = format!("Failed to store preview: {e}");
                return self.with_session(|s| s.apply_failure(sequence, message));
            }
        };

        let (completion, released) =
            self.with_session(|s| s.install(sequence, resource, page_count));
        drop(released);
        completion
    }
}
