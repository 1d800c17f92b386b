//! Compile session — the in-memory state behind one editing surface.
//!
//! Everything here is synchronous and free of I/O. The coordinator locks the
//! session, calls one of these methods, and unlocks; no method ever awaits or
//! touches the disk. Preview resources are created before `install` and dropped
//! by the caller after the lock is gone. A completion is applied only if its
//! sequence still equals `current_sequence`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::preview::request::{is_compilable, CompileRequest};
use crate::preview::resource::PreviewResource;

/// A request the session has just issued. The caller runs it.
#[derive(Debug)]
pub struct Issued {
    pub sequence: u64,
    pub request: CompileRequest,
    pub cancel: CancellationToken,
}

/// What happened when a completion was handed back to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A newer request was issued meanwhile; nothing changed.
    Stale,
    /// New preview installed. `first_success` is set once per session.
    Installed { first_success: bool },
    /// Error recorded; the previous preview is still on screen.
    Failed,
    /// Cancelled by us; nothing reported.
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewInfo {
    pub id: Uuid,
    pub content_type: String,
    pub path: PathBuf,
}

/// Serializable view of the session for the shell.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewSnapshot {
    pub template_id: Option<String>,
    pub sequence: Option<u64>,
    pub compiling: bool,
    pub error: Option<String>,
    pub page_count: u32,
    pub current_page: u32,
    pub has_ever_succeeded: bool,
    pub preview: Option<PreviewInfo>,
    pub last_compiled_at: Option<DateTime<Utc>>,
    pub installs: u64,
    pub releases: u64,
}

#[derive(Debug, Default)]
pub struct CompileSession {
    // Survives teardown so sequence numbers are never reused.
    sequence_counter: u64,
    current_sequence: Option<u64>,
    pending_cancellation: Option<CancellationToken>,
    current_preview: Option<PreviewResource>,
    page_count: u32,
    current_page: u32,
    has_ever_succeeded: bool,
    compiling: bool,
    error: Option<String>,
    last_compiled_at: Option<DateTime<Utc>>,
    document: Option<Value>,
    template: Option<String>,
    installs: u64,
    releases: u64,
}

impl CompileSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores new inputs and resets to the first page.
    /// Returns false, touching nothing, when the inputs cannot be compiled.
    pub fn set_inputs(&mut self, document: Option<Value>, template: Option<String>) -> bool {
        if !is_compilable(document.as_ref(), template.as_deref()) {
            return false;
        }
        self.document = document;
        self.template = template;
        self.current_page = 0;
        true
    }

    pub fn set_page(&mut self, page: u32) {
        self.current_page = page;
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn inputs(&self) -> (Option<&Value>, Option<&str>) {
        (self.document.as_ref(), self.template.as_deref())
    }

    /// Issues a compile for `page`: cancels the previous request, allocates the
    /// next sequence number and marks the session as compiling.
    /// Returns `None` when the stored inputs cannot be compiled.
    pub fn begin(&mut self, page: u32) -> Option<Issued> {
        let (Some(document), Some(template)) = (self.document.as_ref(), self.template.as_deref())
        else {
            return None;
        };
        if !is_compilable(Some(document), Some(template)) {
            return None;
        }
        let request = CompileRequest {
            document: document.clone(),
            template_id: template.to_string(),
            page,
        };

        if let Some(previous) = self.pending_cancellation.take() {
            previous.cancel();
        }

        self.sequence_counter += 1;
        let sequence = self.sequence_counter;
        let cancel = CancellationToken::new();

        self.current_sequence = Some(sequence);
        self.pending_cancellation = Some(cancel.clone());
        self.compiling = true;
        self.error = None;

        Some(Issued {
            sequence,
            request,
            cancel,
        })
    }

    pub fn is_current(&self, sequence: u64) -> bool {
        self.current_sequence == Some(sequence)
    }

    fn settle(&mut self) {
        self.compiling = false;
        self.pending_cancellation = None;
    }

    /// Installs a preview that was written to disk for `sequence`.
    ///
    /// Returns the resource the caller must drop after unlocking: the preview
    /// that was replaced, or `resource` itself when a newer request was issued
    /// while the file was being written.
    pub fn install(
        &mut self,
        sequence: u64,
        resource: PreviewResource,
        page_count: u32,
    ) -> (Completion, Option<PreviewResource>) {
        if !self.is_current(sequence) {
            return (Completion::Stale, Some(resource));
        }

        let replaced = self.current_preview.replace(resource);
        if replaced.is_some() {
            self.releases += 1;
        }
        self.installs += 1;
        self.page_count = page_count;
        self.last_compiled_at = Some(Utc::now());
        self.settle();

        let first_success = !self.has_ever_succeeded;
        self.has_ever_succeeded = true;
        (Completion::Installed { first_success }, replaced)
    }

    pub fn apply_failure(&mut self, sequence: u64, message: String) -> Completion {
        if !self.is_current(sequence) {
            return Completion::Stale;
        }
        self.error = Some(message);
        self.settle();
        Completion::Failed
    }

    pub fn apply_cancelled(&mut self, sequence: u64) -> Completion {
        if self.is_current(sequence) {
            self.settle();
        }
        Completion::Cancelled
    }

    /// Cancels the in-flight request and forgets the inputs. Any completion
    /// still outstanding becomes stale. The preview is handed back so the
    /// caller can release it outside the lock.
    pub fn teardown(&mut self) -> Option<PreviewResource> {
        if let Some(cancel) = self.pending_cancellation.take() {
            cancel.cancel();
        }
        let released = self.current_preview.take();
        if released.is_some() {
            self.releases += 1;
        }
        *self = Self {
            sequence_counter: self.sequence_counter,
            installs: self.installs,
            releases: self.releases,
            ..Self::default()
        };
        released
    }

    pub fn preview(&self) -> Option<&PreviewResource> {
        self.current_preview.as_ref()
    }

    pub fn snapshot(&self) -> PreviewSnapshot {
        PreviewSnapshot {
            template_id: self.template.clone(),
            sequence: self.current_sequence,
            compiling: self.compiling,
            error: self.error.clone(),
            page_count: self.page_count,
            current_page: self.current_page,
            has_ever_succeeded: self.has_ever_succeeded,
            preview: self.current_preview.as_ref().map(|p| PreviewInfo {
                id: p.id(),
                content_type: p.content_type().to_string(),
                path: p.path(),
            }),
            last_compiled_at: self.last_compiled_at,
            installs: self.installs,
            releases: self.releases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use bytes::Bytes;
    use serde_json::json;

    fn resource(dir: &Path, tag: &'static [u8]) -> PreviewResource {
        PreviewResource::create(dir, Bytes::from_static(tag), "image/png".to_string()).unwrap()
    }

    /// Writes `tag` and installs it, dropping whatever comes back.
    fn apply(
        session: &mut CompileSession,
        sequence: u64,
        dir: &Path,
        tag: &'static [u8],
        page_count: u32,
    ) -> Completion {
        session.install(sequence, resource(dir, tag), page_count).0
    }

    fn ready_session() -> CompileSession {
        let mut session = CompileSession::new();
        assert!(session.set_inputs(Some(json!({"name": "Ada"})), Some("template2".to_string())));
        session
    }

    #[test]
    fn test_begin_allocates_increasing_sequences() {
        let mut session = ready_session();
        let a = session.begin(0).unwrap();
        let b = session.begin(0).unwrap();
        let c = session.begin(1).unwrap();
        assert!(a.sequence < b.sequence && b.sequence < c.sequence);
        assert_eq!(session.snapshot().sequence, Some(c.sequence));
        assert_eq!(c.request.page, 1);
        assert_eq!(c.request.template_id, "template2");
    }

    #[test]
    fn test_begin_cancels_previous_request() {
        let mut session = ready_session();
        let a = session.begin(0).unwrap();
        assert!(!a.cancel.is_cancelled());
        let b = session.begin(0).unwrap();
        assert!(a.cancel.is_cancelled());
        assert!(!b.cancel.is_cancelled());
    }

    #[test]
    fn test_begin_without_inputs_is_noop() {
        let mut session = CompileSession::new();
        assert!(session.begin(0).is_none());
        assert_eq!(session.snapshot().sequence, None);
        assert!(!session.snapshot().compiling);
    }

    #[test]
    fn test_guarded_inputs_leave_state_untouched() {
        let mut session = ready_session();
        session.set_page(2);
        assert!(!session.set_inputs(None, Some("template2".to_string())));
        assert!(!session.set_inputs(Some(json!({})), None));
        assert!(!session.set_inputs(Some(json!({})), Some("uploaded_file".to_string())));
        assert_eq!(session.current_page(), 2);
        assert_eq!(session.inputs().1, Some("template2"));
    }

    #[test]
    fn test_stale_success_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session();
        let a = session.begin(0).unwrap();
        let b = session.begin(0).unwrap();

        let first = apply(&mut session, b.sequence, dir.path(), b"B", 2);
        assert_eq!(first, Completion::Installed { first_success: true });
        let preview_b = session.preview().unwrap().id();

        assert_eq!(
            apply(&mut session, a.sequence, dir.path(), b"A", 5),
            Completion::Stale
        );
        assert_eq!(session.preview().unwrap().id(), preview_b);
        assert_eq!(session.preview().unwrap().image(), Bytes::from_static(b"B"));
        assert_eq!(session.snapshot().page_count, 2);
    }

    #[test]
    fn test_stale_completion_keeps_compiling_flag() {
        let mut session = ready_session();
        let a = session.begin(0).unwrap();
        let _b = session.begin(0).unwrap();
        session.apply_failure(a.sequence, "late".to_string());
        let snap = session.snapshot();
        assert!(snap.compiling);
        assert!(snap.error.is_none());
    }

    #[test]
    fn test_replacing_preview_releases_previous_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session();
        for _ in 0..4 {
            let issued = session.begin(0).unwrap();
            apply(&mut session, issued.sequence, dir.path(), b"x", 1);
        }
        let snap = session.snapshot();
        assert_eq!(snap.installs, 4);
        assert_eq!(snap.releases, 3);
        // Only the live preview remains on disk.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_install_hands_back_replaced_preview() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session();
        let a = session.begin(0).unwrap();
        let (_, replaced) = session.install(a.sequence, resource(dir.path(), b"A"), 1);
        assert!(replaced.is_none());
        let path_a = session.preview().unwrap().path();

        let b = session.begin(0).unwrap();
        let (completion, replaced) = session.install(b.sequence, resource(dir.path(), b"B"), 1);
        assert_eq!(completion, Completion::Installed { first_success: false });
        let replaced = replaced.unwrap();
        assert_eq!(replaced.path(), path_a);
        // Counted as released, but the file goes away only when the caller drops it.
        assert_eq!(session.snapshot().releases, 1);
        assert!(path_a.exists());
        drop(replaced);
        assert!(!path_a.exists());
    }

    #[test]
    fn test_stale_install_returns_the_new_resource() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session();
        let a = session.begin(0).unwrap();
        let _b = session.begin(0).unwrap();

        let (completion, unused) = session.install(a.sequence, resource(dir.path(), b"A"), 1);
        assert_eq!(completion, Completion::Stale);
        assert_eq!(unused.unwrap().image(), Bytes::from_static(b"A"));
        let snap = session.snapshot();
        assert!(snap.preview.is_none());
        assert_eq!(snap.installs, 0);
        assert_eq!(snap.releases, 0);
    }

    #[test]
    fn test_teardown_hands_back_preview() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session();
        let ok = session.begin(0).unwrap();
        apply(&mut session, ok.sequence, dir.path(), b"P1", 1);

        let released = session.teardown().unwrap();
        assert!(released.path().exists());
        assert!(session.teardown().is_none());
        drop(released);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failure_preserves_last_good_preview() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session();
        let ok = session.begin(0).unwrap();
        apply(&mut session, ok.sequence, dir.path(), b"P1", 3);
        let p1 = session.preview().unwrap().id();

        let bad = session.begin(0).unwrap();
        assert_eq!(
            session.apply_failure(bad.sequence, "Undefined control sequence".to_string()),
            Completion::Failed
        );
        let snap = session.snapshot();
        assert_eq!(snap.error.as_deref(), Some("Undefined control sequence"));
        assert_eq!(snap.preview.unwrap().id, p1);
        assert_eq!(snap.page_count, 3);
        assert!(!snap.compiling);

        // Issuing the next request clears the error.
        let next = session.begin(0).unwrap();
        assert!(session.snapshot().error.is_none());
        assert_eq!(
            apply(&mut session, next.sequence, dir.path(), b"P2", 3),
            Completion::Installed { first_success: false }
        );
        assert_ne!(session.preview().unwrap().id(), p1);
    }

    #[test]
    fn test_cancelled_completion_is_silent() {
        let mut session = ready_session();
        let issued = session.begin(0).unwrap();
        assert_eq!(session.apply_cancelled(issued.sequence), Completion::Cancelled);
        let snap = session.snapshot();
        assert!(snap.error.is_none());
        assert!(!snap.compiling);
    }

    #[test]
    fn test_teardown_releases_and_invalidates_outstanding() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session();
        let ok = session.begin(0).unwrap();
        apply(&mut session, ok.sequence, dir.path(), b"P1", 1);
        let in_flight = session.begin(0).unwrap();

        session.teardown();
        assert!(in_flight.cancel.is_cancelled());
        assert!(session.preview().is_none());
        let snap = session.snapshot();
        assert_eq!(snap.releases, 1);
        assert_eq!(snap.sequence, None);
        assert!(!snap.has_ever_succeeded);
        assert_eq!(
            apply(&mut session, in_flight.sequence, dir.path(), b"late", 1),
            Completion::Stale
        );

        // Sequence numbers keep growing across sessions.
        session.set_inputs(Some(json!({})), Some("template5".to_string()));
        let next = session.begin(0).unwrap();
        assert!(next.sequence > in_flight.sequence);
    }

    #[test]
    fn test_first_success_reported_once_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session();
        let a = session.begin(0).unwrap();
        assert_eq!(
            apply(&mut session, a.sequence, dir.path(), b"a", 1),
            Completion::Installed { first_success: true }
        );
        let b = session.begin(0).unwrap();
        assert_eq!(
            apply(&mut session, b.sequence, dir.path(), b"b", 1),
            Completion::Installed { first_success: false }
        );

        session.teardown();
        session.set_inputs(Some(json!({})), Some("template2".to_string()));
        let c = session.begin(0).unwrap();
        assert_eq!(
            apply(&mut session, c.sequence, dir.path(), b"c", 1),
            Completion::Installed { first_success: true }
        );
    }
}
