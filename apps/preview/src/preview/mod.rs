// Auto-compile preview: debounced, cancellable, sequence-ordered compile requests
// and the single rendered page they produce.

pub mod coordinator;
pub mod handlers;
pub mod request;
pub mod resource;
pub mod session;

pub use coordinator::{Coordinator, CoordinatorSettings, DEFAULT_DEBOUNCE};
pub use request::{CompileRequest, UPLOADED_FILE_TEMPLATE};
pub use session::PreviewSnapshot;
