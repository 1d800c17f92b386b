/// Backend client — the single point of entry for calls to the compile backend.
///
/// The coordinator only sees the `CompileBackend` trait; `BackendClient` is the
/// reqwest implementation used in production. Template listing, final PDF
/// compilation and LLM status polling are plain pass-throughs on the same client.
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::preview::CompileRequest;

pub mod handlers;

const PREVIEW_PATH: &str = "/api/latex/preview";
const COMPILE_PATH: &str = "/api/latex/compile";
const TEMPLATES_PATH: &str = "/api/latex/templates";
const LLM_STATUS_PATH: &str = "/api/ollama/status";

/// Response header carrying the total page count of a compiled document.
pub const PAGE_COUNT_HEADER: &str = "x-page-count";
/// Shown when the backend fails without a usable `detail`.
pub const GENERIC_FAILURE: &str = "Compilation failed";
const DEFAULT_IMAGE_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("request cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error (status {status}): {message}")]
    Backend { status: u16, message: String },
}

impl CompileError {
    /// The string surfaced to the user when a compile fails.
    pub fn user_message(&self) -> String {
        match self {
            CompileError::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// One rendered page as returned by the backend.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: Bytes,
    pub content_type: String,
    pub page_count: u32,
}

#[derive(Debug, Serialize)]
struct CompileBody<'a> {
    template_id: &'a str,
    resume_data: &'a Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmStatus {
    pub current_model: String,
    #[serde(default)]
    pub model_available: bool,
    #[serde(default)]
    pub signin_required: bool,
    #[serde(default)]
    pub signin_url: Option<String>,
    #[serde(default)]
    pub available_models: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Anything that can render one page of a document. Implement this to swap the
/// transport without touching the coordinator.
#[async_trait]
pub trait CompileBackend: Send + Sync {
    async fn compile_page(
        &self,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderedPage, CompileError>;
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, CompileError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Final, non-paginated compile. Returns the PDF bytes.
    pub async fn compile_pdf(
        &self,
        template_id: &str,
        resume_data: &Value,
    ) -> Result<Bytes, CompileError> {
        let response = self
            .client
            .post(self.url(COMPILE_PATH))
            .json(&CompileBody {
                template_id,
                resume_data,
            })
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.bytes().await?)
    }

    pub async fn list_templates(&self) -> Result<Vec<TemplateInfo>, CompileError> {
        let response = self.client.get(self.url(TEMPLATES_PATH)).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    pub async fn llm_status(&self) -> Result<LlmStatus, CompileError> {
        let response = self.client.get(self.url(LLM_STATUS_PATH)).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn fetch_page(&self, request: &CompileRequest) -> Result<RenderedPage, CompileError> {
        let response = self
            .client
            .post(self.url(PREVIEW_PATH))
            .query(&[("page", request.page)])
            .json(&CompileBody {
                template_id: &request.template_id,
                resume_data: &request.document,
            })
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let headers = response.headers();
        let page_count = parse_page_count(
            headers
                .get(PAGE_COUNT_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_IMAGE_TYPE)
            .to_string();
        let image = response.bytes().await?;

        debug!(
            "Compiled page {} ({} bytes, {} pages total)",
            request.page,
            image.len(),
            page_count
        );

        Ok(RenderedPage {
            image,
            content_type,
            page_count,
        })
    }
}

#[async_trait]
impl CompileBackend for BackendClient {
    async fn compile_page(
        &self,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderedPage, CompileError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompileError::Cancelled),
            result = self.fetch_page(request) => result,
        }
    }
}

/// Turns a non-2xx response into `CompileError::Backend` carrying the best
/// available message.
async fn ensure_success(response: Response) -> Result<Response, CompileError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Backend returned {}: {}", status, body);
    Err(CompileError::Backend {
        status: status.as_u16(),
        message: extract_detail(&body),
    })
}

/// Parses the page-count header. Missing or unparseable values count as one page.
pub fn parse_page_count(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(1)
}

/// Pulls a human-readable message out of an error body.
///
/// The backend reports errors as `{"detail": "..."}`; some routes nest an object
/// under `detail` with its own `message`. Anything else falls back to
/// [`GENERIC_FAILURE`].
pub fn extract_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return GENERIC_FAILURE.to_string();
    };
    match value.get("detail") {
        Some(Value::String(detail)) if !detail.is_empty() => detail.clone(),
        Some(Value::Object(obj)) => obj
            .get("message")
            .or_else(|| obj.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
        _ => GENERIC_FAILURE.to_string(),
    }
}
