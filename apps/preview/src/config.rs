use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::preview::DEFAULT_DEBOUNCE;

/// Sidecar configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub port: u16,
    pub rust_log: String,
    pub debounce: Duration,
    pub backend_timeout: Duration,
    pub preview_dir: PathBuf,
    pub draft_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            backend_url: require_env("BACKEND_URL")?
                .trim_end_matches('/')
                .to_string(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8787".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            debounce: optional_millis("COMPILE_DEBOUNCE_MS")?.unwrap_or(DEFAULT_DEBOUNCE),
            backend_timeout: Duration::from_secs(
                std::env::var("BACKEND_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse::<u64>()
                    .context("BACKEND_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            preview_dir: std::env::var("PREVIEW_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir()),
            draft_path: std::env::var("DRAFT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("preview-draft.json")),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(raw) => {
            let ms = raw
                .parse::<u64>()
                .with_context(|| format!("{key} must be a whole number of milliseconds"))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        Err(_) => Ok(None),
    }
}
