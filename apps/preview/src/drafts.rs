//! Resume builder draft cache — the last document and template the user edited,
//! kept on disk so a restarted sidecar picks up where the shell left off.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub template_id: Option<String>,
    pub resume_data: Option<Value>,
    pub saved_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(template_id: Option<String>, resume_data: Option<Value>) -> Self {
        Self {
            template_id,
            resume_data,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DraftStore {
    path: PathBuf,
}

impl DraftStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved draft. A missing or unreadable file yields `None`.
    pub async fn load(&self) -> Option<Draft> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read draft {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(draft) => Some(draft),
            Err(e) => {
                warn!("Ignoring corrupt draft {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Writes the draft next to its final location, then renames it into place.
    /// Concurrent saves each use their own temp file; the last rename wins.
    pub async fn save(&self, draft: &Draft) -> Result<()> {
        let json = serde_json::to_vec_pretty(draft)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_replacing(&path, &json))
            .await
            .context("draft writer task failed")??;
        debug!("Draft saved to {}", self.path.display());
        Ok(())
    }
}

fn write_replacing(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".draft-")
        .tempfile_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("writing {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
