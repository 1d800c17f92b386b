use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::{Builder, TempPath};
use uuid::Uuid;

/// The rendered page currently on screen.
///
/// Owns a temporary file holding the image, so the desktop shell can load it by
/// path. Dropping the resource deletes the file; there is no other way to
/// release it, so a resource can never be released twice.
#[derive(Debug)]
pub struct PreviewResource {
    id: Uuid,
    image: Bytes,
    content_type: String,
    path: TempPath,
}

impl PreviewResource {
    /// Writes `image` into a fresh temp file under `dir`.
    pub fn create(dir: &Path, image: Bytes, content_type: String) -> std::io::Result<Self> {
        let id = Uuid::new_v4();
        let mut file = Builder::new()
            .prefix("preview-")
            .suffix(extension_for(&content_type))
            .tempfile_in(dir)?;
        file.write_all(&image)?;
        file.flush()?;

        Ok(Self {
            id,
            image,
            content_type,
            path: file.into_temp_path(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn image(&self) -> Bytes {
        self.image.clone()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn path(&self) -> PathBuf {
        self.path.to_path_buf()
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => ".jpg",
        "image/svg+xml" => ".svg",
        "image/webp" => ".webp",
        _ => ".png",
    }
}
