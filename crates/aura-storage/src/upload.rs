//! Uploader seam and object naming.

use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Publishes a local file and returns its public URL.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> StorageResult<String>;
}

/// Content type for an artifact, by extension. Only images and videos are accepted.
pub fn content_type_for(path: &Path) -> StorageResult<&'static str> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let content_type = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mpg" | "mpeg" => "video/mpeg",
        _ => return Err(StorageError::UnsupportedContentType(path.display().to_string())),
    };
    Ok(content_type)
}

/// Random object key that keeps the file's extension.
pub fn object_key_for(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_string_lossy()),
        None => Uuid::new_v4().to_string(),
    }
}
