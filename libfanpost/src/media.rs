//! Media staging
//!
//! A publish request carries at most one media asset. It is read into an
//! immutable [`StagedMedia`] buffer once, before any adapter runs, so every
//! adapter (and every retry) sees the full content from offset 0.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FanpostError, Result};

/// In-memory media content shared read-only across adapters
///
/// Cloning is cheap: the underlying buffer is reference counted.
#[derive(Clone, PartialEq, Eq)]
pub struct StagedMedia {
    data: Bytes,
    mime_type: String,
    file_name: Option<String>,
}

impl std::fmt::Debug for StagedMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedMedia")
            .field("size", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}

impl StagedMedia {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Read a file into memory, inferring the mime type from its extension
    pub async fn from_path(path: &Path) -> Result<Self> {
        let mime_type = mime_from_extension(path).ok_or_else(|| {
            FanpostError::Media(format!(
                "Unsupported media type for {}. Supported: mp4, mov, jpg, jpeg, png, gif, webp",
                path.display()
            ))
        })?;

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| FanpostError::Media(format!("Failed to read {}: {}", path.display(), e)))?;

        if data.is_empty() {
            return Err(FanpostError::Media(format!(
                "Media file is empty: {}",
                path.display()
            )));
        }

        debug!(path = %path.display(), size = data.len(), mime_type, "Staged media file");

        let staged = Self::new(data, mime_type);
        Ok(match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => staged.with_file_name(name),
            None => staged,
        })
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

/// Map a file extension to the mime types the platforms accept
pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "mp4" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Handle to a stored media asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub mime_type: String,
    pub byte_size: u64,
}

/// Blob store for uploaded or generated media
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, data: Bytes, mime_type: &str) -> Result<MediaRef>;

    async fn load(&self, media: &MediaRef) -> Result<StagedMedia>;
}

/// Media store writing one file per asset under a local directory
pub struct LocalMediaStore {
    dir: PathBuf,
}

impl LocalMediaStore {
    /// Create the store, expanding `~`. The directory is created on first write.
    pub fn new(dir: &str) -> Self {
        Self {
            dir: PathBuf::from(shellexpand::tilde(dir).to_string()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        // Ids are generated file names; anything with a separator is not ours
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(FanpostError::Media(format!("Invalid media id: {}", id)));
        }
        Ok(self.dir.join(id))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, data: Bytes, mime_type: &str) -> Result<MediaRef> {
        let id = format!("{}.{}", uuid::Uuid::new_v4(), extension_for_mime(mime_type));
        let path = self.path_for(&id)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            FanpostError::Media(format!(
                "Failed to create media directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        tokio::fs::write(&path, &data).await.map_err(|e| {
            FanpostError::Media(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!(id = %id, size = data.len(), "Stored media");

        Ok(MediaRef {
            id,
            mime_type: mime_type.to_string(),
            byte_size: data.len() as u64,
        })
    }

    async fn load(&self, media: &MediaRef) -> Result<StagedMedia> {
        let path = self.path_for(&media.id)?;
        let data = tokio::fs::read(&path).await.map_err(|e| {
            FanpostError::Media(format!("Failed to read media {}: {}", media.id, e))
        })?;

        Ok(StagedMedia::new(data, media.mime_type.clone()).with_file_name(media.id.clone()))
    }
}

/// Copy a local file into `store` and stage it from the stored copy
///
/// The file is validated (known extension, non-empty) before anything is
/// written. Adapters then read the buffer loaded back from the store.
pub async fn stage_file(store: &dyn MediaStore, path: &Path) -> Result<(MediaRef, StagedMedia)> {
    let source = StagedMedia::from_path(path).await?;
    let media_ref = store.store(source.bytes(), source.mime_type()).await?;
    let staged = store.load(&media_ref).await?;

    debug!(
        path = %path.display(),
        media_id = %media_ref.id,
        size = media_ref.byte_size,
        "Staged media through store"
    );

    Ok((media_ref, staged))
}
