//! Post image storage
//!
//! Uploads are written under `<root>/images/` and referenced by the relative
//! path `images/<name>`, which is also the URL path they are served from.
//! Removing an image is best-effort: the outcome is reported as a
//! [`Cleanup`] value and never fails the operation that triggered it.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;

pub const IMAGE_DIR: &str = "images";

const ACCEPTED_TYPES: [&str; 3] = ["image/png", "image/jpg", "image/jpeg"];

/// An uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl ImageUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// Outcome of a best-effort removal. Callers are free to ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Removed,
    /// Old and new reference are the same, nothing to do
    Unchanged,
    /// The file was already gone
    Missing,
    /// The reference does not point inside the image directory
    Rejected,
    Failed(String),
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist an upload. Returns `None` when the content type is not accepted.
    async fn store(&self, upload: ImageUpload) -> Result<Option<String>>;

    async fn delete(&self, image_ref: &str) -> Cleanup;

    async fn replace(&self, old_ref: &str, new_ref: &str) -> Cleanup {
        if old_ref == new_ref {
            return Cleanup::Unchanged;
        }
        self.delete(old_ref).await
    }
}

/// `images/<file>` with exactly one plain file component
pub fn is_image_ref(image_ref: &str) -> bool {
    let mut components = Path::new(image_ref).components();
    matches!(
        (components.next(), components.next(), components.next()),
        (Some(Component::Normal(dir)), Some(Component::Normal(_)), None) if dir == IMAGE_DIR
    )
}

pub fn is_accepted_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ACCEPTED_TYPES.contains(&essence.as_str())
}

fn sanitize_file_name(raw: &str) -> String {
    // Browsers may send a full client path
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Image store backed by a directory on disk
pub struct DiskImageStore {
    root: PathBuf,
}

impl DiskImageStore {
    /// `root` is the directory that contains `images/`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root.join(IMAGE_DIR)
    }

    fn resolve(&self, image_ref: &str) -> Option<PathBuf> {
        is_image_ref(image_ref).then(|| self.root.join(image_ref))
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn store(&self, upload: ImageUpload) -> Result<Option<String>> {
        if !is_accepted_type(&upload.content_type) {
            debug!(
                "[Images] Rejected {} ({})",
                upload.file_name, upload.content_type
            );
            return Ok(None);
        }

        let name = format!(
            "{}-{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
            &Uuid::new_v4().simple().to_string()[..8],
            sanitize_file_name(&upload.file_name)
        );
        let image_ref = format!("{}/{}", IMAGE_DIR, name);

        fs::create_dir_all(self.image_dir()).await?;
        fs::write(self.root.join(&image_ref), &upload.data).await?;

        info!("[Images] Stored {} ({} bytes)", image_ref, upload.data.len());

        Ok(Some(image_ref))
    }

    async fn delete(&self, image_ref: &str) -> Cleanup {
        let Some(path) = self.resolve(image_ref) else {
            warn!("[Images] Refusing to delete {:?}", image_ref);
            return Cleanup::Rejected;
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("[Images] Removed {}", image_ref);
                Cleanup::Removed
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("[Images] {} was already gone", image_ref);
                Cleanup::Missing
            }
            Err(e) => {
                warn!("[Images] Failed to remove {}: {}", image_ref, e);
                Cleanup::Failed(e.to_string())
            }
        }
    }
}
