//! Local object storage for user photos.
//!
//! Files land under `<root>/<user>/<playground>/<name>` and are served from
//! `<public_base>/<user>/<playground>/<name>`. Metadata rows live in the
//! SQLite store so a user's photos can be listed without walking the tree.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{info, warn};

use super::sqlite::SqliteStore;
use crate::core::PlaygroundId;
use crate::ports::{PhotoStore, Session, StoreError, StoreResult, UserPhoto};

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Filesystem-backed photo store
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: String,
    metadata: SqliteStore,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str, metadata: SqliteStore) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
            metadata,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

/// Reduce a path segment to a safe character set
fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Prefix the sanitized name with a timestamp so repeated uploads never collide
fn object_name(filename: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{nanos}-{}", sanitize(filename))
}

#[async_trait]
impl PhotoStore for LocalObjectStore {
    async fn upload(
        &self,
        session: &Session,
        id: &PlaygroundId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> StoreResult<UserPhoto> {
        let user_id = session.require_user()?;
        if bytes.is_empty() {
            return Err(StoreError::Invalid("empty upload".to_string()));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(StoreError::Invalid(format!(
                "upload of {} bytes exceeds the {MAX_UPLOAD_BYTES} byte limit",
                bytes.len()
            )));
        }

        let (user_dir, playground_dir) = (sanitize(user_id), sanitize(&id.to_string()));
        let name = object_name(filename);
        let dir = self.root.join(&user_dir).join(&playground_dir);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&name);
        tokio::fs::write(&path, &bytes).await?;

        let url = format!("{}/{user_dir}/{playground_dir}/{name}", self.public_base);
        match self.metadata.record_photo(user_id, id, &url).await {
            Ok(photo) => {
                info!(playground = %id, size = bytes.len(), "photo stored");
                Ok(photo)
            }
            Err(err) => {
                // Keep disk and metadata in step
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %cleanup, "orphaned photo left on disk");
                }
                Err(err)
            }
        }
    }

    async fn photos_for(&self, session: &Session, id: &PlaygroundId) -> StoreResult<Vec<UserPhoto>> {
        let user_id = session.require_user()?;
        self.metadata.list_photos(user_id, id).await
    }
}
