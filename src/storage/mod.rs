//! Upload storage: spreadsheets kept under `uploads/{profile_id}/{upload_id}.{ext}`
//! in an `object_store` backend (memory or local filesystem).

use chrono::Utc;
use object_store::{ObjectStore, local::LocalFileSystem, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const UPLOAD_ROOT: &str = "uploads";

/// Extensions accepted for uploaded spreadsheets
pub const UPLOAD_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage setup failed: {0}")]
    Setup(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// What was stored by [`StorageClient::upload`]
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Cheap to clone; clones share the backend
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    backend: &'static str,
}

impl StorageClient {
    /// Process-local storage, lost on exit
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            backend: "memory",
        }
    }

    /// Create storage rooted at a local directory, creating it if needed
    pub fn local(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| StorageError::Setup(format!("{}: {}", dir.display(), e)))?;
        let store = LocalFileSystem::new_with_prefix(dir)?;

        Ok(Self {
            store: Arc::new(store),
            backend: "local",
        })
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Store bytes under `key`, replacing any previous object
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();

        let put_result = self.store.put(&path, data.into()).await?;

        tracing::info!(key, size, "Upload stored");

        Ok(UploadMetadata {
            key: key.to_string(),
            etag: put_result.e_tag.clone(),
            size,
        })
    }

    /// Fails with [`StorageError::NotFound`] for a missing key
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;

        tracing::debug!(key, size = bytes.len(), "Upload loaded");

        Ok(bytes.to_vec())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Find the stored key of an upload, whatever extension it was given
    pub async fn locate_upload(&self, profile_id: &str, upload_id: &str) -> Result<Option<String>> {
        for ext in UPLOAD_EXTENSIONS {
            let key = upload_key(profile_id, upload_id, ext);
            if self.exists(&key).await? {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    /// Find an upload by id alone, searching every profile.
    /// Returns the owning profile id and the stored key.
    pub async fn find_upload(&self, upload_id: &str) -> Result<Option<(String, String)>> {
        let root = StoragePath::from(UPLOAD_ROOT);
        let listing = match self.store.list_with_delimiter(Some(&root)).await {
            Ok(listing) => listing,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        for prefix in listing.common_prefixes {
            let Some(profile_id) = prefix.filename() else {
                continue;
            };
            if let Some(key) = self.locate_upload(profile_id, upload_id).await? {
                return Ok(Some((profile_id.to_string(), key)));
            }
        }
        Ok(None)
    }
}

/// Whether `value` can be used as one segment of a storage key: non-empty
/// ASCII alphanumerics, `-` and `_`. Profile and upload ids must pass this,
/// since `/` and `:` separate key segments.
pub fn is_key_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Storage key of an uploaded file: uploads/{profile_id}/{upload_id}.{ext}
pub fn upload_key(profile_id: &str, upload_id: &str, ext: &str) -> String {
    format!("{}/{}/{}.{}", UPLOAD_ROOT, profile_id, upload_id, ext)
}

/// Build an upload id such as `upload_20251215_101530_123456`
pub fn generate_upload_id() -> String {
    format!("upload_{}", Utc::now().format("%Y%m%d_%H%M%S_%6f"))
}
