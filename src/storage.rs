//! Store uploaded avatar files.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::Storage as StorageConfig;

const KEY_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported content type `{0}`")]
    UnsupportedType(String),
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
}

/// Stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stored {
    /// Public URL.
    pub url: String,
    /// Key passed back to [`AvatarStorage::delete`].
    pub key: String,
}

/// Object storage for avatars.
#[async_trait]
pub trait AvatarStorage: Send + Sync {
    async fn put(
        &self,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Stored, StorageError>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Files under a local directory, served under `url_prefix`.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
    url_prefix: String,
}

impl LocalStorage {
    /// Create a new [`LocalStorage`].
    pub fn new(config: &StorageConfig) -> Self {
        let mut url_prefix = config.media_url.clone();
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }

        Self {
            root: config.media_root.clone(),
            url_prefix,
        }
    }
}

fn extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

#[async_trait]
impl AvatarStorage for LocalStorage {
    async fn put(
        &self,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Stored, StorageError> {
        let ext = extension(content_type)
            .ok_or_else(|| StorageError::UnsupportedType(content_type.into()))?;

        let mut name = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut name);
        let key = format!("avatars/{}.{ext}", hex::encode(name));

        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(%key, size = bytes.len(), "avatar stored");

        Ok(Stored {
            url: format!("{}{key}", self.url_prefix),
            key,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if key.contains("..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(key.into()));
        }

        match tokio::fs::remove_file(self.root.join(key)).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}
