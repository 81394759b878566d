use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tokio::io::AsyncWriteExt;

/// Durable, write-once storage for generated images.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Store `data` under `key`. Fails with [`StorageError::AlreadyExists`]
    /// instead of replacing an existing object.
    async fn put_new(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;
}

/// Stores images as files below a root directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AssetStore for LocalStore {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn put_new(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            // Do not leave a truncated image behind under the job's key.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }
}

#[async_trait]
impl AssetStore for R2Client {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.bucket.object_exists(key).await?)
    }

    async fn put_new(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        if self.exists(key).await? {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }

        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await?;

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(StorageError::Status(code));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Object storage answered with status {0}")]
    Status(u16),

    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("An asset is already stored under {0}")]
    AlreadyExists(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
