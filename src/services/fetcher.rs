use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use image::ImageFormat;

use crate::services::storage::{AssetStore, StorageError};

/// Formats accepted from generators, with their stored extension.
const ACCEPTED_FORMATS: [(ImageFormat, &str); 3] = [
    (ImageFormat::Png, "png"),
    (ImageFormat::Jpeg, "jpg"),
    (ImageFormat::WebP, "webp"),
];

/// Where a generated image ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAsset {
    pub key: String,
    pub content_type: &'static str,
    pub size: usize,
}

/// Downloads generated images and stores them once per image id.
pub struct AssetFetcher {
    http: reqwest::Client,
    store: Arc<dyn AssetStore>,
}

impl AssetFetcher {
    pub fn new(store: Arc<dyn AssetStore>, timeout: Duration) -> Result<Self, DownloadError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, store })
    }

    /// Download `url` and persist it under a key derived from `image_id`.
    ///
    /// `data:` URLs are decoded in place. The body must be a non-empty PNG,
    /// JPEG or WebP image.
    pub async fn fetch(&self, url: &str, image_id: &str) -> Result<StoredAsset, DownloadError> {
        for (_, ext) in ACCEPTED_FORMATS {
            let key = asset_key(image_id, ext);
            if self.store.exists(&key).await? {
                return Err(DownloadError::AlreadyStored(key));
            }
        }

        let bytes = if url.starts_with("data:") {
            decode_data_url(url)?
        } else {
            self.download(url).await?
        };

        if bytes.is_empty() {
            return Err(DownloadError::EmptyBody(url_for_log(url)));
        }

        let (format, ext) = image::guess_format(&bytes)
            .ok()
            .and_then(|guessed| ACCEPTED_FORMATS.into_iter().find(|(f, _)| *f == guessed))
            .ok_or_else(|| DownloadError::NotAnImage(url_for_log(url)))?;

        let key = asset_key(image_id, ext);
        let content_type = format.to_mime_type();
        self.store
            .put_new(&key, &bytes, content_type)
            .await
            .map_err(|e| match e {
                StorageError::AlreadyExists(key) => DownloadError::AlreadyStored(key),
                other => DownloadError::Storage(other),
            })?;

        tracing::info!(image_id, key = %key, size = bytes.len(), "Stored generated image");

        Ok(StoredAsset {
            key,
            content_type,
            size: bytes.len(),
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

pub fn asset_key(image_id: &str, ext: &str) -> String {
    format!("images/{image_id}.{ext}")
}

/// Decode `data:[<mime>][;base64],<payload>`.
fn decode_data_url(url: &str) -> Result<Vec<u8>, DownloadError> {
    let (header, payload) = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or(DownloadError::InvalidDataUrl)?;

    if !header.ends_with(";base64") {
        return Err(DownloadError::InvalidDataUrl);
    }

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| DownloadError::InvalidDataUrl)
}

/// Replace data URLs with a placeholder in logs and errors.
fn url_for_log(url: &str) -> String {
    if url.starts_with("data:") {
        "<data url>".to_string()
    } else {
        url.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Image download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image download from {url} answered {status}")]
    Status { status: u16, url: String },

    #[error("Image download from {0} returned an empty body")]
    EmptyBody(String),

    #[error("Content at {0} is not a PNG, JPEG or WebP image")]
    NotAnImage(String),

    #[error("Malformed data URL")]
    InvalidDataUrl,

    #[error("An image is already stored under {0}")]
    AlreadyStored(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
