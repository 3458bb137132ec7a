//! Product image storage.

mod s3;

pub use s3::S3ImageStore;

use async_trait::async_trait;
use bytes::Bytes;
use rand::{distr::Alphanumeric, Rng};
use std::path::Path;

/// Largest accepted image upload
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Prefix under which every product image is stored
pub const IMAGE_KEY_PREFIX: &str = "products/";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{0}")]
    Invalid(String),
    #[error("Image is too large ({size} bytes, max {max} bytes)")]
    TooLarge { size: usize, max: usize },
    #[error("Object storage error: {0}")]
    Backend(String),
}

/// A validated image ready to be stored.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    extension: String,
    content_type: String,
    data: Bytes,
}

impl ImageUpload {
    /// Validate extension, content type and size. When the client sent no
    /// content type it is inferred from the extension.
    pub fn new(filename: &str, content_type: Option<&str>, data: Bytes) -> Result<Self, StorageError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| StorageError::Invalid("Image file must have an extension".to_string()))?;

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(StorageError::Invalid(format!(
                "Unsupported image type .{} (allowed: {})",
                extension,
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        if data.is_empty() {
            return Err(StorageError::Invalid("Image file is empty".to_string()));
        }
        if data.len() > MAX_IMAGE_BYTES {
            return Err(StorageError::TooLarge {
                size: data.len(),
                max: MAX_IMAGE_BYTES,
            });
        }

        let content_type = match content_type.map(str::trim) {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_ascii_lowercase(),
            _ => mime_guess::from_ext(&extension)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };
        if !content_type.starts_with("image/") {
            return Err(StorageError::Invalid(format!(
                "Content type {} is not an image",
                content_type
            )));
        }

        Ok(Self {
            extension,
            content_type,
            data,
        })
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> Bytes {
        self.data.clone()
    }

    /// Fresh object key: `products/<unix>_<8 alnum>.<ext>`
    pub fn generate_key(&self) -> String {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        format!(
            "{}{}_{}.{}",
            IMAGE_KEY_PREFIX,
            chrono::Utc::now().timestamp(),
            suffix,
            self.extension
        )
    }
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the image and return its public URL
    async fn put(&self, upload: ImageUpload) -> Result<String, StorageError>;

    /// Delete an image previously returned by `put`
    async fn delete(&self, url: &str) -> Result<(), StorageError>;
}

/// Public URL for an object key.
///
/// The base may be templated (`https://host/{bucket}/{key}`); otherwise the
/// bucket is appended unless the base already names it.
pub fn build_public_url(base: &str, bucket: &str, key: &str) -> String {
    let trimmed = base.trim_end_matches('/');

    if trimmed.contains("{bucket}") || trimmed.contains("{key}") {
        return trimmed.replace("{bucket}", bucket).replace("{key}", key);
    }

    if trimmed.contains(bucket) {
        format!("{}/{}", trimmed, key)
    } else {
        format!("{}/{}/{}", trimmed, bucket, key)
    }
}

/// Recover the object key from a public URL produced by `build_public_url`.
pub fn object_key_from_url(base: &str, bucket: &str, url: &str) -> Option<String> {
    let prefix = build_public_url(base, bucket, "");
    let key = url
        .strip_prefix(prefix.as_str())
        .or_else(|| url.find(&format!("/{}", IMAGE_KEY_PREFIX)).map(|i| &url[i + 1..]))?;
    let key = key.split(['?', '#']).next().unwrap_or(key);

    if !key.starts_with(IMAGE_KEY_PREFIX) || key.len() == IMAGE_KEY_PREFIX.len() || key.contains("..") {
        return None;
    }
    Some(key.to_string())
}
