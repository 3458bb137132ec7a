use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use tracing::{info, warn};

use super::{build_public_url, object_key_from_url, ImageStore, ImageUpload, StorageError};
use crate::config::StorageConfig;

/// Image store backed by S3 or any S3-compatible service (MinIO, R2, ...)
pub struct S3ImageStore {
    client: Client,
    bucket: String,
    public_base: String,
}

impl S3ImageStore {
    /// Build the client and make sure the bucket exists.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(aws_credential_types::Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "storefront",
            ));
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);

        // Custom S3-compatible endpoints need path-style addressing
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let store = Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            public_base: config.public_base(),
        };
        store.ensure_bucket(&config.region).await?;

        info!(
            bucket = %store.bucket,
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "Object storage ready"
        );
        Ok(store)
    }

    async fn ensure_bucket(&self, region: &str) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!(bucket = %self.bucket, "Bucket already exists");
                return Ok(());
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if !service_err.is_not_found() {
                    return Err(anyhow::anyhow!(
                        "Failed to check bucket {}: {}",
                        self.bucket,
                        DisplayErrorContext(&service_err)
                    ));
                }
            }
        }

        let mut create = self.client.create_bucket().bucket(&self.bucket);
        if region != "us-east-1" {
            create = create.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        create
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| format!("Failed to create bucket {}", self.bucket))?;
        info!(bucket = %self.bucket, "Bucket created");

        // Product images are served directly from the bucket
        let policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": {"AWS": ["*"]},
                "Action": ["s3:GetObject"],
                "Resource": [format!("arn:aws:s3:::{}/*", self.bucket)]
            }]
        });
        if let Err(e) = self
            .client
            .put_bucket_policy()
            .bucket(&self.bucket)
            .policy(policy.to_string())
            .send()
            .await
        {
            warn!(
                bucket = %self.bucket,
                error = %DisplayErrorContext(&e),
                "Failed to set public-read bucket policy"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn put(&self, upload: ImageUpload) -> Result<String, StorageError> {
        let key = upload.generate_key();
        let size = upload.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(upload.content_type())
            .body(ByteStream::from(upload.data()))
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        info!(key = %key, size, "Image uploaded");
        Ok(build_public_url(&self.public_base, &self.bucket, &key))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let key = object_key_from_url(&self.public_base, &self.bucket, url)
            .ok_or_else(|| StorageError::Invalid("Invalid image URL".to_string()))?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        info!(key = %key, "Image deleted");
        Ok(())
    }
}
