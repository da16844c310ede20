use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::StoreError;
use crate::store::{ObjectFetcher, ObjectPublisher};

/// Wrapper around AWS S3 client
pub struct S3Client {
    client: Client,
}

impl S3Client {
    /// Create a new S3 client from the default AWS configuration chain,
    /// applying region, endpoint and addressing overrides from `settings`.
    pub async fn from_settings(settings: &Settings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }

        let base_config = loader.load().await;

        // Build S3-specific config
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&base_config);

        if let Some(endpoint) = &settings.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if settings.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        S3Client {
            client: Client::from_conf(s3_config_builder.build()),
        }
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client) -> Self {
        S3Client { client }
    }

    /// Stream an object's body to a local file, returning the bytes written
    pub async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> Result<u64, StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Get {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        let io_err = |source| StoreError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut body = resp.body;
        let mut written = 0u64;

        while let Some(chunk) = body.try_next().await.map_err(|e| StoreError::Body {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: Box::new(e),
        })? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(io_err)?;
        Ok(written)
    }

    /// Write an object from a byte stream
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl ObjectFetcher for S3Client {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<PathBuf, StoreError> {
        info!(bucket, key, dest = %dest.display(), "download start");
        let bytes = self.get_object_to_file(bucket, key, dest).await?;
        info!(
            dest = %dest.display(),
            size = %humansize::format_size(bytes, humansize::DECIMAL),
            "download finish"
        );
        Ok(dest.to_path_buf())
    }
}

#[async_trait]
impl ObjectPublisher for S3Client {
    async fn upload(&self, bucket: &str, key: &str, body: ByteStream) -> Result<(), StoreError> {
        debug!(bucket, key, "put object");
        self.put_object(bucket, key, body).await
    }
}
