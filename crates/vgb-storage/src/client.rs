//! S3-compatible client for Cloudflare R2.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::keys::validate_key;
use crate::store::ObjectStore;

/// Connection settings for an R2 bucket.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// S3 API endpoint of the account
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
}

impl R2Config {
    /// Read `R2_*` variables. Only `R2_REGION` is optional (`auto`).
    pub fn from_env() -> StorageResult<Self> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| StorageError::Config(format!("{} not set", name)))
        };

        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// [`ObjectStore`] backed by an R2 bucket.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
}

impl R2Client {
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2-env",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    async fn put_object(&self, key: &str, body: ByteStream, content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::request("put", key, DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<ByteStream> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    StorageError::not_found(key)
                } else {
                    StorageError::request("get", key, DisplayErrorContext(&e))
                }
            })?;
        Ok(response.body)
    }
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let body = self.get_object(key).await?;
        let data = body
            .collect()
            .await
            .map_err(|e| StorageError::request("get", key, e))?
            .into_bytes()
            .to_vec();
        debug!(key, bytes = data.len(), "Fetched object");
        Ok(data)
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        let size = data.len();
        self.put_object(key, ByteStream::from(data), content_type).await?;
        debug!(key, bytes = size, "Stored object");
        Ok(key.to_string())
    }

    /// S3 reports success for missing keys, which matches the trait contract.
    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::request("delete", key, DisplayErrorContext(&e)))?;
        debug!(key, "Deleted object");
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let presign = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::request("presign", key, e))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign)
            .await
            .map_err(|e| StorageError::request("presign", key, DisplayErrorContext(&e)))?;
        Ok(request.uri().to_string())
    }

    /// Streams the object to disk chunk by chunk.
    async fn get_to_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        let mut body = self.get_object(key).await?;
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0usize;

        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::request("get", key, e))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!(key, path = %path.display(), bytes = written, "Downloaded object");
        Ok(())
    }

    /// Streams from disk instead of buffering the whole file.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<String> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::request("put", key, e))?;
        self.put_object(key, body, content_type).await?;
        info!(key, path = %path.display(), "Uploaded file");
        Ok(key.to_string())
    }
}
