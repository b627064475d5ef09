//! S3-compatible object storage for uploaded files

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use cdp_ingest::store::{ObjectStore, StoreError};
use tracing::{debug, info, instrument};

pub mod config;

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "cdp-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for Storage {
    #[instrument(skip(self))]
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        debug!("Downloading from s3://{}/{}", self.bucket, path);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_no_such_key() {
                    StoreError::NotFound(path.to_string())
                } else {
                    StoreError::backend(err)
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(StoreError::backend)?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, path);

        Ok(data)
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let checksum = calculate_sha256(&bytes);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StoreError::backend(e.into_service_error()))?;

        info!(checksum = %checksum, "Uploaded to s3://{}/{}", self.bucket, path);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| StoreError::backend(e.into_service_error()))?;

        info!("Deleted s3://{}/{}", self.bucket, path);

        Ok(())
    }
}

fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
