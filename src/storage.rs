use crate::config::StorageConfig;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use rocket::fairing::AdHoc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store put failed for {key}: {source}")]
    Put {
        key: String,
        #[source]
        source: object_store::Error,
    },
    #[error("object store delete failed for {key}: {source}")]
    Delete {
        key: String,
        #[source]
        source: object_store::Error,
    },
    #[error("presigning {key} failed: {source}")]
    Presign {
        key: String,
        #[source]
        source: object_store::Error,
    },
    #[error("object store configuration: {0}")]
    Configuration(String),
    #[error("{0}")]
    Unavailable(String),
}

/// Blob storage for attachments. Put and delete are independent of the
/// metadata store; callers compensate across the two themselves.
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` under `key` and returns the object's public URL.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// A time-limited GET URL for a private object.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    endpoint: Option<String>,
}

impl S3Storage {
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket).with_region(&config.region);

        if let Some(endpoint) = &config.endpoint {
            // Path-style requests for MinIO and LocalStack.
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key);
        }

        let store = builder.build().map_err(|e| StorageError::Configuration(e.to_string()))?;

        Ok(Self {
            store,
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.as_ref().map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    fn object_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, key),
            None => format!("https://{}.s3.amazonaws.com/{}", self.bucket, key),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStorage for S3Storage {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, StorageError> {
        let size = bytes.len();
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, AttributeValue::from(content_type.to_string()));

        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&Path::from(key), PutPayload::from(bytes), options)
            .await
            .map_err(|source| StorageError::Put { key: key.to_string(), source })?;

        info!(key = %key, size = size, "object uploaded");
        Ok(self.object_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.store
            .delete(&Path::from(key))
            .await
            .map_err(|source| StorageError::Delete { key: key.to_string(), source })?;

        info!(key = %key, "object deleted");
        Ok(())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let url = self
            .store
            .signed_url(http::Method::GET, &Path::from(key), ttl)
            .await
            .map_err(|source| StorageError::Presign { key: key.to_string(), source })?;

        Ok(url.to_string())
    }
}

pub fn stage_storage(storage_config: StorageConfig) -> AdHoc {
    AdHoc::try_on_ignite("Object Storage (S3)", |rocket| async move {
        match S3Storage::from_config(&storage_config) {
            Ok(storage) => {
                info!(
                    bucket = %storage_config.bucket,
                    region = %storage_config.region,
                    custom_endpoint = storage_config.endpoint.is_some(),
                    "Object storage initialized"
                );
                let storage: Arc<dyn ObjectStorage> = Arc::new(storage);
                Ok(rocket.manage(storage))
            }
            Err(e) => {
                error!("Failed to initialize object storage: {}", e);
                Err(rocket)
            }
        }
    })
}
