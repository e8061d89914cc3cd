//! Blob adapter over any `object_store` implementation.
//!
//! # Responsibility
//! - Map the synchronous blob contract onto async `ObjectStore` calls.
//! - Build S3-compatible stores from `S3BlobConfig`.
//!
//! # Invariants
//! - Object-store `NotFound` becomes `BlobError::NotFound` on read and is
//!   swallowed on delete.
//! - With a prefix, every key is stored as `<prefix>/<key>`.

use super::runtime::run_blocking;
use super::{check_key, read_all, BlobError, BlobResult, BlobStorage};
use bytes::Bytes;
use log::{debug, info};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

const BACKEND_NAME: &str = "ObjectStore";
const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an S3 or S3-compatible bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3BlobConfig {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Blob adapter backed by an `ObjectStore`.
#[derive(Debug, Clone)]
pub struct ObjectStoreBlobStorage {
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl ObjectStoreBlobStorage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            prefix: None,
        }
    }

    /// Namespaces every key under `prefix`; surrounding slashes are ignored.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Builds an S3 client from `config`.
    ///
    /// Missing credentials fall back to the builder's environment lookup at
    /// request time.
    pub fn from_s3(config: &S3BlobConfig) -> BlobResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(config.region.as_deref().unwrap_or(DEFAULT_REGION));
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }
        if let Some(access_key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key);
        }

        let store = builder.build().map_err(BlobError::ObjectStore)?;
        info!(
            "event=blob_store_open module=blob status=ok backend=s3 bucket={} endpoint={}",
            config.bucket,
            config.endpoint.as_deref().unwrap_or("aws")
        );

        let storage = Self::new(Arc::new(store));
        Ok(match &config.prefix {
            Some(prefix) => storage.with_prefix(prefix.as_str()),
            None => storage,
        })
    }

    fn location(&self, key: &str) -> BlobResult<ObjectPath> {
        check_key(key)?;
        let full = match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        };
        ObjectPath::parse(&full).map_err(|err| BlobError::InvalidKey {
            key: key.to_string(),
            reason: err.to_string(),
        })
    }
}

impl BlobStorage for ObjectStoreBlobStorage {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn write(&self, key: &str, data: &mut dyn Read) -> BlobResult<()> {
        let location = self.location(key)?;
        let payload = read_all(data)?;
        let size = payload.len();
        let started_at = Instant::now();

        run_blocking(|| async {
            self.store
                .put(&location, payload.into())
                .await
                .map(|_| ())
                .map_err(BlobError::ObjectStore)
        })?;

        debug!(
            "event=blob_write module=blob status=ok backend={} key={} bytes={} duration_ms={}",
            BACKEND_NAME,
            location,
            size,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn read(&self, key: &str) -> BlobResult<Bytes> {
        let location = self.location(key)?;
        run_blocking(|| async {
            let result = self.store.get(&location).await.map_err(|err| match err {
                object_store::Error::NotFound { .. } => BlobError::NotFound(key.to_string()),
                other => BlobError::ObjectStore(other),
            })?;
            result.bytes().await.map_err(BlobError::ObjectStore)
        })
    }

    fn delete(&self, key: &str) -> BlobResult<()> {
        let location = self.location(key)?;
        run_blocking(|| async {
            match self.store.delete(&location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(err) => Err(BlobError::ObjectStore(err)),
            }
        })
    }

    fn exists(&self, key: &str) -> BlobResult<bool> {
        let location = self.location(key)?;
        run_blocking(|| async {
            match self.store.head(&location).await {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(err) => Err(BlobError::ObjectStore(err)),
            }
        })
    }
}
