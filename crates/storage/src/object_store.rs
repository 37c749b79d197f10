use async_trait::async_trait;
use bytes::Bytes;
use config::S3Config;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ClientOptions;
use object_store::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

use crate::bucket::{Bucket, Result};
use crate::error::StorageError;

/// Build the S3 client the scanner reads the blocks bucket through.
///
/// With `use_env_credentials` the AWS credential chain (env vars, instance
/// profiles) supplies the keys; otherwise the static credentials from the
/// config are used. An empty `endpoint` keeps the regional AWS default, so
/// it only needs to be set for S3-compatible stores like Minio.
pub fn create_object_store(config: &S3Config) -> Result<Arc<dyn ObjectStore>> {
    let mut builder = if config.use_env_credentials {
        AmazonS3Builder::from_env()
    } else {
        AmazonS3Builder::new()
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
    };

    builder = builder
        .with_bucket_name(&config.bucket)
        .with_region(&config.region)
        .with_client_options(
            ClientOptions::new()
                .with_pool_max_idle_per_host(config.pool_max_idle_per_host)
                .with_pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs)),
        );

    if !config.endpoint.is_empty() {
        builder = builder.with_endpoint(&config.endpoint);
    }
    if config.allow_http {
        builder = builder.with_allow_http(true);
    }
    if let Some(token) = &config.session_token {
        builder = builder.with_token(token);
    }

    let store = builder
        .build()
        .map_err(|e| StorageError::Configuration(e.to_string()))?;
    Ok(Arc::new(store))
}

/// [`Bucket`] backed by an `object_store` store, optionally rooted at a
/// prefix inside it.
pub struct ObjectStoreBucket {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectStoreBucket {
    /// Create a new bucket over `store`. `prefix` roots all paths inside the
    /// store; pass an empty string to work at the store root.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    fn full_path(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if self.prefix.is_empty() {
            path.to_string()
        } else if path.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    fn relative<'a>(&self, location: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            location
        } else {
            location
                .strip_prefix(self.prefix.as_str())
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(location)
        }
    }
}

#[async_trait]
impl Bucket for ObjectStoreBucket {
    async fn iter(&self, prefix: &str) -> Result<Vec<String>> {
        let full = self.full_path(prefix);
        let location = (!full.is_empty()).then(|| ObjectPath::from(full.as_str()));

        let listing = self
            .store
            .list_with_delimiter(location.as_ref())
            .await
            .map_err(|e| StorageError::backend("iter", prefix, e.to_string()))?;

        let mut entries = Vec::new();
        for common in listing.common_prefixes {
            entries.push(format!("{}/", self.relative(common.as_ref())));
        }
        for object in listing.objects {
            entries.push(self.relative(object.location.as_ref()).to_string());
        }
        entries.sort();
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let location = ObjectPath::from(self.full_path(path));
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::backend("exists", path, e.to_string())),
        }
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let location = ObjectPath::from(self.full_path(path));
        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::not_found(path))
            }
            Err(e) => return Err(StorageError::backend("get", path, e.to_string())),
        };
        result
            .bytes()
            .await
            .map_err(|e| StorageError::backend("get", path, e.to_string()))
    }

    async fn upload(&self, path: &str, data: Bytes) -> Result<()> {
        let location = ObjectPath::from(self.full_path(path));
        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| StorageError::backend("upload", path, e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let location = ObjectPath::from(self.full_path(path));
        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::backend("delete", path, e.to_string())),
        }
    }
}
