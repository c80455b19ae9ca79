use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;

use crate::config::{StorageConfig, StorageProvider};
use crate::error::StoreError;
use crate::provision::{Provisioned, Provisioner};

/// Prefix listed to check that a remote container answers when it can't be
/// created. Nothing is ever written under it.
const CHECK_PREFIX: &str = ".weatherlog-check";

/// The bucket/container holding the daily log objects.
pub struct Container {
    name: String,
    store: Arc<dyn ObjectStore>,
    local_dir: Option<PathBuf>,
    provisioner: Option<Provisioner>,
    /// Set once a remote container is known to exist.
    ready: AtomicBool,
}

impl Container {
    pub fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        let name = &config.container_name;

        let provisioner = Provisioner::from_config(config)?;

        match config.provider {
            StorageProvider::Azure => Ok(Self {
                provisioner,
                ..Self::with_store(name, Arc::new(azure_client(config)?))
            }),
            StorageProvider::S3 => Ok(Self {
                provisioner,
                ..Self::with_store(name, Arc::new(s3_client(config)?))
            }),
            StorageProvider::Local => {
                let dir = config.local_root.join(name);
                std::fs::create_dir_all(&dir)?;
                Ok(Self {
                    local_dir: Some(dir.clone()),
                    ..Self::with_store(name, Arc::new(LocalFileSystem::new_with_prefix(&dir)?))
                })
            }
            StorageProvider::Memory => Ok(Self::in_memory(name)),
        }
    }

    pub fn in_memory(name: &str) -> Self {
        Self::with_store(name, Arc::new(InMemory::new()))
    }

    /// Wrap an already built store that needs no provisioning.
    pub fn with_store(name: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.to_string(),
            store,
            local_dir: None,
            provisioner: None,
            ready: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Make sure the container exists, creating it if absent. Idempotent.
    ///
    /// Local directories are checked on every call. A remote container is
    /// created once per process; when that isn't possible (no credential
    /// for it, or creation refused) it is checked with a listing instead and
    /// a missing one is reported as a `StoreError`.
    pub async fn ensure(&self) -> Result<(), StoreError> {
        if let Some(dir) = &self.local_dir {
            if !tokio::fs::try_exists(dir).await? {
                tokio::fs::create_dir_all(dir).await?;
                log::info!("Created container: {}", self.name);
            }
            return Ok(());
        }

        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        match &self.provisioner {
            Some(provisioner) => match provisioner.create().await {
                Ok(Provisioned::Created) => log::info!("Created container: {}", self.name),
                Ok(Provisioned::AlreadyExists) => {
                    log::debug!("Container {} already exists", self.name)
                }
                Err(e) => {
                    log::warn!("{}; checking whether it exists anyway", e);
                    self.check_exists().await?;
                }
            },
            None => self.check_exists().await?,
        }

        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn check_exists(&self) -> Result<(), StoreError> {
        let prefix = Path::from(CHECK_PREFIX);
        self.store
            .list_with_delimiter(Some(&prefix))
            .await
            .map_err(|source| StoreError::Container {
                name: self.name.clone(),
                source,
            })?;
        Ok(())
    }
}

fn azure_client(config: &StorageConfig) -> Result<impl ObjectStore, StoreError> {
    let account = config.account_name.as_deref().ok_or_else(|| {
        StoreError::Config("WEATHERLOG_STORAGE_ACCOUNT_NAME is required for azure".to_string())
    })?;

    // Credentials (managed identity, client secret, ...) are picked up from
    // the AZURE_* environment by the builder.
    let mut builder = MicrosoftAzureBuilder::from_env()
        .with_account(account)
        .with_container_name(&config.container_name);
    if let Some(key) = &config.access_key {
        builder = builder.with_access_key(key);
    }
    if let Some(endpoint) = &config.endpoint {
        // Azurite or another blob endpoint, e.g. http://127.0.0.1:10000/devstoreaccount1
        builder = builder.with_endpoint(endpoint.clone()).with_allow_http(true);
    }
    Ok(builder.build()?)
}

fn s3_client(config: &StorageConfig) -> Result<impl ObjectStore, StoreError> {
    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(&config.container_name)
        .with_conditional_put(S3ConditionalPut::ETagMatch);

    if let Some(region) = &config.region {
        builder = builder.with_region(region);
    }
    if let Some(endpoint) = &config.endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            // Use path-style URLs (http://localhost:9000/bucket/key) instead of
            // virtual-hosted style (http://bucket.localhost:9000/key) for MinIO
            .with_virtual_hosted_style_request(false);
    }
    if let Some(access_key) = &config.access_key {
        builder = builder.with_access_key_id(access_key);
    }
    if let Some(secret_key) = &config.secret_key {
        builder = builder.with_secret_access_key(secret_key);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn storage_config(provider: StorageProvider, root: PathBuf) -> StorageConfig {
        StorageConfig {
            provider,
            container_name: "weather-loger1".to_string(),
            account_name: None,
            endpoint: None,
            region: None,
            access_key: None,
            secret_key: None,
            local_root: root,
            partition_by_location: false,
            max_write_attempts: 4,
        }
    }

    #[tokio::test]
    async fn test_local_container_is_recreated() {
        let root = tempfile::tempdir().unwrap();
        let config = storage_config(StorageProvider::Local, root.path().to_path_buf());
        let container = Container::from_config(&config).unwrap();
        let dir = root.path().join("weather-loger1");
        assert!(dir.is_dir());

        std::fs::remove_dir(&dir).unwrap();
        container.ensure().await.unwrap();
        assert!(dir.is_dir());

        // Second call is a no-op.
        container.ensure().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_container_ensure() {
        let container = Container::in_memory("weather-loger1");
        container.ensure().await.unwrap();
        assert_eq!(container.name(), "weather-loger1");
    }

    fn s3_config(endpoint: &str) -> StorageConfig {
        StorageConfig {
            endpoint: Some(endpoint.to_string()),
            region: Some("us-east-1".to_string()),
            access_key: Some("minio".to_string()),
            secret_key: Some("minio-secret".to_string()),
            ..storage_config(StorageProvider::S3, PathBuf::from("."))
        }
    }

    #[tokio::test]
    async fn test_remote_container_is_created_once() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex("^/weather-loger1/?$"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let container = Container::from_config(&s3_config(&server.uri())).unwrap();
        container.ensure().await.unwrap();
        container.ensure().await.unwrap();

        server.verify().await;
    }

    #[tokio::test]
    async fn test_missing_remote_container_that_cannot_be_created() {
        let server = MockServer::start().await;
        Mock::given(path_regex("^/weather-loger1"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string("<Error><Code>NoSuchBucket</Code></Error>"),
            )
            .mount(&server)
            .await;

        let container = Container::from_config(&s3_config(&server.uri())).unwrap();
        let err = container.ensure().await.unwrap_err();
        assert!(matches!(err, StoreError::Container { .. }));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].method.as_str(), "PUT");
        assert!(requests.iter().skip(1).any(|r| r.method.as_str() == "GET"));
    }

    #[test]
    fn test_azure_requires_account() {
        let config = storage_config(StorageProvider::Azure, PathBuf::from("."));
        assert!(matches!(
            Container::from_config(&config),
            Err(StoreError::Config(_))
        ));
    }
}
