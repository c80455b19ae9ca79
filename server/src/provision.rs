//! Container creation for the remote backends.
//!
//! `object_store` only deals with objects, so buckets and containers are
//! created through each provider's own API.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{StatusCode, Url};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, BucketConfiguration, Region};
use sha2::Sha256;

use crate::config::{StorageConfig, StorageProvider};
use crate::error::StoreError;

type HmacSha256 = Hmac<Sha256>;

/// Blob service version the shared key signature is computed for.
const AZURE_API_VERSION: &str = "2021-08-06";
const DEFAULT_S3_REGION: &str = "us-east-1";

#[derive(Debug, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

pub enum Provisioner {
    Azure(AzureContainer),
    S3(S3Bucket),
}

impl Provisioner {
    /// `None` for local backends, or when no credential that can create
    /// containers is configured.
    pub fn from_config(config: &StorageConfig) -> Result<Option<Self>, StoreError> {
        match config.provider {
            StorageProvider::Azure => Ok(AzureContainer::from_config(config)?.map(Self::Azure)),
            StorageProvider::S3 => Ok(S3Bucket::from_config(config)?.map(Self::S3)),
            StorageProvider::Local | StorageProvider::Memory => Ok(None),
        }
    }

    /// Create the container. An existing one owned by us is not an error.
    pub async fn create(&self) -> Result<Provisioned, StoreError> {
        match self {
            Provisioner::Azure(container) => container.create().await,
            Provisioner::S3(bucket) => bucket.create().await,
        }
    }
}

/// `PUT {endpoint}/{container}?restype=container`, signed with the account
/// shared key.
pub struct AzureContainer {
    client: reqwest::Client,
    name: String,
    account: String,
    key: Vec<u8>,
    url: Url,
}

impl AzureContainer {
    fn from_config(config: &StorageConfig) -> Result<Option<Self>, StoreError> {
        let (Some(account), Some(access_key)) = (&config.account_name, &config.access_key) else {
            return Ok(None);
        };
        let key = STANDARD.decode(access_key).map_err(|e| {
            StoreError::Config(format!("WEATHERLOG_STORAGE_ACCESS_KEY is not base64: {}", e))
        })?;

        let base = match &config.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{}.blob.core.windows.net", account),
        };
        let mut url = Url::parse(&base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| StoreError::Config(format!("invalid storage endpoint: {}", base)))?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&config.container_name);
        }
        url.query_pairs_mut().append_pair("restype", "container");

        Ok(Some(Self {
            client: reqwest::Client::new(),
            name: config.container_name.clone(),
            account: account.clone(),
            key,
            url,
        }))
    }

    async fn create(&self) -> Result<Provisioned, StoreError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let signature = sign(
            &self.key,
            &string_to_sign(&self.account, self.url.path(), &date),
        )?;

        let response = self
            .client
            .put(self.url.clone())
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("SharedKey {}:{}", self.account, signature),
            )
            .body("")
            .send()
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        let status = response.status();
        let error_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        match status {
            s if s.is_success() => Ok(Provisioned::Created),
            StatusCode::CONFLICT
                if error_code.as_deref() == Some("ContainerAlreadyExists")
                    || body.contains("ContainerAlreadyExists") =>
            {
                Ok(Provisioned::AlreadyExists)
            }
            _ => Err(self.failed(format!("{} {}", status, body))),
        }
    }

    fn failed(&self, reason: String) -> StoreError {
        StoreError::Create {
            name: self.name.clone(),
            reason,
        }
    }
}

/// Shared key string-to-sign for a body-less create container request.
///
/// Eleven standard headers are left empty (Content-Length too, as it is
/// zero), then the `x-ms-*` headers and the canonical resource.
fn string_to_sign(account: &str, path: &str, date: &str) -> String {
    format!(
        "PUT\n\n\n\n\n\n\n\n\n\n\n\nx-ms-date:{}\nx-ms-version:{}\n/{}{}\nrestype:container",
        date, AZURE_API_VERSION, account, path
    )
}

fn sign(key: &[u8], payload: &str) -> Result<String, StoreError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StoreError::Config(format!("invalid storage access key: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub struct S3Bucket {
    name: String,
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3Bucket {
    fn from_config(config: &StorageConfig) -> Result<Option<Self>, StoreError> {
        let region_name = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_S3_REGION.to_string());
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: region_name,
                endpoint: endpoint.clone(),
            },
            None => region_name
                .parse()
                .map_err(|_| StoreError::Config(format!("invalid S3 region: {}", region_name)))?,
        };

        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(_), Some(_)) => Credentials::new(
                config.access_key.as_deref(),
                config.secret_key.as_deref(),
                None,
                None,
                None,
            ),
            // Environment, profile or instance metadata
            _ => Credentials::default(),
        };
        let credentials = match credentials {
            Ok(credentials) => credentials,
            Err(e) => {
                log::debug!("No S3 credentials to create buckets with: {}", e);
                return Ok(None);
            }
        };

        Ok(Some(Self {
            name: config.container_name.clone(),
            region,
            credentials,
            // Required for MinIO and some S3-compatible services
            path_style: config.endpoint.is_some(),
        }))
    }

    async fn create(&self) -> Result<Provisioned, StoreError> {
        let result = if self.path_style {
            Bucket::create_with_path_style(
                &self.name,
                self.region.clone(),
                self.credentials.clone(),
                BucketConfiguration::default(),
            )
            .await
        } else {
            Bucket::create(
                &self.name,
                self.region.clone(),
                self.credentials.clone(),
                BucketConfiguration::default(),
            )
            .await
        };

        match result {
            Ok(response) => self.classify(response.response_code, &response.response_text),
            Err(S3Error::HttpFailWithBody(status, body)) => self.classify(status, &body),
            Err(e) => Err(StoreError::Create {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn classify(&self, status: u16, body: &str) -> Result<Provisioned, StoreError> {
        match status {
            200..=299 => Ok(Provisioned::Created),
            409 if body.contains("BucketAlreadyOwnedByYou") => Ok(Provisioned::AlreadyExists),
            _ => Err(StoreError::Create {
                name: self.name.clone(),
                reason: format!("{} {}", status, body),
            }),
        }
    }
}
