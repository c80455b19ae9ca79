//! Daily log objects.
//!
//! Object stores have no append primitive, so an append is a full
//! read-modify-write. Two writers racing on the same object would lose one
//! line; every write is therefore conditional on the version that was read
//! (`PutMode::Create` for a new object, `PutMode::Update` otherwise) and the
//! whole cycle is retried on conflict. Backends without conditional writes
//! fall back to a plain overwrite, serialized per object by an in-process
//! lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use chrono::NaiveDate;
use object_store::path::Path;
use object_store::{GetOptions, ObjectStore, PutMode, PutOptions, UpdateVersion};

use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::record::{LogRecord, HEADER};
use crate::retry::{with_retry, RetryConfig, RetryError};
use crate::storage::Container;

/// Identity of a log object: one per location per calendar day.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogKey {
    pub location: String,
    pub date: NaiveDate,
}

impl LogKey {
    pub fn new(location: &str, date: NaiveDate) -> Self {
        Self {
            location: location.to_string(),
            date,
        }
    }

    pub fn file_name(&self) -> String {
        format!("weather_{}.log", self.date.format("%Y_%m_%d"))
    }

    /// Lowercase, path-safe form of the location.
    fn location_slug(&self) -> String {
        let slug: String = self
            .location
            .trim()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        match slug.trim_matches('-') {
            "" => "unknown".to_string(),
            s => s.to_string(),
        }
    }
}

/// Object content and version as read at the start of an append.
#[derive(Debug)]
struct Snapshot {
    content: Option<String>,
    version: Option<UpdateVersion>,
}

impl Snapshot {
    fn absent() -> Self {
        Self {
            content: None,
            version: None,
        }
    }

    fn needs_header(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty)
    }

    fn appended(&self, line: &str) -> String {
        match self.content.as_deref() {
            None | Some("") => format!("{}{}", HEADER, line),
            Some(existing) if existing.ends_with('\n') => format!("{}{}", existing, line),
            Some(existing) => format!("{}\n{}", existing, line),
        }
    }

    fn put_mode(&self) -> PutMode {
        match &self.version {
            None => PutMode::Create,
            Some(v) if v.e_tag.is_none() && v.version.is_none() => PutMode::Overwrite,
            Some(v) => PutMode::Update(v.clone()),
        }
    }
}

/// One async mutex per object path. Idle entries are dropped on the next
/// lookup so yesterday's paths don't pile up.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.to_string()).or_default().clone()
    }
}

pub struct LogStore {
    container: Container,
    partition_by_location: bool,
    retry: RetryConfig,
    locks: KeyedLocks,
}

impl LogStore {
    pub fn new(container: Container, partition_by_location: bool, retry: RetryConfig) -> Self {
        Self {
            container,
            partition_by_location,
            retry,
            locks: KeyedLocks::default(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        Ok(Self::new(
            Container::from_config(config)?,
            config.partition_by_location,
            RetryConfig::new(config.max_write_attempts, 100),
        ))
    }

    pub fn path_for(&self, key: &LogKey) -> Path {
        if self.partition_by_location {
            Path::from(format!("{}/{}", key.location_slug(), key.file_name()))
        } else {
            Path::from(key.file_name())
        }
    }

    /// Append one record line to the day's log, creating it with a header
    /// first if needed. Returns the object path written.
    pub async fn append(&self, key: &LogKey, record: &LogRecord) -> Result<Path, StoreError> {
        let path = self.path_for(key);
        let line = record.to_line();

        self.container.ensure().await?;

        let lock = self.locks.lock_for(path.as_ref());
        let _guard = lock.lock().await;

        match with_retry(|| self.try_append(&path, &line), &self.retry).await {
            Ok(created) => {
                if created {
                    log::info!("Created new log file with header: {}", path);
                }
                log::info!("Appended weather record to {}", path);
                Ok(path)
            }
            Err(RetryError::Retryable(_)) => Err(StoreError::Contention {
                path: path.to_string(),
                attempts: self.retry.max_attempts(),
            }),
            Err(RetryError::NonRetryable(e)) => Err(e),
        }
    }

    /// One read-modify-write cycle. Returns whether the header was written.
    async fn try_append(&self, path: &Path, line: &str) -> Result<bool, RetryError<StoreError>> {
        let snapshot = self.read(path).await.map_err(RetryError::NonRetryable)?;
        self.write(path, &snapshot, snapshot.appended(line)).await?;
        Ok(snapshot.needs_header())
    }

    async fn read(&self, path: &Path) -> Result<Snapshot, StoreError> {
        match self.container.store().get_opts(path, GetOptions::default()).await {
            Ok(result) => {
                let version = UpdateVersion {
                    e_tag: result.meta.e_tag.clone(),
                    version: result.meta.version.clone(),
                };
                let bytes = result.bytes().await?;
                let content = String::from_utf8(bytes.to_vec()).map_err(|_| {
                    StoreError::Encoding {
                        path: path.to_string(),
                    }
                })?;
                Ok(Snapshot {
                    content: Some(content),
                    version: Some(version),
                })
            }
            Err(object_store::Error::NotFound { .. }) => Ok(Snapshot::absent()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(
        &self,
        path: &Path,
        snapshot: &Snapshot,
        content: String,
    ) -> Result<(), RetryError<StoreError>> {
        let store = self.container.store();
        let payload = Bytes::from(content);

        let result = store
            .put_opts(path, payload.clone().into(), PutOptions::from(snapshot.put_mode()))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(
                e @ (object_store::Error::AlreadyExists { .. }
                | object_store::Error::Precondition { .. }
                | object_store::Error::NotFound { .. }),
            ) => Err(RetryError::Retryable(e.into())),
            Err(object_store::Error::NotImplemented { .. }) => {
                log::warn!(
                    "Conditional writes unsupported by {} storage, overwriting {}",
                    self.container.name(),
                    path
                );
                store
                    .put_opts(path, payload.into(), PutOptions::from(PutMode::Overwrite))
                    .await
                    .map(|_| ())
                    .map_err(|e| RetryError::NonRetryable(e.into()))
            }
            Err(e) => Err(RetryError::NonRetryable(e.into())),
        }
    }
}
