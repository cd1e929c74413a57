use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use fjall::Keyspace;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task;

use crate::config::CacheConfig;
use crate::models::BeachRecord;

/// Storage key of the persisted dataset
pub const DATASET_KEY: &str = "beach-data-cache";

/// Default dataset time-to-live
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Byte-oriented persistent key-value collaborator
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// On-disk store backed by a fjall keyspace
pub struct FjallStore {
    store: Keyspace,
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
    Ok(store.get(key)?.map(|v| v.to_vec()))
}

impl FjallStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = fjall::Database::builder(path)
            .open()
            .with_context(|| format!("Failed to open cache database at {}", path.display()))?;
        let items = db.keyspace("cache", fjall::KeyspaceCreateOptions::default)?;
        Ok(FjallStore { store: items })
    }
}

#[async_trait]
impl KeyValueStore for FjallStore {
    #[tracing::instrument(name = "query_store", level = "debug", skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        task::spawn_blocking(move || get_from_store(store, key)).await?
    }

    #[tracing::instrument(name = "put_store", level = "debug", skip(self, value), fields(bytes = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        task::spawn_blocking(move || store.insert(key, value)).await??;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        task::spawn_blocking(move || store.remove(key)).await??;
        Ok(())
    }
}

/// Process-local store, for hosts without durable storage and for tests
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Last successfully acquired dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedDataset {
    pub records: Vec<BeachRecord>,
    pub fetched_at_epoch_ms: Option<i64>,
}

impl CachedDataset {
    /// Valid while younger than `ttl` and non-empty
    #[must_use]
    pub fn is_valid_at(&self, now_epoch_ms: i64, ttl: Duration) -> bool {
        let Some(fetched_at) = self.fetched_at_epoch_ms else {
            return false;
        };
        if self.records.is_empty() {
            return false;
        }
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_epoch_ms.saturating_sub(fetched_at) < ttl_ms
    }
}

/// Owner of the persisted [`CachedDataset`]
///
/// Reads are served from memory so a read right after a write observes it,
/// whether or not the store has flushed.
pub struct DataCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    current: RwLock<Arc<CachedDataset>>,
}

impl DataCache {
    /// Load the persisted dataset; an unreadable entry starts empty
    pub async fn open(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Result<Self> {
        let bytes = store
            .get(DATASET_KEY)
            .await
            .context("Failed to read persisted beach data")?;

        let dataset = match bytes {
            Some(bytes) => match postcard::from_bytes::<CachedDataset>(&bytes) {
                Ok(dataset) => {
                    tracing::debug!(records = dataset.records.len(), "Loaded persisted beach data");
                    dataset
                }
                Err(e) => {
                    tracing::warn!("Discarding unreadable beach data cache: {}", e);
                    CachedDataset::default()
                }
            },
            None => {
                tracing::debug!("No persisted beach data");
                CachedDataset::default()
            }
        };

        Ok(Self {
            store,
            ttl,
            current: RwLock::new(Arc::new(dataset)),
        })
    }

    /// Open the on-disk store at the configured location
    pub async fn open_configured(config: &CacheConfig) -> Result<Self> {
        let store = FjallStore::open(&config.location)?;
        Self::open(Arc::new(store), config.ttl()).await
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().timestamp_millis()).await
    }

    pub async fn is_valid_at(&self, now_epoch_ms: i64) -> bool {
        self.current.read().await.is_valid_at(now_epoch_ms, self.ttl)
    }

    pub async fn snapshot(&self) -> Arc<CachedDataset> {
        self.current.read().await.clone()
    }

    pub async fn records(&self) -> Vec<BeachRecord> {
        self.current.read().await.records.clone()
    }

    /// Replace the dataset wholesale, stamped with the current time
    pub async fn write(&self, records: Vec<BeachRecord>) -> Result<()> {
        self.write_at(records, Utc::now().timestamp_millis()).await
    }

    #[tracing::instrument(name = "write_dataset", level = "debug", skip(self, records), fields(records = records.len()))]
    pub async fn write_at(&self, records: Vec<BeachRecord>, fetched_at_epoch_ms: i64) -> Result<()> {
        let dataset = Arc::new(CachedDataset {
            records,
            fetched_at_epoch_ms: Some(fetched_at_epoch_ms),
        });
        let bytes = postcard::to_stdvec(dataset.as_ref())?;
        *self.current.write().await = dataset;
        self.store
            .set(DATASET_KEY, bytes)
            .await
            .context("Failed to persist beach data")
    }

    pub async fn clear(&self) -> Result<()> {
        *self.current.write().await = Arc::new(CachedDataset::default());
        self.store
            .remove(DATASET_KEY)
            .await
            .context("Failed to clear persisted beach data")
    }
}
