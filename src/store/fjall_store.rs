use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::keys::{decode_performance_key, encode_performance_key, encode_profile_prefix};
use super::{PerformanceStore, Result, StoreError, sort_for_query};
use crate::records::{CanonicalPerformanceRecord, PerformanceKey};

/// Fjall-backed persistent storage for performance rows
#[derive(Clone)]
pub struct FjallPerformanceStore {
    keyspace: Keyspace,
    performance: PartitionHandle,
    /// Row count, scanned once at open and kept current by upserts.
    /// Upserts hold the lock so new-key detection cannot race.
    rows: Arc<Mutex<usize>>,
}

impl FjallPerformanceStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let performance =
            keyspace.open_partition("performance", PartitionCreateOptions::default())?;

        let mut rows = 0;
        for item in performance.iter() {
            item?;
            rows += 1;
        }
        info!(rows, "Performance store opened");

        Ok(Self {
            keyspace,
            performance,
            rows: Arc::new(Mutex::new(rows)),
        })
    }

    fn upsert_blocking(&self, records: &[CanonicalPerformanceRecord]) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for record in records {
            let key = encode_performance_key(&record.key());
            let value = serde_json::to_vec(record)?;
            if !self.performance.contains_key(&key)? {
                added += 1;
            }
            self.performance.insert(key, value)?;
        }
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        *rows += added;
        debug!(count = records.len(), added, "Upserted performance records");
        Ok(records.len())
    }

    fn get_blocking(&self, key: &PerformanceKey) -> Result<Option<CanonicalPerformanceRecord>> {
        match self.performance.get(encode_performance_key(key))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Rows of one profile dated within `start..=end`.
    /// Dates come from the key, so rows outside the range are never decoded.
    fn query_blocking(
        &self,
        profile_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CanonicalPerformanceRecord>> {
        let mut records = Vec::new();
        for item in self.performance.prefix(encode_profile_prefix(profile_id)) {
            let (key, value) = item?;
            let decoded = decode_performance_key(&key).ok_or_else(|| {
                StoreError::InvalidKey(String::from_utf8_lossy(&key).to_string())
            })?;
            if decoded.date < start || decoded.date > end {
                continue;
            }
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

async fn blocking<T, F>(store: &FjallPerformanceStore, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&FjallPerformanceStore) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

#[async_trait]
impl PerformanceStore for FjallPerformanceStore {
    async fn upsert(&self, records: &[CanonicalPerformanceRecord]) -> Result<usize> {
        let records = records.to_vec();
        blocking(self, move |store| store.upsert_blocking(&records)).await
    }

    async fn get(&self, key: &PerformanceKey) -> Result<Option<CanonicalPerformanceRecord>> {
        let key = key.clone();
        blocking(self, move |store| store.get_blocking(&key)).await
    }

    async fn query(
        &self,
        profile_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CanonicalPerformanceRecord>> {
        let profile_id = profile_id.to_string();
        let mut records =
            blocking(self, move |store| store.query_blocking(&profile_id, start, end)).await?;
        sort_for_query(&mut records);
        Ok(records)
    }

    async fn count(&self) -> Result<usize> {
        Ok(*self.rows.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn backend(&self) -> &'static str {
        "fjall"
    }
}
