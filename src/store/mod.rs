//! Persistence for canonical performance records.
//!
//! Rows are keyed by (keyword, profile, date), so re-ingesting the same day
//! replaces the stored row instead of adding a second one.

mod fjall_store;
mod keys;

pub use fjall_store::FjallPerformanceStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::records::{CanonicalPerformanceRecord, PerformanceKey};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Upsert-by-key storage for performance rows
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    /// Insert or replace each record under its key; returns the number written
    async fn upsert(&self, records: &[CanonicalPerformanceRecord]) -> Result<usize>;

    async fn get(&self, key: &PerformanceKey) -> Result<Option<CanonicalPerformanceRecord>>;

    /// Rows of one profile dated within `start..=end`, ordered by date then keyword id
    async fn query(
        &self,
        profile_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CanonicalPerformanceRecord>>;

    /// Number of distinct keys stored
    async fn count(&self) -> Result<usize>;

    /// Backend name for health reporting
    fn backend(&self) -> &'static str;
}

fn sort_for_query(records: &mut [CanonicalPerformanceRecord]) {
    records.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.keyword_id.cmp(&b.keyword_id))
    });
}

/// In-process store, used in tests and single-run CLI imports
#[derive(Default)]
pub struct MemoryPerformanceStore {
    rows: RwLock<HashMap<PerformanceKey, CanonicalPerformanceRecord>>,
}

impl MemoryPerformanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PerformanceStore for MemoryPerformanceStore {
    async fn upsert(&self, records: &[CanonicalPerformanceRecord]) -> Result<usize> {
        let mut rows = self.rows.write().await;
        for record in records {
            rows.insert(record.key(), record.clone());
        }
        debug!(count = records.len(), "Upserted records in memory");
        Ok(records.len())
    }

    async fn get(&self, key: &PerformanceKey) -> Result<Option<CanonicalPerformanceRecord>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn query(
        &self,
        profile_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CanonicalPerformanceRecord>> {
        let mut records: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.profile_id == profile_id && r.date >= start && r.date <= end)
            .cloned()
            .collect();
        sort_for_query(&mut records);
        Ok(records)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.read().await.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::sample_record;

    #[tokio::test]
    async fn reingesting_same_key_keeps_one_row() {
        let store = MemoryPerformanceStore::new();
        let first = sample_record("k1", "p1", 3);
        let mut second = first.clone();
        second.clicks = 99;

        store.upsert(&[first.clone()]).await.unwrap();
        store.upsert(&[second]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.get(&first.key()).await.unwrap().unwrap();
        assert_eq!(stored.clicks, 99);
    }

    #[tokio::test]
    async fn distinct_dates_are_distinct_rows() {
        let store = MemoryPerformanceStore::new();
        let written = store
            .upsert(&[
                sample_record("k1", "p1", 3),
                sample_record("k1", "p1", 4),
                sample_record("k1", "p2", 3),
            ])
            .await
            .unwrap();

        assert_eq!(written, 3);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn query_filters_profile_and_dates() {
        let store = MemoryPerformanceStore::new();
        store
            .upsert(&[
                sample_record("k2", "p1", 4),
                sample_record("k1", "p1", 4),
                sample_record("k1", "p1", 3),
                sample_record("k1", "p1", 8),
                sample_record("k1", "p2", 4),
            ])
            .await
            .unwrap();

        let day = |d| NaiveDate::from_ymd_opt(2025, 11, d).unwrap();
        let rows = store.query("p1", day(3), day(4)).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| (r.keyword_id.as_str(), r.date)).collect();
        assert_eq!(keys, vec![("k1", day(3)), ("k1", day(4)), ("k2", day(4))]);
    }
}
