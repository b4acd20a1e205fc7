//! In-process store for isolated tests and local dry runs.
//!
//! Honors the same landing/merge protocol as the Postgres store, including
//! reading the staged parquet snapshot, so pipeline tests exercise the full
//! transfer path.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use revin_core::ReviewRecord;
use tokio::sync::Mutex;

use crate::{snapshot, DurableStore, LandingTable, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    permanent: BTreeMap<String, ReviewRecord>,
    landings: HashMap<String, Vec<ReviewRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn row_count(&self) -> usize {
        self.inner.lock().await.permanent.len()
    }

    pub async fn get(&self, id: &str) -> Option<ReviewRecord> {
        self.inner.lock().await.permanent.get(id).cloned()
    }

    /// Landing tables still present (should be empty after any run).
    pub async fn landing_tables(&self) -> Vec<String> {
        self.inner.lock().await.landings.keys().cloned().collect()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_landing(&self, landing: &LandingTable) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .landings
            .insert(landing.name().to_string(), Vec::new());
        Ok(())
    }

    async fn load_landing(
        &self,
        landing: &LandingTable,
        snapshot: &Path,
    ) -> Result<u64, StoreError> {
        let records = snapshot::read_snapshot(snapshot)?;
        let loaded = records.len() as u64;
        self.inner
            .lock()
            .await
            .landings
            .insert(landing.name().to_string(), records);
        Ok(loaded)
    }

    async fn merge_landing(&self, landing: &LandingTable) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let staged = inner.landings.get(landing.name()).cloned().unwrap_or_default();

        let mut inserted = 0u64;
        for record in staged {
            if !inner.permanent.contains_key(&record.id) {
                inner.permanent.insert(record.id.clone(), record);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn drop_landing(&self, landing: &LandingTable) -> Result<(), StoreError> {
        self.inner.lock().await.landings.remove(landing.name());
        Ok(())
    }
}
