//! Durable store contracts: bulk load, key-based merge, landing lifecycle.

pub mod memory;
pub mod postgres;
pub mod snapshot;

pub use memory::MemoryStore;
pub use postgres::PgReviewStore;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::snapshot::SnapshotError;

pub const CRATE_NAME: &str = "revin-store";

/// Run-scoped landing table. Built from the run id so the name is unique
/// per run and safe to splice into SQL (hex characters only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingTable {
    name: String,
}

impl LandingTable {
    pub fn for_run(run_id: Uuid) -> Self {
        Self {
            name: format!("revin_landing_{}", run_id.simple()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connecting to durable store: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("{context}: {source}")]
    Query {
        context: &'static str,
        source: sqlx::Error,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Capability contract over the permanent review table. Implementations
/// must make `merge_landing` a single atomic set operation: under
/// concurrent runs the unique key decides, not this pipeline.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Create the permanent table when absent.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Create the run-scoped landing table with explicit column types.
    async fn create_landing(&self, landing: &LandingTable) -> Result<(), StoreError>;

    /// Bulk-load the staged snapshot into the landing table in one
    /// operation. Returns the number of rows loaded.
    async fn load_landing(
        &self,
        landing: &LandingTable,
        snapshot: &Path,
    ) -> Result<u64, StoreError>;

    /// Insert landing rows whose id is unseen in the permanent table; skip
    /// the rest, never updating them. Returns the rows actually inserted.
    async fn merge_landing(&self, landing: &LandingTable) -> Result<u64, StoreError>;

    /// Drop the landing table. Safe to call whether or not it was loaded.
    async fn drop_landing(&self, landing: &LandingTable) -> Result<(), StoreError>;
}
