//! Insert-only merge protocol against the durable store.
//!
//! Load-to-landing then atomic merge, tracked as an explicit state machine
//! with the landing teardown reachable from every state.

use std::path::Path;

use revin_store::{DurableStore, LandingTable};
use tracing::{info, warn};
use uuid::Uuid;

use crate::IngestError;

/// Progress of one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePhase {
    Idle,
    Loaded,
    Merged,
    CleanedUp,
}

#[derive(Debug, Clone, Copy)]
pub struct MergeOutcome {
    pub rows_loaded: u64,
    pub rows_inserted: u64,
}

/// Run the full landing protocol for one staged snapshot. The landing table
/// is dropped on success and failure alike; the staged file itself is the
/// caller's to release.
pub async fn merge_snapshot(
    store: &dyn DurableStore,
    run_id: Uuid,
    snapshot: &Path,
) -> Result<MergeOutcome, IngestError> {
    let landing = LandingTable::for_run(run_id);
    store
        .create_landing(&landing)
        .await
        .map_err(IngestError::StoreUnavailable)?;

    let mut phase = MergePhase::Idle;
    let outcome = drive(store, &landing, snapshot, &mut phase).await;

    match store.drop_landing(&landing).await {
        Ok(()) => phase = MergePhase::CleanedUp,
        Err(err) => warn!(
            landing = landing.name(),
            error = %err,
            "failed to drop landing table"
        ),
    }

    let outcome = outcome?;
    info!(
        rows_loaded = outcome.rows_loaded,
        rows_inserted = outcome.rows_inserted,
        ?phase,
        "merge finished"
    );
    Ok(outcome)
}

async fn drive(
    store: &dyn DurableStore,
    landing: &LandingTable,
    snapshot: &Path,
    phase: &mut MergePhase,
) -> Result<MergeOutcome, IngestError> {
    let rows_loaded = store
        .load_landing(landing, snapshot)
        .await
        .map_err(IngestError::LoadFailed)?;
    *phase = MergePhase::Loaded;

    let rows_inserted = store
        .merge_landing(landing)
        .await
        .map_err(IngestError::MergeFailed)?;
    *phase = MergePhase::Merged;

    Ok(MergeOutcome {
        rows_loaded,
        rows_inserted,
    })
}
