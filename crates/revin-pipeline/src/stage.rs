//! Run-scoped staging of the canonical batch as a parquet snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use revin_core::IngestionBatch;
use revin_store::snapshot::{write_snapshot, SnapshotError};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub struct SnapshotStager {
    dir: PathBuf,
}

impl SnapshotStager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write the batch as one parquet file named after the run id. The
    /// write goes to a temp file and is renamed into place, so a
    /// half-written snapshot is never discoverable under its final name.
    pub fn stage(&self, batch: &IngestionBatch) -> Result<StagedSnapshot, StagingError> {
        fs::create_dir_all(&self.dir)?;
        let final_path = self.dir.join(format!("{}.parquet", batch.run_id.simple()));
        let temp_path = self.dir.join(format!(".{}.tmp", batch.run_id.simple()));

        if let Err(err) = write_snapshot(&temp_path, &batch.records) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }

        let sha256 = match fs::read(&temp_path) {
            Ok(bytes) => hex::encode(Sha256::digest(&bytes)),
            Err(err) => {
                let _ = fs::remove_file(&temp_path);
                return Err(err.into());
            }
        };

        if let Err(err) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }

        debug!(
            path = %final_path.display(),
            rows = batch.records.len(),
            %sha256,
            "staged snapshot"
        );

        Ok(StagedSnapshot {
            path: final_path,
            rows: batch.records.len(),
            sha256,
            removed: false,
        })
    }
}

/// Transient staging artifact scoped to one run. `remove` runs on both the
/// success and failure paths; drop is the backstop if neither happened.
#[derive(Debug)]
pub struct StagedSnapshot {
    path: PathBuf,
    rows: usize,
    sha256: String,
    removed: bool,
}

impl StagedSnapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn remove(&mut self) -> std::io::Result<()> {
        if self.removed {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                self.removed = true;
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.removed = true;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Drop for StagedSnapshot {
    fn drop(&mut self) {
        if !self.removed && fs::remove_file(&self.path).is_err() {
            warn!(path = %self.path.display(), "staging snapshot left behind");
        }
    }
}
