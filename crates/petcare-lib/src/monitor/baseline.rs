//! On-disk baseline snapshot

use crate::artifact::write_atomic;
use crate::error::LifecycleResult;
use crate::models::RawRecord;
use crate::retrieve::{encode_records_csv, read_records_csv};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persists the last snapshot as a CSV with the raw record layout
#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no baseline has been written yet
    pub fn load(&self) -> LifecycleResult<Option<Vec<RawRecord>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let records = read_records_csv(&self.path)?;
        debug!(path = %self.path.display(), rows = records.len(), "Baseline loaded");
        Ok(Some(records))
    }

    pub fn save(&self, records: &[RawRecord]) -> LifecycleResult<()> {
        let bytes = encode_records_csv(records)?;
        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), rows = records.len(), "Baseline saved");
        Ok(())
    }
}
