//! Pluggable retraining alert policies

use crate::models::RawRecord;

/// Rows of growth that justify retraining by default
pub const DEFAULT_MIN_NEW_ROWS: usize = 30;

/// Decides from two consecutive snapshots whether retraining is warranted.
///
/// Implementations must be pure: same inputs, same answer, no side effects.
pub trait AlertPolicy: Send + Sync {
    fn analyze(&self, previous: &[RawRecord], new: &[RawRecord]) -> bool;

    fn name(&self) -> &'static str;
}

/// Fires when the dataset grew by at least `min_new_rows`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataAmountAlertPolicy {
    pub min_new_rows: usize,
}

impl Default for DataAmountAlertPolicy {
    fn default() -> Self {
        Self {
            min_new_rows: DEFAULT_MIN_NEW_ROWS,
        }
    }
}

impl DataAmountAlertPolicy {
    pub fn new(min_new_rows: usize) -> Self {
        Self { min_new_rows }
    }
}

impl AlertPolicy for DataAmountAlertPolicy {
    fn analyze(&self, previous: &[RawRecord], new: &[RawRecord]) -> bool {
        // A shrinking dataset never triggers.
        new.len().saturating_sub(previous.len()) >= self.min_new_rows
    }

    fn name(&self) -> &'static str {
        "data_amount"
    }
}
