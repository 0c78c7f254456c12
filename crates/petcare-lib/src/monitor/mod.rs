//! Drift monitoring
//!
//! State machine `NoBaseline -> HasBaseline -> HasBaseline`. Every
//! observation is evaluated against the previous baseline first; only then
//! is the baseline replaced, on disk and in memory, under one lock.
//!
//! Evaluation and the baseline write run on the blocking pool. The task owns
//! the state lock, so an observation abandoned by a timeout still completes
//! before the next one can start.

mod baseline;
mod policy;

pub use baseline::BaselineStore;
pub use policy::{AlertPolicy, DataAmountAlertPolicy, DEFAULT_MIN_NEW_ROWS};

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::RawRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Outcome of one observation; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub triggered: bool,
    /// `None` on the first observation
    pub previous_rows: Option<usize>,
    pub new_rows: usize,
}

#[derive(Debug)]
enum MonitorState {
    NoBaseline,
    HasBaseline(Vec<RawRecord>),
}

pub struct DriftMonitor {
    policy: Arc<dyn AlertPolicy>,
    store: BaselineStore,
    state: Arc<Mutex<MonitorState>>,
}

impl DriftMonitor {
    /// Restore the persisted baseline, if any
    pub fn open(policy: Box<dyn AlertPolicy>, store: BaselineStore) -> LifecycleResult<Self> {
        let state = match store.load()? {
            Some(records) => MonitorState::HasBaseline(records),
            None => MonitorState::NoBaseline,
        };
        info!(
            policy = policy.name(),
            baseline = %store.path().display(),
            has_baseline = matches!(state, MonitorState::HasBaseline(_)),
            "Drift monitor opened"
        );
        Ok(Self {
            policy: Arc::from(policy),
            store,
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Decide on `snapshot`, then make it the new baseline.
    ///
    /// If persisting fails the in-memory baseline is left untouched, so the
    /// next cycle compares against the same previous snapshot.
    pub async fn observe(&self, snapshot: Vec<RawRecord>) -> LifecycleResult<AlertEvent> {
        let mut state = self.state.clone().lock_owned().await;
        let policy = self.policy.clone();
        let store = self.store.clone();

        tokio::task::spawn_blocking(move || -> LifecycleResult<AlertEvent> {
            let (triggered, previous_rows) = match &*state {
                MonitorState::NoBaseline => (false, None),
                MonitorState::HasBaseline(previous) => {
                    (policy.analyze(previous, &snapshot), Some(previous.len()))
                }
            };
            let new_rows = snapshot.len();

            store.save(&snapshot)?;
            *state = MonitorState::HasBaseline(snapshot);

            Ok(AlertEvent {
                triggered,
                previous_rows,
                new_rows,
            })
        })
        .await
        .map_err(|e| LifecycleError::Task(format!("drift observation: {}", e)))?
    }

    /// Row count of the current baseline
    pub async fn baseline_rows(&self) -> Option<usize> {
        match &*self.state.lock().await {
            MonitorState::NoBaseline => None,
            MonitorState::HasBaseline(records) => Some(records.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rows(n: usize) -> Vec<RawRecord> {
        let record = RawRecord {
            pet_breed_id: 1,
            birth: "2020-01-01".parse().unwrap(),
            gender: None,
            neuter_yn: None,
            weight_kg: None,
            claim_price: None,
            created_at: "2021-01-01T00:00:00".parse().unwrap(),
            disease_name: None,
        };
        vec![record; n]
    }

    fn monitor(dir: &TempDir) -> DriftMonitor {
        DriftMonitor::open(
            Box::new(DataAmountAlertPolicy::default()),
            BaselineStore::new(dir.path().join("baseline.csv")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_observation_initializes_baseline() {
        let dir = TempDir::new().unwrap();
        let m = monitor(&dir);
        assert_eq!(m.baseline_rows().await, None);

        let event = m.observe(rows(500)).await.unwrap();
        assert!(!event.triggered);
        assert_eq!(event.previous_rows, None);
        assert_eq!(m.baseline_rows().await, Some(500));
    }

    #[tokio::test]
    async fn test_growth_measured_against_previous_cycle() {
        let dir = TempDir::new().unwrap();
        let m = monitor(&dir);
        m.observe(rows(100)).await.unwrap();

        let event = m.observe(rows(131)).await.unwrap();
        assert!(event.triggered);
        assert_eq!(event.previous_rows, Some(100));

        // 131 is now the baseline, so +10 does not fire
        let event = m.observe(rows(141)).await.unwrap();
        assert!(!event.triggered);
    }

    #[tokio::test]
    async fn test_baseline_survives_reopen() {
        let dir = TempDir::new().unwrap();
        monitor(&dir).observe(rows(100)).await.unwrap();

        let reopened = monitor(&dir);
        assert_eq!(reopened.baseline_rows().await, Some(100));
        assert!(reopened.observe(rows(130)).await.unwrap().triggered);
    }
}
