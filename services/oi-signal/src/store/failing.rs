//! In-memory store with switchable failures, for exercising error paths

use std::sync::atomic::{AtomicBool, Ordering};

use super::MemoryStore;
use crate::types::*;

/// Wraps `MemoryStore`; each flag makes one operation return `SignalError::Store`
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_candle_insert: AtomicBool,
    pub fail_marker_insert: AtomicBool,
    pub fail_oi_insert: AtomicBool,
    pub fail_query: AtomicBool,
    pub fail_row_ids: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(SignalError::Store(format!("{} unavailable", op)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObservationStore for FailingStore {
    async fn insert(&self, observation: Observation) -> Result<i64> {
        let flag = match observation.kind() {
            LogKind::Candle => &self.fail_candle_insert,
            LogKind::Marker => &self.fail_marker_insert,
            LogKind::OpenInterest => &self.fail_oi_insert,
        };
        Self::check(flag, "insert")?;
        self.inner.insert(observation).await
    }

    async fn query_recent(&self, kind: LogKind, limit: usize) -> Result<Vec<StoredObservation>> {
        Self::check(&self.fail_query, "query")?;
        self.inner.query_recent(kind, limit).await
    }

    async fn row_ids(&self, kind: LogKind) -> Result<Vec<i64>> {
        Self::check(&self.fail_row_ids, "row_ids")?;
        self.inner.row_ids(kind).await
    }

    async fn delete_by_ids(&self, kind: LogKind, ids: &[i64]) -> Result<u64> {
        self.inner.delete_by_ids(kind, ids).await
    }

    fn name(&self) -> &str {
        "failing"
    }
}
