// In-process observation logs
use crate::types::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// Observation store kept in memory, oldest row first per kind.
///
/// Ids come from one monotonic counter shared by all kinds, so they are
/// strictly increasing in insertion order within each log.
pub struct MemoryStore {
    next_id: AtomicI64,
    logs: RwLock<HashMap<LogKind, Vec<StoredObservation>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            logs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of rows currently held for `kind`
    pub async fn len(&self, kind: LogKind) -> usize {
        self.logs.read().await.get(&kind).map_or(0, Vec::len)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ObservationStore for MemoryStore {
    async fn insert(&self, observation: Observation) -> Result<i64> {
        let kind = observation.kind();
        let mut logs = self.logs.write().await;
        // id taken under the write lock so append order matches id order
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        logs.entry(kind)
            .or_default()
            .push(StoredObservation { id, observation });
        Ok(id)
    }

    async fn query_recent(&self, kind: LogKind, limit: usize) -> Result<Vec<StoredObservation>> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(&kind)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn row_ids(&self, kind: LogKind) -> Result<Vec<i64>> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(&kind)
            .map(|rows| rows.iter().rev().map(|r| r.id).collect())
            .unwrap_or_default())
    }

    async fn delete_by_ids(&self, kind: LogKind, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut logs = self.logs.write().await;
        let Some(rows) = logs.get_mut(&kind) else {
            return Ok(0);
        };

        let before = rows.len();
        rows.retain(|r| !ids.contains(&r.id));
        Ok((before - rows.len()) as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
