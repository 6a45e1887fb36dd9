//! Retention Trimmer - bounds every observation log, oldest rows first

use std::sync::Arc;
use tracing::debug;

use crate::config::RetentionCaps;
use crate::types::{LogKind, ObservationStore, Result};

#[derive(Clone)]
pub struct RetentionTrimmer {
    store: Arc<dyn ObservationStore>,
    caps: RetentionCaps,
}

impl RetentionTrimmer {
    pub fn new(store: Arc<dyn ObservationStore>, caps: RetentionCaps) -> Self {
        Self { store, caps }
    }

    pub fn caps(&self) -> RetentionCaps {
        self.caps
    }

    /// Delete every row of `kind` beyond the `keep_count` newest.
    /// Returns the number of rows removed; a no-op when nothing exceeds the cap.
    pub async fn trim(&self, kind: LogKind, keep_count: usize) -> Result<u64> {
        let ids = self.store.row_ids(kind).await?;
        if ids.len() <= keep_count {
            return Ok(0);
        }

        let excess = &ids[keep_count..];
        let deleted = self.store.delete_by_ids(kind, excess).await?;

        debug!(
            kind = %kind,
            kept = keep_count,
            deleted,
            "Trimmed observation log"
        );

        Ok(deleted)
    }

    /// Trim `kind` to its configured cap
    pub async fn trim_kind(&self, kind: LogKind) -> Result<u64> {
        self.trim(kind, self.caps.cap(kind)).await
    }

    /// Trim all three logs concurrently, returning the total removed
    pub async fn trim_all(&self) -> Result<u64> {
        let deleted =
            futures::future::try_join_all(LogKind::ALL.iter().map(|kind| self.trim_kind(*kind)))
                .await?;
        Ok(deleted.into_iter().sum())
    }
}
