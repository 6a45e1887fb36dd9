//! Observability: in-process counters

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Metrics collector shared by the ingestion and polling paths
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    counters: HashMap<String, u64>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                counters: HashMap::new(),
                start_time: Instant::now(),
            })),
        }
    }

    /// Increment a counter
    pub async fn increment(&self, name: &str, value: u64) {
        let mut inner = self.inner.write().await;
        let counter = inner.counters.entry(name.to_string()).or_insert(0);
        *counter += value;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        MetricsSnapshot {
            counters: inner.counters.clone(),
            uptime_secs: inner.start_time.elapsed().as_secs(),
        }
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        let inner = self.inner.read().await;
        inner.counters.get(name).copied().unwrap_or(0)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub uptime_secs: u64,
}

/// Predefined metric names
pub mod metrics {
    // Ingestion
    pub const EVENTS_INGESTED: &str = "events_ingested_total";
    pub const MARKERS_INGESTED: &str = "markers_ingested_total";
    pub const EVENTS_REJECTED: &str = "events_rejected_total";
    pub const ROWS_TRIMMED: &str = "rows_trimmed_total";

    // Polling
    pub const OI_SAMPLES: &str = "oi_samples_total";
    pub const OI_FETCH_FAILED: &str = "oi_fetch_failed_total";
    pub const CYCLES: &str = "cycles_total";
    pub const CYCLES_SKIPPED: &str = "cycles_skipped_total";

    // Notifications
    pub const ALERTS_SENT: &str = "alerts_sent_total";
    pub const NOTIFICATIONS_FAILED: &str = "notifications_failed_total";
}
