//! Cycle Coordinator
//!
//! Two independent triggers share only the observation store:
//! - ingestion, once per inbound webhook event (persist, then trim)
//! - polling, once per period (fetch OI, persist, classify, notify)

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::algorithms::{AlertCategory, Evaluation, SignalClassifier, SignalReport};
use crate::config::Settings;
use crate::observability::{metrics, MetricsCollector};
use crate::retention::RetentionTrimmer;
use crate::store;
use crate::types::*;

/// Rows written by one ingestion call
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub candle_id: i64,
    pub marker_id: Option<i64>,
    pub trimmed: u64,
}

/// What one polling cycle ended with
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Provider failed or had no data; nothing written, nothing classified
    FetchFailed { reason: String },
    /// Store read/write failed mid-cycle
    StoreFailed { reason: String },
    InsufficientData { candle_rows: usize, oi_rows: usize },
    Alerted(SignalReport),
}

impl CycleOutcome {
    pub fn category(&self) -> Option<AlertCategory> {
        match self {
            CycleOutcome::InsufficientData { .. } => Some(AlertCategory::InsufficientData),
            CycleOutcome::Alerted(report) => Some(report.category),
            _ => None,
        }
    }
}

pub struct Coordinator {
    symbol: String,
    store: Arc<dyn ObservationStore>,
    provider: Arc<dyn MetricProvider>,
    alerts: Arc<dyn NotificationChannel>,
    diagnostics: Arc<dyn NotificationChannel>,
    trimmer: RetentionTrimmer,
    classifier: SignalClassifier,
    metrics: MetricsCollector,
}

impl Coordinator {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn ObservationStore>,
        provider: Arc<dyn MetricProvider>,
        alerts: Arc<dyn NotificationChannel>,
        diagnostics: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            symbol: settings.symbol.to_uppercase(),
            trimmer: RetentionTrimmer::new(Arc::clone(&store), settings.retention),
            classifier: SignalClassifier::new(settings.analysis.clone()),
            metrics: MetricsCollector::new(),
            store,
            provider,
            alerts,
            diagnostics,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub async fn source_health(&self) -> SourceHealth {
        self.provider.health().await
    }

    /// Persist one inbound event, then trim every log to its cap.
    ///
    /// Parsing already happened, so a malformed event never reaches the store.
    /// Only the candle write can fail the call; marker and trim failures are
    /// logged and the event is still acknowledged.
    pub async fn ingest(&self, event: WebhookEvent) -> Result<IngestOutcome> {
        let (candle, marker) = event.into_observations(Utc::now());
        let symbol = candle.symbol.clone();

        let candle_id = self.store.insert(Observation::Candle(candle)).await?;
        self.metrics.increment(metrics::EVENTS_INGESTED, 1).await;

        let marker_id = match marker {
            Some(marker) => {
                info!(
                    symbol = %symbol,
                    signal = %marker.signal,
                    color = marker.color.as_deref().unwrap_or("none"),
                    "Marker detected"
                );
                // Candle row is committed; a marker failure is logged, not returned
                match self.store.insert(Observation::Marker(marker)).await {
                    Ok(id) => {
                        self.metrics.increment(metrics::MARKERS_INGESTED, 1).await;
                        Some(id)
                    }
                    Err(e) => {
                        error!(symbol = %symbol, "Marker write failed after candle write: {}", e);
                        None
                    }
                }
            }
            None => {
                debug!(symbol = %symbol, "No marker signal on event");
                None
            }
        };

        // Rows are already persisted; a failed trim is retried by the next write
        let trimmed = match self.trimmer.trim_all().await {
            Ok(n) => n,
            Err(e) => {
                warn!("Retention trim failed after ingestion: {}", e);
                0
            }
        };
        if trimmed > 0 {
            self.metrics.increment(metrics::ROWS_TRIMMED, trimmed).await;
        }

        Ok(IngestOutcome {
            candle_id,
            marker_id,
            trimmed,
        })
    }

    /// One polling cycle. Never fails: every problem becomes an outcome plus a diagnostic.
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.metrics.increment(metrics::CYCLES, 1).await;

        let value = match self.provider.fetch_metric(&self.symbol).await {
            Ok(v) => v,
            Err(e) => {
                if e.is_no_data() {
                    warn!(symbol = %self.symbol, "No open interest this cycle: {}", e);
                } else {
                    error!(symbol = %self.symbol, "Open interest fetch failed: {}", e);
                }
                self.metrics.increment(metrics::OI_FETCH_FAILED, 1).await;
                self.metrics.increment(metrics::CYCLES_SKIPPED, 1).await;
                self.diagnose(&format!(
                    "[diagnostic] open interest fetch failed for {}: {}",
                    self.symbol, e
                ))
                .await;
                return CycleOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };

        let sample = OpenInterestSample {
            timestamp: Utc::now(),
            symbol: self.symbol.clone(),
            value,
        };
        if let Err(e) = self.store.insert(Observation::OpenInterest(sample)).await {
            return self.store_failed("persist open interest", e).await;
        }
        self.metrics.increment(metrics::OI_SAMPLES, 1).await;
        info!(symbol = %self.symbol, open_interest = value, "Open interest recorded");

        match self.trimmer.trim_kind(LogKind::OpenInterest).await {
            Ok(n) if n > 0 => self.metrics.increment(metrics::ROWS_TRIMMED, n).await,
            Ok(_) => {}
            Err(e) => warn!("Retention trim failed after polling: {}", e),
        }

        let evaluation = match self.evaluate().await {
            Ok(evaluation) => evaluation,
            Err(e) => return self.store_failed("read observation windows", e).await,
        };

        match evaluation {
            Evaluation::InsufficientData {
                candle_rows,
                oi_rows,
                ..
            } => {
                info!(candle_rows, oi_rows, "Insufficient history, analysis skipped");
                self.metrics.increment(metrics::CYCLES_SKIPPED, 1).await;
                if let Some(line) = evaluation.diagnostic() {
                    self.diagnose(&line).await;
                }
                CycleOutcome::InsufficientData {
                    candle_rows,
                    oi_rows,
                }
            }
            Evaluation::Ready(report) => {
                info!(
                    category = %report.category,
                    volume_trend_pct = report.volume_trend_pct,
                    oi_trend_pct = report.oi_trend_pct,
                    pattern = %report.pattern,
                    "Signal classified"
                );

                if self.deliver(self.alerts.as_ref(), &report.message()).await {
                    self.metrics.increment(metrics::ALERTS_SENT, 1).await;
                }
                self.diagnose(&format!(
                    "[diagnostic] cycle complete: {}",
                    report.category
                ))
                .await;

                CycleOutcome::Alerted(report)
            }
        }
    }

    /// Read the current windows and run the classifier
    async fn evaluate(&self) -> Result<Evaluation> {
        let config = self.classifier.config();
        let store = self.store.as_ref();

        let (candles, samples, marker) = tokio::try_join!(
            store::recent_candles(store, config.candle_window()),
            store::recent_open_interest(store, config.oi_window()),
            store::latest_marker(store),
        )?;

        Ok(self
            .classifier
            .evaluate(&self.symbol, &candles, &samples, marker.as_ref()))
    }

    async fn store_failed(&self, stage: &str, e: SignalError) -> CycleOutcome {
        error!("Cycle aborted, failed to {}: {}", stage, e);
        self.metrics.increment(metrics::CYCLES_SKIPPED, 1).await;
        self.diagnose(&format!("[diagnostic] cycle aborted, failed to {}: {}", stage, e))
            .await;
        CycleOutcome::StoreFailed {
            reason: e.to_string(),
        }
    }

    async fn diagnose(&self, text: &str) {
        self.deliver(self.diagnostics.as_ref(), text).await;
    }

    /// Send and swallow failures; delivery problems never reach the caller
    async fn deliver(&self, channel: &dyn NotificationChannel, text: &str) -> bool {
        match channel.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                error!(channel = channel.name(), "Notification delivery failed: {}", e);
                self.metrics.increment(metrics::NOTIFICATIONS_FAILED, 1).await;
                false
            }
        }
    }
}

/// Spawn the polling loop. Cycles run strictly one after another for the
/// lifetime of the process; the first one waits a full period unless
/// `run_on_startup` is set.
pub fn spawn_poller(
    coordinator: Arc<Coordinator>,
    period: Duration,
    run_on_startup: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = if run_on_startup {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            symbol = %coordinator.symbol(),
            period_secs = period.as_secs(),
            "⏰ Open interest poller started"
        );

        loop {
            ticker.tick().await;
            let outcome = coordinator.run_cycle().await;
            match outcome.category() {
                Some(category) => info!(category = %category, "Polling cycle finished"),
                None => warn!("Polling cycle aborted: {:?}", outcome),
            }
        }
    })
}
