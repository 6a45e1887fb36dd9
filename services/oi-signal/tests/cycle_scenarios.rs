//! End-to-end polling cycles over the in-memory store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use oi_signal::config::{CoinGeckoConfig, TelegramConfig};
use oi_signal::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingChannel {
    messages: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send_text(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Replays scripted answers, then reports the symbol as missing
struct ScriptedProvider {
    answers: Mutex<VecDeque<Result<f64>>>,
}

impl ScriptedProvider {
    fn new(answers: Vec<Result<f64>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
        })
    }
}

#[async_trait::async_trait]
impl MetricProvider for ScriptedProvider {
    async fn fetch_metric(&self, symbol: &str) -> Result<f64> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SignalError::SymbolNotFound(symbol.to_string())))
    }

    async fn health(&self) -> SourceHealth {
        SourceHealth {
            source: "scripted".to_string(),
            is_healthy: true,
            last_success: None,
            last_error: None,
            success_rate: 1.0,
            avg_latency_ms: 0,
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    alerts: Arc<RecordingChannel>,
    diagnostics: Arc<RecordingChannel>,
    coordinator: Coordinator,
}

fn harness(provider: Arc<dyn MetricProvider>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let alerts = Arc::new(RecordingChannel::default());
    let diagnostics = Arc::new(RecordingChannel::default());
    let coordinator = Coordinator::new(
        &Settings::default(),
        store.clone(),
        provider,
        alerts.clone(),
        diagnostics.clone(),
    );

    Harness {
        store,
        alerts,
        diagnostics,
        coordinator,
    }
}

fn event(open: f64, close: f64, volume: f64, marker: Option<&str>) -> WebhookEvent {
    let mut body = json!({
        "symbol": "ETHUSDT",
        "open": open,
        "high": open.max(close) + 1.0,
        "low": open.min(close) - 1.0,
        "close": close,
        "volume": volume,
        "time": "2024-01-01T00:00:00Z",
    });
    if let Some(color) = marker {
        body["type"] = json!("diamond");
        body["color"] = json!(color);
    }
    WebhookEvent::from_value(body).unwrap()
}

/// `count` candles of volume 100 and body 1, then a latest candle with a
/// three-times body in the given direction, volume 120 and an optional marker.
async fn seed_candles(h: &Harness, count: usize, bullish: bool, marker: Option<&str>) {
    for _ in 0..count - 1 {
        h.coordinator.ingest(event(100.0, 101.0, 100.0, None)).await.unwrap();
    }
    let close = if bullish { 103.0 } else { 97.0 };
    h.coordinator
        .ingest(event(100.0, close, 120.0, marker))
        .await
        .unwrap();
}

/// 24 older samples at 100 and 5 recent ones at `recent`; the provider
/// supplies the newest one.
async fn seed_open_interest(h: &Harness, recent: f64) {
    for i in 0..29 {
        let value = if i < 24 { 100.0 } else { recent };
        h.store
            .insert(Observation::OpenInterest(OpenInterestSample {
                timestamp: Utc::now(),
                symbol: "ETH".to_string(),
                value,
            }))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn strong_buy_sends_one_alert_and_completion_diagnostic() {
    let h = harness(ScriptedProvider::new(vec![Ok(105.0)]));
    seed_candles(&h, 30, true, Some("green")).await;
    seed_open_interest(&h, 105.0).await;

    let outcome = h.coordinator.run_cycle().await;

    let CycleOutcome::Alerted(report) = outcome else {
        panic!("expected an alert, got {:?}", outcome);
    };
    assert_eq!(report.category, AlertCategory::StrongBuy);
    assert!(report.volume_trend_pct > 0.0);
    assert!(report.oi_trend_pct > 0.0);
    assert_eq!(report.pattern, CandlePattern::Bullish);

    let alerts = h.alerts.messages();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("STRONG BUY"));
    assert!(alerts[0].contains("ETH"));
    assert!(alerts[0].contains("Marker: green"));

    assert_eq!(
        h.diagnostics.messages(),
        vec!["[diagnostic] cycle complete: strong_buy".to_string()]
    );
    assert_eq!(h.store.len(LogKind::OpenInterest).await, 30);
}

#[tokio::test]
async fn falling_open_interest_under_bullish_candle_is_short_squeeze() {
    let h = harness(ScriptedProvider::new(vec![Ok(95.0)]));
    seed_candles(&h, 30, true, Some("green")).await;
    seed_open_interest(&h, 95.0).await;

    let outcome = h.coordinator.run_cycle().await;

    assert_eq!(outcome.category(), Some(AlertCategory::ShortSqueeze));
    assert_eq!(h.alerts.messages().len(), 1);
    assert!(h.alerts.messages()[0].contains("SHORT SQUEEZE"));
}

#[tokio::test]
async fn latest_marker_applies_even_when_older_than_latest_candle() {
    let h = harness(ScriptedProvider::new(vec![Ok(105.0)]));
    h.coordinator
        .ingest(event(100.0, 101.0, 100.0, Some(" RED ")))
        .await
        .unwrap();
    seed_candles(&h, 30, false, None).await;
    seed_open_interest(&h, 105.0).await;

    let outcome = h.coordinator.run_cycle().await;

    assert_eq!(outcome.category(), Some(AlertCategory::StrongSell));
}

#[tokio::test]
async fn short_candle_history_skips_analysis() {
    let h = harness(ScriptedProvider::new(vec![Ok(105.0)]));
    seed_candles(&h, 10, true, Some("green")).await;
    seed_open_interest(&h, 105.0).await;

    let outcome = h.coordinator.run_cycle().await;

    assert!(matches!(
        outcome,
        CycleOutcome::InsufficientData {
            candle_rows: 10,
            oi_rows: 30
        }
    ));
    assert!(h.alerts.messages().is_empty());

    let diagnostics = h.diagnostics.messages();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].starts_with("[diagnostic]"));
    assert!(diagnostics[0].contains("candles 10/30"));
}

#[tokio::test]
async fn missing_symbol_writes_nothing_and_reports_once() {
    let h = harness(ScriptedProvider::new(vec![]));
    seed_candles(&h, 30, true, Some("green")).await;

    let outcome = h.coordinator.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::FetchFailed { .. }));
    assert_eq!(h.store.len(LogKind::OpenInterest).await, 0);
    assert!(h.alerts.messages().is_empty());
    assert_eq!(h.diagnostics.messages().len(), 1);
}

#[tokio::test]
async fn logs_stay_within_retention_caps() {
    let h = harness(ScriptedProvider::new(vec![]));
    for _ in 0..60 {
        h.coordinator
            .ingest(event(100.0, 101.0, 100.0, Some("green")))
            .await
            .unwrap();
    }

    assert_eq!(h.store.len(LogKind::Candle).await, 50);
    assert_eq!(h.store.len(LogKind::Marker).await, 50);

    let ids = h.store.row_ids(LogKind::Candle).await.unwrap();
    assert_eq!(ids.first(), Some(&119));
    assert!(ids.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
async fn cycle_over_http_collaborators() {
    let coingecko = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/derivatives"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "index_id": "BTC", "open_interest": 900.0 },
            { "index_id": "eth", "open_interest": "105" },
            { "index_id": "ETH", "open_interest": 1.0 }
        ])))
        .expect(1)
        .mount(&coingecko)
        .await;

    let telegram = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botT/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": "alerts" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&telegram)
        .await;
    Mock::given(method("POST"))
        .and(path("/botT/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": "diag" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&telegram)
        .await;

    let provider = CoinGeckoClient::new(&CoinGeckoConfig {
        base_url: Some(coingecko.uri()),
        ..CoinGeckoConfig::default()
    })
    .unwrap();
    let telegram_config = TelegramConfig {
        bot_token: Some("T".to_string()),
        chat_id: Some("alerts".to_string()),
        diagnostic_chat_id: Some("diag".to_string()),
        api_base: telegram.uri(),
        timeout_secs: 5,
    };
    let alerts = TelegramNotifier::alerts(&telegram_config).unwrap().unwrap();
    let diagnostics = TelegramNotifier::diagnostics(&telegram_config)
        .unwrap()
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(
        &Settings::default(),
        store.clone(),
        Arc::new(provider),
        Arc::new(alerts),
        Arc::new(diagnostics),
    );
    let h = Harness {
        store,
        alerts: Arc::new(RecordingChannel::default()),
        diagnostics: Arc::new(RecordingChannel::default()),
        coordinator,
    };
    seed_candles(&h, 30, true, Some("green")).await;
    seed_open_interest(&h, 105.0).await;

    let outcome = h.coordinator.run_cycle().await;

    assert_eq!(outcome.category(), Some(AlertCategory::StrongBuy));
    let newest = h.store.query_recent(LogKind::OpenInterest, 1).await.unwrap();
    assert!(matches!(
        &newest[0].observation,
        Observation::OpenInterest(sample) if sample.value == 105.0
    ));
    assert!(h.coordinator.source_health().await.is_healthy);
}

#[tokio::test]
async fn rate_limited_fetch_skips_cycle_without_retrying() {
    let coingecko = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/derivatives"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&coingecko)
        .await;
    Mock::given(method("GET"))
        .and(path("/derivatives"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "index_id": "ETH", "open_interest": 5.0 }])),
        )
        .expect(0)
        .mount(&coingecko)
        .await;

    let provider = CoinGeckoClient::new(&CoinGeckoConfig {
        base_url: Some(coingecko.uri()),
        ..CoinGeckoConfig::default()
    })
    .unwrap();
    let h = harness(Arc::new(provider));

    let outcome = h.coordinator.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::FetchFailed { .. }));
    assert_eq!(h.store.len(LogKind::OpenInterest).await, 0);
    assert!(h.alerts.messages().is_empty());
    let diagnostics = h.diagnostics.messages();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].contains("Rate limit exceeded"));
}
