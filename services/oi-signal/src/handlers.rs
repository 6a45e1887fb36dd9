use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::coordinator::Coordinator;
use crate::observability::{metrics, MetricsSnapshot};
use crate::types::{SignalError, SourceHealth, WebhookEvent};

/// Application state shared across handlers
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/health", get(health_check))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub status: &'static str,
}

/// POST /webhook - Record one candle (and marker, if signalled)
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AckResponse>, (StatusCode, String)> {
    debug!(body = %String::from_utf8_lossy(&body), "Webhook received");

    let coordinator = &state.coordinator;
    let event = match serde_json::from_slice::<serde_json::Value>(&body)
        .map_err(|e| SignalError::MalformedEvent(e.to_string()))
        .and_then(WebhookEvent::from_value)
    {
        Ok(event) => event,
        Err(e) => {
            warn!("Rejected webhook event: {}", e);
            coordinator
                .metrics()
                .increment(metrics::EVENTS_REJECTED, 1)
                .await;
            return Err((StatusCode::BAD_REQUEST, e.to_string()));
        }
    };

    match coordinator.ingest(event).await {
        Ok(_) => Ok(Json(AckResponse { status: "ok" })),
        Err(e) => {
            error!("Failed to record webhook event: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub symbol: String,
    pub source: SourceHealth,
    pub metrics: MetricsSnapshot,
}

/// GET /health - Service and provider health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let coordinator = &state.coordinator;
    let source = coordinator.source_health().await;

    Json(HealthResponse {
        status: if source.is_healthy { "healthy" } else { "degraded" }.to_string(),
        symbol: coordinator.symbol().to_string(),
        source,
        metrics: coordinator.metrics().snapshot().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::notify::LogNotifier;
    use crate::store::failing::FailingStore;
    use crate::store::MemoryStore;
    use crate::types::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    struct DownProvider;

    #[async_trait::async_trait]
    impl MetricProvider for DownProvider {
        async fn fetch_metric(&self, _symbol: &str) -> Result<f64> {
            Err(SignalError::Api("down".to_string()))
        }

        async fn health(&self) -> SourceHealth {
            SourceHealth {
                source: "down".to_string(),
                is_healthy: false,
                last_success: None,
                last_error: Some("down".to_string()),
                success_rate: 0.0,
                avg_latency_ms: 0,
            }
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn app(store: Arc<dyn ObservationStore>) -> Router {
        let coordinator = Coordinator::new(
            &Settings::default(),
            store,
            Arc::new(DownProvider),
            Arc::new(LogNotifier::new("alerts")),
            Arc::new(LogNotifier::new("diagnostics")),
        );
        router(Arc::new(AppState {
            coordinator: Arc::new(coordinator),
        }))
    }

    fn post_webhook(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_webhook_records_candle_and_marker() {
        let store = Arc::new(MemoryStore::new());
        let body = r#"{"symbol":"ETHUSDT","open":"10","high":12,"low":9,"close":11,
            "volume":100,"time":"2024-01-01T00:00:00Z","type":"diamond","color":"green"}"#;

        let response = app(store.clone()).oneshot(post_webhook(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(store.len(LogKind::Candle).await, 1);
        assert_eq!(store.len(LogKind::Marker).await, 1);
    }

    #[tokio::test]
    async fn test_webhook_rejects_malformed_event() {
        let store = Arc::new(MemoryStore::new());

        let response = app(store.clone())
            .oneshot(post_webhook(r#"{"symbol":"ETHUSDT","open":"abc"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(store.clone())
            .oneshot(post_webhook("not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(store.len(LogKind::Candle).await, 0);
    }

    const VALID_EVENT: &str = r#"{"symbol":"ETHUSDT","open":10,"high":12,"low":9,"close":11,
        "volume":100,"time":"2024-01-01T00:00:00Z","type":"diamond","color":"red"}"#;

    #[tokio::test]
    async fn test_webhook_store_failure_is_server_error() {
        let store = Arc::new(FailingStore::new());
        store.fail_candle_insert.store(true, Ordering::SeqCst);

        let response = app(store.clone())
            .oneshot(post_webhook(VALID_EVENT))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("Store error"));
        assert_eq!(store.inner.len(LogKind::Candle).await, 0);
    }

    #[tokio::test]
    async fn test_webhook_acknowledges_after_marker_or_trim_failure() {
        let store = Arc::new(FailingStore::new());
        store.fail_marker_insert.store(true, Ordering::SeqCst);
        store.fail_row_ids.store(true, Ordering::SeqCst);

        let response = app(store.clone())
            .oneshot(post_webhook(VALID_EVENT))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.inner.len(LogKind::Candle).await, 1);
        assert_eq!(store.inner.len(LogKind::Marker).await, 0);
    }

    #[tokio::test]
    async fn test_health_reports_source_state() {
        let response = app(Arc::new(MemoryStore::new()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["symbol"], "ETH");
        assert_eq!(json["source"]["source"], "down");
    }
}
