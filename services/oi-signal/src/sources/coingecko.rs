use crate::config::{CoinGeckoConfig, CoinGeckoPlan};
use crate::types::*;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Internal health tracking for API-free health checks
struct HealthTracker {
    /// Timestamp of last successful request (millis since epoch)
    last_success_ms: AtomicU64,
    /// Timestamp of last failed request (millis since epoch)
    last_failure_ms: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    last_latency_ms: AtomicU64,
}

impl HealthTracker {
    fn new() -> Self {
        Self {
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            last_latency_ms: AtomicU64::new(0),
        }
    }

    fn record_success(&self, latency_ms: u64) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.last_success_ms.store(now_ms, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.last_failure_ms.store(now_ms, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    fn is_healthy(&self) -> bool {
        let last_success = self.last_success_ms.load(Ordering::Relaxed);
        let last_failure = self.last_failure_ms.load(Ordering::Relaxed);

        // Healthy if: had at least one success AND (no failures OR last success >= last failure)
        last_success > 0 && (last_failure == 0 || last_success >= last_failure)
    }

    fn success_rate(&self) -> f64 {
        let successes = self.success_count.load(Ordering::Relaxed);
        let failures = self.failure_count.load(Ordering::Relaxed);
        let total = successes + failures;
        if total == 0 {
            return 1.0; // No requests yet, assume healthy
        }
        successes as f64 / total as f64
    }
}

/// CoinGecko derivatives client - open interest per index symbol
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    plan: CoinGeckoPlan,
    request_timeout: Duration,
    health_tracker: HealthTracker,
}

impl CoinGeckoClient {
    pub fn new(config: &CoinGeckoConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SignalError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.resolved_base_url().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            plan: config.plan,
            request_timeout: Duration::from_secs(config.timeout_secs),
            health_tracker: HealthTracker::new(),
        })
    }

    /// Build request with optional API key
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut req = self.client.get(&url);

        if let Some(key) = &self.api_key {
            req = req.header(self.plan.key_header(), key);
        }

        req
    }

    /// Single request bounded by the configured timeout. A 429 is returned as
    /// `RateLimit` straight away; the next polling cycle is the retry.
    async fn request<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let request_start = Instant::now();

        let response = match tokio::time::timeout(
            self.request_timeout,
            self.build_request(endpoint).send(),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                self.health_tracker.record_failure();
                return Err(SignalError::Api(e.to_string()));
            }
            Err(_) => {
                self.health_tracker.record_failure();
                return Err(SignalError::Api(format!(
                    "CoinGecko request to {} timed out after {}s",
                    endpoint,
                    self.request_timeout.as_secs()
                )));
            }
        };

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            tracing::warn!(?retry_after, "CoinGecko rate limited");
            self.health_tracker.record_failure();
            return Err(SignalError::RateLimit {
                source_name: "coingecko".to_string(),
                retry_after,
            });
        }

        if !status.is_success() {
            self.health_tracker.record_failure();
            let text = response.text().await.unwrap_or_default();
            return Err(SignalError::Api(format!(
                "CoinGecko API error ({}): {}",
                status, text
            )));
        }

        let latency_ms = request_start.elapsed().as_millis() as u64;

        match response.json::<T>().await {
            Ok(body) => {
                self.health_tracker.record_success(latency_ms);
                Ok(body)
            }
            Err(e) => {
                self.health_tracker.record_failure();
                Err(SignalError::InvalidResponse(e.to_string()))
            }
        }
    }

    /// Current open interest for `symbol` from `/derivatives`.
    ///
    /// The first ticker whose `index_id` matches ignoring ASCII case is used.
    pub async fn get_open_interest(&self, symbol: &str) -> Result<f64> {
        let tickers: Vec<DerivativeTicker> = self.request("/derivatives").await?;
        open_interest_for(&tickers, symbol)
    }

    /// Get health status using internal metrics (no API call)
    pub fn health(&self) -> SourceHealth {
        let last_success_ms = self.health_tracker.last_success_ms.load(Ordering::Relaxed);
        let last_success = if last_success_ms > 0 {
            DateTime::from_timestamp_millis(last_success_ms as i64)
        } else {
            None
        };

        let is_healthy = self.health_tracker.is_healthy();

        SourceHealth {
            source: "coingecko".to_string(),
            is_healthy,
            last_success,
            last_error: if is_healthy {
                None
            } else {
                Some("Recent failures detected".to_string())
            },
            success_rate: self.health_tracker.success_rate(),
            avg_latency_ms: self.health_tracker.last_latency_ms.load(Ordering::Relaxed),
        }
    }
}

// Response types for CoinGecko API
#[derive(Debug, serde::Deserialize)]
struct DerivativeTicker {
    #[serde(default)]
    index_id: Option<String>,
    #[serde(default)]
    open_interest: Option<serde_json::Value>,
}

fn open_interest_for(tickers: &[DerivativeTicker], symbol: &str) -> Result<f64> {
    let ticker = tickers
        .iter()
        .find(|t| {
            t.index_id
                .as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(symbol))
        })
        .ok_or_else(|| SignalError::SymbolNotFound(symbol.to_uppercase()))?;

    // Numbers normally, numeric strings from some venues
    let value = match &ticker.open_interest {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    value.filter(|v| v.is_finite()).ok_or_else(|| {
        SignalError::InvalidResponse(format!(
            "Unusable open_interest for {}: {:?}",
            symbol.to_uppercase(),
            ticker.open_interest
        ))
    })
}

#[async_trait::async_trait]
impl MetricProvider for CoinGeckoClient {
    async fn fetch_metric(&self, symbol: &str) -> Result<f64> {
        self.get_open_interest(symbol).await
    }

    async fn health(&self) -> SourceHealth {
        CoinGeckoClient::health(self)
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}
