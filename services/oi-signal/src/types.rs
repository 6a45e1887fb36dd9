use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// One OHLCV bar as received from the webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Bar time label as sent by the charting source
    pub time: String,
}

impl Candle {
    /// Absolute body size `|close - open|`
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// Open interest polled from the derivatives provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInterestSample {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub value: f64,
}

/// Externally flagged point-in-time signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerEvent {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub signal: String,
    pub color: Option<String>,
    pub time: String,
}

/// Observation log kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Candle,
    OpenInterest,
    Marker,
}

impl LogKind {
    pub const ALL: [LogKind; 3] = [LogKind::Candle, LogKind::OpenInterest, LogKind::Marker];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Candle => "candle",
            LogKind::OpenInterest => "open_interest",
            LogKind::Marker => "marker",
        }
    }

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            LogKind::Candle => "candle_logs",
            LogKind::OpenInterest => "oi_logs",
            LogKind::Marker => "marker_logs",
        }
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any row that can be appended to an observation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Candle(Candle),
    OpenInterest(OpenInterestSample),
    Marker(MarkerEvent),
}

impl Observation {
    pub fn kind(&self) -> LogKind {
        match self {
            Observation::Candle(_) => LogKind::Candle,
            Observation::OpenInterest(_) => LogKind::OpenInterest,
            Observation::Marker(_) => LogKind::Marker,
        }
    }
}

/// A persisted observation with its insertion-ordered id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObservation {
    pub id: i64,
    pub observation: Observation,
}

/// Inbound webhook payload
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub symbol: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub open: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub high: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub low: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub close: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub volume: f64,
    #[serde(deserialize_with = "time_label")]
    pub time: String,
    /// Marker signal label
    #[serde(rename = "type", default)]
    pub signal: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl WebhookEvent {
    /// Decode a raw JSON body, mapping any failure to `MalformedEvent`
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| SignalError::MalformedEvent(e.to_string()))
    }

    /// Marker signal label, if one was sent and is non-empty
    pub fn marker_signal(&self) -> Option<&str> {
        self.signal
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Split into the candle row and, when flagged, the marker row
    pub fn into_observations(self, timestamp: DateTime<Utc>) -> (Candle, Option<MarkerEvent>) {
        let marker = self.marker_signal().map(|signal| MarkerEvent {
            timestamp,
            symbol: self.symbol.clone(),
            signal: signal.to_string(),
            color: self.color.clone(),
            time: self.time.clone(),
        });

        let candle = Candle {
            timestamp,
            symbol: self.symbol,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            time: self.time,
        };

        (candle, marker)
    }
}

/// Accepts a JSON number or a numeric string
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom(format!("number out of range: {}", n))),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("invalid number: {:?}", s))),
        other => Err(de::Error::custom(format!("expected a number, got {}", other))),
    }
}

fn time_label<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a time label, got {}",
            other
        ))),
    }
}

/// Data source health/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub is_healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub success_rate: f64,
    pub avg_latency_ms: u64,
}

/// Error types for the signal service
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Rate limit exceeded for {source_name}")]
    RateLimit {
        source_name: String,
        retry_after: Option<u64>,
    },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl SignalError {
    /// Provider answered but carried no usable observation
    pub fn is_no_data(&self) -> bool {
        matches!(
            self,
            SignalError::SymbolNotFound(_) | SignalError::InvalidResponse(_)
        )
    }
}

impl From<sqlx::Error> for SignalError {
    fn from(e: sqlx::Error) -> Self {
        SignalError::Store(e.to_string())
    }
}

/// Result type for signal operations
pub type Result<T> = std::result::Result<T, SignalError>;

/// Append-only, id-ordered observation logs
#[async_trait::async_trait]
pub trait ObservationStore: Send + Sync {
    /// Append a row and return its id
    async fn insert(&self, observation: Observation) -> Result<i64>;

    /// Most recent `limit` rows of `kind`, newest first
    async fn query_recent(&self, kind: LogKind, limit: usize) -> Result<Vec<StoredObservation>>;

    /// Every row id of `kind`, newest first
    async fn row_ids(&self, kind: LogKind) -> Result<Vec<i64>>;

    /// Delete rows by id, returning how many were removed
    async fn delete_by_ids(&self, kind: LogKind, ids: &[i64]) -> Result<u64>;

    /// Store name
    fn name(&self) -> &str;
}

/// Fire-and-forget text delivery to a fixed recipient
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// External derivatives metric source
#[async_trait::async_trait]
pub trait MetricProvider: Send + Sync {
    /// Current open interest for `symbol`
    async fn fetch_metric(&self, symbol: &str) -> Result<f64>;

    async fn health(&self) -> SourceHealth;

    fn name(&self) -> &str;
}
