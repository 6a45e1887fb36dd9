//! Service configuration
//!
//! Defaults, then an optional `config/oi-signal.{toml,yaml,json}` file, then
//! `OI_SIGNAL__*` environment variables (`__` separates nested keys, e.g.
//! `OI_SIGNAL__TELEGRAM__BOT_TOKEN`).

use serde::Deserialize;
use std::time::Duration;

use crate::types::{LogKind, Result, SignalError};

/// Environment prefix
pub const ENV_PREFIX: &str = "OI_SIGNAL";
/// Optional config file (extension resolved by the `config` crate)
pub const CONFIG_FILE: &str = "config/oi-signal";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Run one cycle immediately instead of waiting a full period
    #[serde(default)]
    pub run_on_startup: bool,
    /// Postgres URL; in-memory logs when unset
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub retention: RetentionCaps,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub coingecko: CoinGeckoConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

fn default_symbol() -> String {
    "ETH".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_poll_interval_secs() -> u64 {
    4 * 60 * 60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            port: default_port(),
            poll_interval_secs: default_poll_interval_secs(),
            run_on_startup: false,
            database_url: None,
            retention: RetentionCaps::default(),
            analysis: AnalysisConfig::default(),
            coingecko: CoinGeckoConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl Settings {
    /// Load from the default file and environment
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));

        Self::from_builder(builder)
    }

    /// Build from an arbitrary source stack, then validate
    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SignalError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reject combinations under which classification could never run
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(SignalError::Config("symbol must not be empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(SignalError::Config(
                "poll_interval_secs must be positive".to_string(),
            ));
        }

        self.analysis.validate()?;

        for kind in LogKind::ALL {
            let cap = self.retention.cap(kind);
            if cap == 0 {
                return Err(SignalError::Config(format!(
                    "retention cap for {} must be positive",
                    kind
                )));
            }
        }

        if self.retention.candles < self.analysis.min_candles {
            return Err(SignalError::Config(format!(
                "retention.candles ({}) is below analysis.min_candles ({})",
                self.retention.candles, self.analysis.min_candles
            )));
        }
        if self.retention.open_interest < self.analysis.min_oi_samples {
            return Err(SignalError::Config(format!(
                "retention.open_interest ({}) is below analysis.min_oi_samples ({})",
                self.retention.open_interest, self.analysis.min_oi_samples
            )));
        }

        Ok(())
    }
}

/// Maximum rows kept per observation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetentionCaps {
    pub candles: usize,
    pub open_interest: usize,
    pub markers: usize,
}

impl RetentionCaps {
    pub fn cap(&self, kind: LogKind) -> usize {
        match kind {
            LogKind::Candle => self.candles,
            LogKind::OpenInterest => self.open_interest,
            LogKind::Marker => self.markers,
        }
    }
}

impl Default for RetentionCaps {
    fn default() -> Self {
        Self {
            candles: 50,
            open_interest: 50,
            markers: 50,
        }
    }
}

/// Window sizes and thresholds for the classifier
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Candles in the volume baseline (latest included)
    pub volume_window: usize,
    pub oi_short_window: usize,
    pub oi_long_window: usize,
    pub min_candles: usize,
    pub min_oi_samples: usize,
    /// Flat band around zero OI trend, in percent (inclusive)
    pub flat_threshold_pct: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            volume_window: 20,
            oi_short_window: 6,
            oi_long_window: 30,
            min_candles: 30,
            min_oi_samples: 30,
            flat_threshold_pct: 3.0,
        }
    }
}

impl AnalysisConfig {
    /// Candle rows to read for one evaluation
    pub fn candle_window(&self) -> usize {
        self.min_candles.max(self.volume_window)
    }

    /// OI rows to read for one evaluation
    pub fn oi_window(&self) -> usize {
        self.min_oi_samples.max(self.oi_long_window)
    }

    pub fn validate(&self) -> Result<()> {
        if self.volume_window == 0 || self.oi_short_window == 0 || self.oi_long_window == 0 {
            return Err(SignalError::Config(
                "analysis windows must be positive".to_string(),
            ));
        }
        if self.min_candles < 2 {
            return Err(SignalError::Config(
                "analysis.min_candles must be at least 2 for pattern detection".to_string(),
            ));
        }
        if self.oi_short_window > self.oi_long_window {
            return Err(SignalError::Config(format!(
                "analysis.oi_short_window ({}) exceeds oi_long_window ({})",
                self.oi_short_window, self.oi_long_window
            )));
        }
        if self.volume_window > self.min_candles {
            return Err(SignalError::Config(format!(
                "analysis.volume_window ({}) exceeds min_candles ({})",
                self.volume_window, self.min_candles
            )));
        }
        if self.oi_long_window > self.min_oi_samples {
            return Err(SignalError::Config(format!(
                "analysis.oi_long_window ({}) exceeds min_oi_samples ({})",
                self.oi_long_window, self.min_oi_samples
            )));
        }
        if !self.flat_threshold_pct.is_finite() || self.flat_threshold_pct < 0.0 {
            return Err(SignalError::Config(
                "analysis.flat_threshold_pct must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// CoinGecko API plan, selecting host and key header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoinGeckoPlan {
    #[default]
    Demo,
    Pro,
}

impl CoinGeckoPlan {
    pub fn base_url(&self) -> &'static str {
        match self {
            CoinGeckoPlan::Demo => "https://api.coingecko.com/api/v3",
            CoinGeckoPlan::Pro => "https://pro-api.coingecko.com/api/v3",
        }
    }

    pub fn key_header(&self) -> &'static str {
        match self {
            CoinGeckoPlan::Demo => "x-cg-demo-api-key",
            CoinGeckoPlan::Pro => "x-cg-pro-api-key",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoinGeckoConfig {
    pub api_key: Option<String>,
    pub plan: CoinGeckoPlan,
    /// Overrides the plan's host
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            plan: CoinGeckoPlan::default(),
            base_url: None,
            timeout_secs: 10,
        }
    }
}

impl CoinGeckoConfig {
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.plan.base_url().to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    /// Primary alert recipient
    pub chat_id: Option<String>,
    /// Diagnostic recipient; diagnostics are only logged when unset
    pub diagnostic_chat_id: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            diagnostic_chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 10,
        }
    }
}
