//! Signal Classification Engine
//!
//! Turns trend statistics, the latest candle pattern and the latest marker
//! color into one alert category using a fixed, first-match decision table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pattern::{detect_pattern, CandlePattern};
use super::trend::{open_interest_trend, volume_trend};
use crate::config::AnalysisConfig;
use crate::types::{Candle, MarkerEvent, OpenInterestSample};

/// Alert categories produced by one classification call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    StrongBuy,
    LeanBuy,
    StrongSell,
    LeanSell,
    NeutralHighConviction,
    ShortSqueeze,
    LongSqueeze,
    LiquidationNoDirection,
    Accumulation,
    Distribution,
    VolatilityNoDirection,
    Watch,
    /// Not a market alert: required history is missing
    InsufficientData,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::StrongBuy => "strong_buy",
            AlertCategory::LeanBuy => "lean_buy",
            AlertCategory::StrongSell => "strong_sell",
            AlertCategory::LeanSell => "lean_sell",
            AlertCategory::NeutralHighConviction => "neutral_high_conviction",
            AlertCategory::ShortSqueeze => "short_squeeze",
            AlertCategory::LongSqueeze => "long_squeeze",
            AlertCategory::LiquidationNoDirection => "liquidation_no_direction",
            AlertCategory::Accumulation => "accumulation",
            AlertCategory::Distribution => "distribution",
            AlertCategory::VolatilityNoDirection => "volatility_no_direction",
            AlertCategory::Watch => "watch",
            AlertCategory::InsufficientData => "insufficient_data",
        }
    }

    /// Headline used in the alert message
    pub fn title(&self) -> (&'static str, &'static str) {
        match self {
            AlertCategory::StrongBuy => ("🚀", "STRONG BUY"),
            AlertCategory::LeanBuy => ("📈", "LEAN BUY"),
            AlertCategory::StrongSell => ("🔥", "STRONG SELL"),
            AlertCategory::LeanSell => ("📉", "LEAN SELL"),
            AlertCategory::NeutralHighConviction => ("⚠", "HEAVY FLOW, NEUTRAL CANDLE"),
            AlertCategory::ShortSqueeze => ("⚡", "SHORT SQUEEZE"),
            AlertCategory::LongSqueeze => ("⚡", "LONG SQUEEZE"),
            AlertCategory::LiquidationNoDirection => ("⚠", "LIQUIDATIONS, NO DIRECTION"),
            AlertCategory::Accumulation => ("🟢", "ACCUMULATION"),
            AlertCategory::Distribution => ("🔻", "DISTRIBUTION"),
            AlertCategory::VolatilityNoDirection => ("⚠", "VOLATILITY, NO DIRECTION"),
            AlertCategory::Watch => ("💤", "WATCH"),
            AlertCategory::InsufficientData => ("⏳", "INSUFFICIENT DATA"),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AlertCategory::StrongBuy => "Volume and open interest expanding, bullish engulfing confirmed by a green marker",
            AlertCategory::LeanBuy => "Volume and open interest expanding with a bullish engulfing candle",
            AlertCategory::StrongSell => "Open interest rising into a bearish engulfing candle confirmed by a red marker",
            AlertCategory::LeanSell => "Open interest rising into a bearish engulfing candle",
            AlertCategory::NeutralHighConviction => "Strong participation but the latest candle shows no direction",
            AlertCategory::ShortSqueeze => "Rising volume while open interest unwinds under a bullish candle",
            AlertCategory::LongSqueeze => "Rising volume while open interest unwinds under a bearish candle",
            AlertCategory::LiquidationNoDirection => "Positions are being closed without a directional candle",
            AlertCategory::Accumulation => "Volume up with flat open interest, leaning upwards",
            AlertCategory::Distribution => "Volume up with flat open interest, leaning downwards",
            AlertCategory::VolatilityNoDirection => "Volume up with flat open interest and no directional candle",
            AlertCategory::Watch => "Weak directional conviction, stand aside",
            AlertCategory::InsufficientData => "Not enough history to classify",
        }
    }
}

impl std::fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker color as far as the decision table cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerColor {
    Green,
    Red,
    Other,
    Absent,
}

impl MarkerColor {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_lowercase()) {
            None => MarkerColor::Absent,
            Some(l) if l == "green" => MarkerColor::Green,
            Some(l) if l == "red" => MarkerColor::Red,
            Some(_) => MarkerColor::Other,
        }
    }
}

/// Computed alert with the inputs that produced it
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub symbol: String,
    pub category: AlertCategory,
    pub volume_trend_pct: f64,
    pub oi_trend_pct: f64,
    pub pattern: CandlePattern,
    pub marker_color: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl SignalReport {
    /// Notification text: headline, trends, pattern and marker, description
    pub fn message(&self) -> String {
        let (emoji, title) = self.category.title();
        format!(
            "{} {} · {}\nVol {:+.1}% | OI {:+.2}%\nPattern: {} | Marker: {}\n{}",
            emoji,
            title,
            self.symbol,
            self.volume_trend_pct,
            self.oi_trend_pct,
            self.pattern,
            self.marker_color.as_deref().unwrap_or("none"),
            self.category.description(),
        )
    }
}

/// Outcome of evaluating the current windows
#[derive(Debug, Clone)]
pub enum Evaluation {
    InsufficientData {
        candle_rows: usize,
        oi_rows: usize,
        min_candles: usize,
        min_oi_samples: usize,
    },
    Ready(SignalReport),
}

impl Evaluation {
    pub fn category(&self) -> AlertCategory {
        match self {
            Evaluation::InsufficientData { .. } => AlertCategory::InsufficientData,
            Evaluation::Ready(report) => report.category,
        }
    }

    /// Diagnostic line for the insufficient-history case
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Evaluation::InsufficientData {
                candle_rows,
                oi_rows,
                min_candles,
                min_oi_samples,
            } => Some(format!(
                "[diagnostic] insufficient history, analysis skipped: candles {}/{}, oi {}/{}",
                candle_rows, min_candles, oi_rows, min_oi_samples
            )),
            Evaluation::Ready(_) => None,
        }
    }
}

/// Decision-table classifier
#[derive(Debug, Clone)]
pub struct SignalClassifier {
    config: AnalysisConfig,
}

impl SignalClassifier {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Pure, total decision table. First match wins.
    pub fn classify(
        &self,
        volume_trend_pct: f64,
        oi_trend_pct: f64,
        pattern: CandlePattern,
        marker_color: Option<&str>,
    ) -> AlertCategory {
        let color = MarkerColor::from_label(marker_color);

        if volume_trend_pct > 0.0 && oi_trend_pct > 0.0 {
            return match (pattern, color) {
                (CandlePattern::Bullish, MarkerColor::Green) => AlertCategory::StrongBuy,
                (CandlePattern::Bullish, _) => AlertCategory::LeanBuy,
                (CandlePattern::Bearish, MarkerColor::Red) => AlertCategory::StrongSell,
                (CandlePattern::Bearish, _) => AlertCategory::LeanSell,
                (CandlePattern::None, _) => AlertCategory::NeutralHighConviction,
            };
        }

        if volume_trend_pct > 0.0 && oi_trend_pct < 0.0 {
            return match pattern {
                CandlePattern::Bullish => AlertCategory::ShortSqueeze,
                CandlePattern::Bearish => AlertCategory::LongSqueeze,
                CandlePattern::None => AlertCategory::LiquidationNoDirection,
            };
        }

        if volume_trend_pct > 0.0 && oi_trend_pct.abs() <= self.config.flat_threshold_pct {
            return match pattern {
                CandlePattern::Bullish => AlertCategory::Accumulation,
                CandlePattern::Bearish => AlertCategory::Distribution,
                CandlePattern::None => AlertCategory::VolatilityNoDirection,
            };
        }

        AlertCategory::Watch
    }

    /// Evaluate newest-first windows, skipping when either is below its minimum
    pub fn evaluate(
        &self,
        symbol: &str,
        candles: &[Candle],
        oi_samples: &[OpenInterestSample],
        latest_marker: Option<&MarkerEvent>,
    ) -> Evaluation {
        if candles.len() < self.config.min_candles || oi_samples.len() < self.config.min_oi_samples
        {
            return Evaluation::InsufficientData {
                candle_rows: candles.len(),
                oi_rows: oi_samples.len(),
                min_candles: self.config.min_candles,
                min_oi_samples: self.config.min_oi_samples,
            };
        }

        let volume_trend_pct = volume_trend(candles, self.config.volume_window);
        let oi_trend_pct = open_interest_trend(
            oi_samples,
            self.config.oi_short_window,
            self.config.oi_long_window,
        );

        let pattern = match candles {
            [current, previous, ..] => detect_pattern(previous, current),
            _ => CandlePattern::None,
        };

        let marker_color = latest_marker.and_then(|m| m.color.clone());
        let category = self.classify(
            volume_trend_pct,
            oi_trend_pct,
            pattern,
            marker_color.as_deref(),
        );

        Evaluation::Ready(SignalReport {
            symbol: symbol.to_uppercase(),
            category,
            volume_trend_pct,
            oi_trend_pct,
            pattern,
            marker_color,
            generated_at: Utc::now(),
        })
    }
}

impl Default for SignalClassifier {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}
