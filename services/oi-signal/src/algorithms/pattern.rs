//! Pattern Detector - size-doubling engulfing heuristic

use crate::types::Candle;
use serde::{Deserialize, Serialize};

/// Directional relationship between two consecutive candles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandlePattern {
    Bullish,
    Bearish,
    None,
}

impl CandlePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandlePattern::Bullish => "Bullish engulfing",
            CandlePattern::Bearish => "Bearish engulfing",
            CandlePattern::None => "none",
        }
    }
}

impl std::fmt::Display for CandlePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `current` against `previous`.
///
/// The current body must be at least twice the previous body; direction then
/// follows the current candle (close above open is bullish, anything else bearish).
pub fn detect_pattern(previous: &Candle, current: &Candle) -> CandlePattern {
    if current.body() >= 2.0 * previous.body() {
        if current.is_bullish() {
            CandlePattern::Bullish
        } else {
            CandlePattern::Bearish
        }
    } else {
        CandlePattern::None
    }
}
