//! Trend Statistics
//!
//! Rolling mean-based percentage deltas over observation windows.
//! All window inputs are newest-first, exactly as the store returns them:
//! index 0 is always the most recent observation.

use crate::types::{Candle, OpenInterestSample};

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// `(recent - baseline) / baseline * 100`, or `0` when the baseline is zero
pub fn percent_delta(recent: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (recent - baseline) / baseline * 100.0
}

/// Latest candle volume against the mean volume of the newest `window` candles
/// (the latest included).
pub fn volume_trend(candles: &[Candle], window: usize) -> f64 {
    let Some(latest) = candles.first() else {
        return 0.0;
    };

    let volumes: Vec<f64> = candles.iter().take(window).map(|c| c.volume).collect();
    let baseline = mean(&volumes).unwrap_or(0.0);

    percent_delta(latest.volume, baseline)
}

/// Mean of the newest `short_window` samples against the mean of the newest
/// `long_window` samples.
pub fn open_interest_trend(
    samples: &[OpenInterestSample],
    short_window: usize,
    long_window: usize,
) -> f64 {
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();

    let short = &values[..short_window.min(values.len())];
    let long = &values[..long_window.min(values.len())];

    match (mean(short), mean(long)) {
        (Some(recent), Some(baseline)) => percent_delta(recent, baseline),
        _ => 0.0,
    }
}
