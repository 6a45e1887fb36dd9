//! Signal algorithms
//!
//! Pure computations over newest-first observation windows:
//! trend statistics, candle pattern detection and the alert decision table.

pub mod classifier;
pub mod pattern;
pub mod trend;

pub use classifier::{AlertCategory, Evaluation, MarkerColor, SignalClassifier, SignalReport};
pub use pattern::{detect_pattern, CandlePattern};
pub use trend::{mean, open_interest_trend, percent_delta, volume_trend};
