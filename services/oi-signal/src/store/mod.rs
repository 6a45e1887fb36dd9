//! Observation store adapters and typed window reads

pub mod memory;
pub mod postgres;

#[cfg(test)]
pub(crate) mod failing;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::types::{
    Candle, LogKind, MarkerEvent, Observation, ObservationStore, OpenInterestSample, Result,
};

/// Newest-first candle window
pub async fn recent_candles(store: &dyn ObservationStore, limit: usize) -> Result<Vec<Candle>> {
    let rows = store.query_recent(LogKind::Candle, limit).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match row.observation {
            Observation::Candle(c) => Some(c),
            _ => None,
        })
        .collect())
}

/// Newest-first open interest window
pub async fn recent_open_interest(
    store: &dyn ObservationStore,
    limit: usize,
) -> Result<Vec<OpenInterestSample>> {
    let rows = store.query_recent(LogKind::OpenInterest, limit).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match row.observation {
            Observation::OpenInterest(s) => Some(s),
            _ => None,
        })
        .collect())
}

/// Most recent marker, if any
pub async fn latest_marker(store: &dyn ObservationStore) -> Result<Option<MarkerEvent>> {
    let rows = store.query_recent(LogKind::Marker, 1).await?;
    Ok(rows.into_iter().find_map(|row| match row.observation {
        Observation::Marker(m) => Some(m),
        _ => None,
    }))
}
