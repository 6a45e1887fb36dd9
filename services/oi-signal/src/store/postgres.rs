//! Postgres-backed observation logs
//!
//! One table per log kind, each ordered by a `BIGSERIAL` id.
//! Schema lives in `migrations/`.

use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use std::time::Duration;

use crate::types::*;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with a bounded pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SignalError::Store(e.to_string()))
    }

    fn candle_from_row(row: &PgRow) -> std::result::Result<Candle, sqlx::Error> {
        Ok(Candle {
            timestamp: row.try_get("recorded_at")?,
            symbol: row.try_get("symbol")?,
            open: row.try_get("open")?,
            high: row.try_get("high")?,
            low: row.try_get("low")?,
            close: row.try_get("close")?,
            volume: row.try_get("volume")?,
            time: row.try_get("bar_time")?,
        })
    }

    fn sample_from_row(row: &PgRow) -> std::result::Result<OpenInterestSample, sqlx::Error> {
        Ok(OpenInterestSample {
            timestamp: row.try_get("recorded_at")?,
            symbol: row.try_get("symbol")?,
            value: row.try_get("open_interest")?,
        })
    }

    fn marker_from_row(row: &PgRow) -> std::result::Result<MarkerEvent, sqlx::Error> {
        Ok(MarkerEvent {
            timestamp: row.try_get("recorded_at")?,
            symbol: row.try_get("symbol")?,
            signal: row.try_get("signal")?,
            color: row.try_get("color")?,
            time: row.try_get("bar_time")?,
        })
    }
}

#[async_trait::async_trait]
impl ObservationStore for PgStore {
    async fn insert(&self, observation: Observation) -> Result<i64> {
        let id = match observation {
            Observation::Candle(c) => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO candle_logs (recorded_at, symbol, open, high, low, close, volume, bar_time)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     RETURNING id",
                )
                .bind(c.timestamp)
                .bind(&c.symbol)
                .bind(c.open)
                .bind(c.high)
                .bind(c.low)
                .bind(c.close)
                .bind(c.volume)
                .bind(&c.time)
                .fetch_one(&self.pool)
                .await?
            }
            Observation::OpenInterest(s) => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO oi_logs (recorded_at, symbol, open_interest)
                     VALUES ($1, $2, $3)
                     RETURNING id",
                )
                .bind(s.timestamp)
                .bind(&s.symbol)
                .bind(s.value)
                .fetch_one(&self.pool)
                .await?
            }
            Observation::Marker(m) => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO marker_logs (recorded_at, symbol, signal, color, bar_time)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING id",
                )
                .bind(m.timestamp)
                .bind(&m.symbol)
                .bind(&m.signal)
                .bind(&m.color)
                .bind(&m.time)
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(id)
    }

    async fn query_recent(&self, kind: LogKind, limit: usize) -> Result<Vec<StoredObservation>> {
        let sql = format!("SELECT * FROM {} ORDER BY id DESC LIMIT $1", kind.table());
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> std::result::Result<StoredObservation, sqlx::Error> {
                let observation = match kind {
                    LogKind::Candle => Observation::Candle(Self::candle_from_row(row)?),
                    LogKind::OpenInterest => Observation::OpenInterest(Self::sample_from_row(row)?),
                    LogKind::Marker => Observation::Marker(Self::marker_from_row(row)?),
                };
                Ok(StoredObservation {
                    id: row.try_get("id")?,
                    observation,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(SignalError::from)
    }

    async fn row_ids(&self, kind: LogKind) -> Result<Vec<i64>> {
        let sql = format!("SELECT id FROM {} ORDER BY id DESC", kind.table());
        let ids = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn delete_by_ids(&self, kind: LogKind, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", kind.table());
        let result = sqlx::query(&sql).bind(ids).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
