//! Time-series metric storage.
//!
//! [`MetricsStore`] is the contract the engine consumes;
//! [`SqliteMetricsStore`] is an append-only SQLite implementation.

use crate::error::StoreResult;
use crate::models::MetricPoint;
use crate::store::{format_ts, parse_ts, SqliteHandle};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rusqlite::{params, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

const QUERY_LIMIT: i64 = 1000;

/// Historical samples keyed by `(device, metric)`.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Persist points; missing timestamps are set to now.
    async fn record_many(&self, points: &[MetricPoint]) -> Result<()>;

    /// Samples of the last `since_hours`, oldest first.
    async fn query(&self, device: &str, metric: &str, since_hours: u32) -> Result<Vec<MetricPoint>>;

    /// Most recent sample, if any.
    async fn latest(&self, device: &str, metric: &str) -> Result<Option<MetricPoint>>;

    /// Distinct metric names recorded for a device.
    async fn list_metrics(&self, device: &str) -> Result<Vec<String>>;
}

/// Append-only SQLite time-series store.
#[derive(Clone)]
pub struct SqliteMetricsStore {
    db: SqliteHandle,
}

impl SqliteMetricsStore {
    /// Open `<storage>/metrics.db` and drop rows older than `retention_days`.
    pub fn open(storage_path: &Path, retention_days: u32) -> StoreResult<Self> {
        let db = SqliteHandle::open(&storage_path.join("metrics.db"))?;
        Self::init(db, retention_days)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(SqliteHandle::open_in_memory()?, 30)
    }

    fn init(db: SqliteHandle, retention_days: u32) -> StoreResult<Self> {
        db.call_blocking(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS metrics (
                    id       INTEGER PRIMARY KEY AUTOINCREMENT,
                    device   TEXT NOT NULL,
                    category TEXT NOT NULL,
                    metric   TEXT NOT NULL,
                    value    REAL NOT NULL,
                    unit     TEXT NOT NULL DEFAULT '',
                    ts       TEXT NOT NULL,
                    tags     TEXT NOT NULL DEFAULT '{}'
                );
                CREATE INDEX IF NOT EXISTS idx_metrics_device_metric_ts
                    ON metrics (device, metric, ts);",
            )?;
            Ok(())
        })?;

        let store = Self { db };
        let deleted = store.cleanup_old(retention_days)?;
        if deleted > 0 {
            info!("Cleaned up {} old metric rows", deleted);
        }
        Ok(store)
    }

    fn cleanup_old(&self, retention_days: u32) -> StoreResult<usize> {
        let cutoff = format_ts(&(Utc::now() - Duration::days(i64::from(retention_days))));
        self.db
            .call_blocking(move |conn| Ok(conn.execute("DELETE FROM metrics WHERE ts < ?1", [cutoff])?))
    }

}

fn row_to_point(row: &Row<'_>) -> rusqlite::Result<(MetricPoint, String, String)> {
    let point = MetricPoint {
        device: row.get(0)?,
        category: row.get(1)?,
        metric: row.get(2)?,
        value: row.get(3)?,
        unit: row.get(4)?,
        ts: None,
        tags: HashMap::new(),
    };
    Ok((point, row.get(5)?, row.get(6)?))
}

fn finish_point((mut point, ts, tags): (MetricPoint, String, String)) -> StoreResult<MetricPoint> {
    point.ts = Some(parse_ts(&ts)?);
    if !tags.is_empty() {
        point.tags = serde_json::from_str(&tags)?;
    }
    Ok(point)
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn record_many(&self, points: &[MetricPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let rows = points
            .iter()
            .map(|p| -> StoreResult<_> {
                Ok((
                    p.clone(),
                    format_ts(&p.ts.unwrap_or(now)),
                    serde_json::to_string(&p.tags)?,
                ))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        self.db
            .call(move |conn| {
                let tx = conn.unchecked_transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO metrics (device, category, metric, value, unit, ts, tags)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for (p, ts, tags) in &rows {
                        stmt.execute(params![p.device, p.category, p.metric, p.value, p.unit, ts, tags])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn query(&self, device: &str, metric: &str, since_hours: u32) -> Result<Vec<MetricPoint>> {
        let since = format_ts(&(Utc::now() - Duration::hours(i64::from(since_hours))));
        let (device, metric) = (device.to_string(), metric.to_string());

        let points = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT device, category, metric, value, unit, ts, tags
                     FROM metrics WHERE device = ?1 AND metric = ?2 AND ts >= ?3
                     ORDER BY ts ASC LIMIT ?4",
                )?;
                let rows = stmt.query_map(params![device, metric, since, QUERY_LIMIT], row_to_point)?;
                let points = rows
                    .map(|r| finish_point(r?))
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok(points)
            })
            .await?;
        Ok(points)
    }

    async fn latest(&self, device: &str, metric: &str) -> Result<Option<MetricPoint>> {
        let (device, metric) = (device.to_string(), metric.to_string());

        let point = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT device, category, metric, value, unit, ts, tags
                     FROM metrics WHERE device = ?1 AND metric = ?2
                     ORDER BY ts DESC LIMIT 1",
                )?;
                let mut rows = stmt.query_map(params![device, metric], row_to_point)?;
                let point = rows.next().map(|r| finish_point(r?)).transpose()?;
                Ok(point)
            })
            .await?;
        Ok(point)
    }

    async fn list_metrics(&self, device: &str) -> Result<Vec<String>> {
        let device = device.to_string();

        let names = self
            .db
            .call(move |conn| {
                let mut stmt = conn
                    .prepare_cached("SELECT DISTINCT metric FROM metrics WHERE device = ?1 ORDER BY metric")?;
                let rows = stmt.query_map([device], |row| row.get::<_, String>(0))?;
                let names = rows.collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(names)
            })
            .await?;
        Ok(names)
    }
}
