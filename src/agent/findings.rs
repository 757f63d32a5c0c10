//! Findings lifecycle: deduplication, resolution and persistence.
//!
//! A finding's id is derived from `(device, category, title)`, so a
//! re-detected issue updates the existing record instead of creating a
//! duplicate. Findings that a later cycle no longer reports are marked
//! resolved and leave the in-memory active set; the SQLite table keeps
//! the full history.

use crate::error::{StoreError, StoreResult};
use crate::models::{Finding, Severity};
use crate::store::{format_ts, parse_ts, SqliteHandle};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Deterministic id for the dedup key `(device, category, title)`.
pub fn finding_id(device: &str, category: &str, title: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}:{}", device, category, title).as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(16);
    id
}

/// Active findings in memory, every finding on disk.
pub struct FindingsTracker {
    db: SqliteHandle,
    active: HashMap<String, Finding>,
}

impl FindingsTracker {
    /// Open `<storage>/findings.db` and load unresolved findings.
    pub fn open(storage_path: &Path) -> StoreResult<Self> {
        Self::init(SqliteHandle::open(&storage_path.join("findings.db"))?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(SqliteHandle::open_in_memory()?)
    }

    fn init(db: SqliteHandle) -> StoreResult<Self> {
        let active = db.call_blocking(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS findings (
                    id TEXT PRIMARY KEY,
                    device TEXT NOT NULL,
                    severity TEXT NOT NULL,
                    category TEXT NOT NULL,
                    title TEXT NOT NULL,
                    detail TEXT,
                    recommendation TEXT,
                    first_seen TEXT NOT NULL,
                    last_seen TEXT NOT NULL,
                    resolved INTEGER DEFAULT 0,
                    raw_data TEXT
                );",
            )?;
            load_findings(conn, "SELECT * FROM findings WHERE resolved = 0", Vec::new())
        })?;

        let active: HashMap<String, Finding> = active.into_iter().map(|f| (f.id.clone(), f)).collect();
        info!("Loaded {} active findings", active.len());
        Ok(Self { db, active })
    }

    /// Insert a new finding or refresh an existing one. Returns `(finding, is_new)`.
    pub async fn add_or_update(
        &mut self,
        device: &str,
        severity: Severity,
        category: &str,
        title: &str,
        detail: &str,
        recommendation: &str,
    ) -> StoreResult<(Finding, bool)> {
        let id = finding_id(device, category, title);
        let now = Utc::now();

        if let Some(existing) = self.active.get_mut(&id) {
            existing.severity = severity;
            existing.detail = detail.to_string();
            existing.recommendation = recommendation.to_string();
            existing.last_seen = now;
            let snapshot = existing.clone();
            self.persist(&snapshot).await?;
            debug!("Updated finding {} on {}: {}", id, device, title);
            return Ok((snapshot, false));
        }

        let finding = Finding {
            id: id.clone(),
            device: device.to_string(),
            severity,
            category: category.to_string(),
            title: title.to_string(),
            detail: detail.to_string(),
            recommendation: recommendation.to_string(),
            first_seen: now,
            last_seen: now,
            resolved: false,
            raw_data: Value::Object(Default::default()),
        };
        self.persist(&finding).await?;
        self.active.insert(id, finding.clone());
        debug!("New finding on {}: {}", device, title);
        Ok((finding, true))
    }

    /// Resolve active findings of `(device, category)` whose titles were not reported.
    pub async fn resolve_missing(
        &mut self,
        device: &str,
        category: &str,
        current_titles: &HashSet<String>,
    ) -> StoreResult<Vec<Finding>> {
        let mut stale: Vec<String> = self
            .active
            .values()
            .filter(|f| f.device == device && f.category == category && !current_titles.contains(&f.title))
            .map(|f| f.id.clone())
            .collect();
        stale.sort();

        let mut resolved = Vec::with_capacity(stale.len());
        for id in stale {
            let Some(mut finding) = self.active.get(&id).cloned() else {
                continue;
            };
            finding.resolved = true;
            finding.last_seen = Utc::now();
            self.persist(&finding).await?;
            self.active.remove(&id);
            info!("Resolved finding on {}: {}", device, finding.title);
            resolved.push(finding);
        }
        Ok(resolved)
    }

    /// Filtered active findings, most severe first, then oldest `last_seen`.
    pub fn get_active(
        &self,
        device: Option<&str>,
        severity: Option<Severity>,
        category: Option<&str>,
    ) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self
            .active
            .values()
            .filter(|f| device.map_or(true, |d| f.device == d))
            .filter(|f| severity.map_or(true, |s| f.severity == s))
            .filter(|f| category.map_or(true, |c| f.category == c))
            .cloned()
            .collect();
        findings.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then(a.last_seen.cmp(&b.last_seen))
        });
        findings
    }

    /// Findings from the durable store, newest first.
    pub async fn get_history(
        &self,
        device: Option<&str>,
        include_resolved: bool,
        limit: usize,
    ) -> StoreResult<Vec<Finding>> {
        let mut sql = String::from("SELECT * FROM findings");
        let mut conditions = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(device) = device {
            conditions.push("device = ?");
            args.push(device.to_string());
        }
        if !include_resolved {
            conditions.push("resolved = 0");
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY last_seen DESC LIMIT {}", limit));

        self.db.call(move |conn| load_findings(conn, &sql, args)).await
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn critical_count(&self) -> usize {
        self.active
            .values()
            .filter(|f| f.severity == Severity::Critical)
            .count()
    }

    async fn persist(&self, finding: &Finding) -> StoreResult<()> {
        let f = finding.clone();
        let raw = serde_json::to_string(&f.raw_data)?;
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO findings
                     (id, device, severity, category, title, detail, recommendation,
                      first_seen, last_seen, resolved, raw_data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        f.id,
                        f.device,
                        f.severity.as_str(),
                        f.category,
                        f.title,
                        f.detail,
                        f.recommendation,
                        format_ts(&f.first_seen),
                        format_ts(&f.last_seen),
                        f.resolved as i64,
                        raw,
                    ],
                )?;
                Ok(())
            })
            .await
    }
}

type FindingRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    i64,
    Option<String>,
);

fn read_row(row: &Row<'_>) -> rusqlite::Result<FindingRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn row_to_finding(row: FindingRow) -> StoreResult<Finding> {
    let (id, device, severity, category, title, detail, recommendation, first_seen, last_seen, resolved, raw) =
        row;
    let severity = severity
        .parse::<Severity>()
        .map_err(StoreError::InvalidData)?;
    let raw_data = match raw.as_deref() {
        Some(text) if !text.is_empty() => serde_json::from_str(text)?,
        _ => Value::Object(Default::default()),
    };

    Ok(Finding {
        id,
        device,
        severity,
        category,
        title,
        detail: detail.unwrap_or_default(),
        recommendation: recommendation.unwrap_or_default(),
        first_seen: parse_ts(&first_seen)?,
        last_seen: parse_ts(&last_seen)?,
        resolved: resolved != 0,
        raw_data,
    })
}

fn load_findings(conn: &Connection, sql: &str, args: Vec<String>) -> StoreResult<Vec<Finding>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), read_row)?;
    let findings = rows
        .map(|r| row_to_finding(r?))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(findings)
}
