//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods through `MetricsSnapshotStore`; it
//! never executes SQL directly.

use crate::{
    breakdown::{CohortBaseline, CohortMetrics},
    error::MetricsResult,
    event::EventLogEntry,
    period::Period,
    snapshot::RevenueMetricSnapshot,
    types::CohortKey,
};
use chrono::NaiveDate;
use rusqlite::{params, types::Type, Connection};
use std::collections::BTreeMap;

mod cohort;
mod snapshot;

/// Persistence seam for computed metrics.
///
/// Upserts keyed by `(date, period)` replace the stored record entirely.
pub trait MetricsSnapshotStore {
    fn upsert_snapshot(&self, snapshot: &RevenueMetricSnapshot) -> MetricsResult<()>;

    fn snapshot(&self, date: NaiveDate, period: Period) -> MetricsResult<Option<RevenueMetricSnapshot>>;

    /// The most recent `limit` snapshots for `period`, oldest first.
    fn snapshot_history(&self, period: Period, limit: usize) -> MetricsResult<Vec<RevenueMetricSnapshot>>;

    fn snapshot_count(&self) -> MetricsResult<i64>;

    /// Monthly snapshots dated on the last day of their month, most
    /// recent `limit`, oldest first.
    fn month_end_history(&self, limit: usize) -> MetricsResult<Vec<RevenueMetricSnapshot>>;

    /// Stored cohort baselines for one period granularity.
    fn cohort_baselines(&self, period: Period) -> MetricsResult<BTreeMap<CohortKey, CohortBaseline>>;

    /// Insert unseen cohorts with their baseline; refresh live figures
    /// of known ones without touching the baseline. Scoped to `period`.
    fn upsert_cohorts(&self, period: Period, cohorts: &BTreeMap<CohortKey, CohortMetrics>) -> MetricsResult<()>;

    fn append_event(&self, entry: &EventLogEntry) -> MetricsResult<()>;

    /// Persist one full computation. Implementations should make this
    /// all-or-nothing.
    fn commit_computation(
        &self,
        snapshot: &RevenueMetricSnapshot,
        cohorts: &BTreeMap<CohortKey, CohortMetrics>,
        events: &[EventLogEntry],
    ) -> MetricsResult<()> {
        self.upsert_snapshot(snapshot)?;
        self.upsert_cohorts(snapshot.period, cohorts)?;
        for entry in events {
            self.append_event(entry)?;
        }
        Ok(())
    }
}

pub struct MetricsStore {
    conn: Connection,
}

impl MetricsStore {
    pub fn open(path: &str) -> MetricsResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> MetricsResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> MetricsResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_metrics.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn event_count(&self) -> MetricsResult<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn events_of_type(&self, event_type: &str) -> MetricsResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, computation_id, event_type, payload
             FROM event_log WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    computation_id: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn insert_event(conn: &Connection, entry: &EventLogEntry) -> MetricsResult<()> {
        conn.execute(
            "INSERT INTO event_log (computation_id, event_type, payload)
             VALUES (?1, ?2, ?3)",
            params![entry.computation_id, entry.event_type, entry.payload],
        )?;
        Ok(())
    }
}

impl MetricsSnapshotStore for MetricsStore {
    fn upsert_snapshot(&self, snapshot: &RevenueMetricSnapshot) -> MetricsResult<()> {
        Self::write_snapshot(&self.conn, snapshot)
    }

    fn snapshot(&self, date: NaiveDate, period: Period) -> MetricsResult<Option<RevenueMetricSnapshot>> {
        self.read_snapshot(date, period)
    }

    fn snapshot_history(&self, period: Period, limit: usize) -> MetricsResult<Vec<RevenueMetricSnapshot>> {
        self.read_history(period, limit)
    }

    fn snapshot_count(&self) -> MetricsResult<i64> {
        self.count_snapshots()
    }

    fn month_end_history(&self, limit: usize) -> MetricsResult<Vec<RevenueMetricSnapshot>> {
        self.read_month_end_history(limit)
    }

    fn cohort_baselines(&self, period: Period) -> MetricsResult<BTreeMap<CohortKey, CohortBaseline>> {
        self.read_cohort_baselines(period)
    }

    fn upsert_cohorts(&self, period: Period, cohorts: &BTreeMap<CohortKey, CohortMetrics>) -> MetricsResult<()> {
        Self::write_cohorts(&self.conn, period, cohorts)
    }

    fn append_event(&self, entry: &EventLogEntry) -> MetricsResult<()> {
        Self::insert_event(&self.conn, entry)
    }

    fn commit_computation(
        &self,
        snapshot: &RevenueMetricSnapshot,
        cohorts: &BTreeMap<CohortKey, CohortMetrics>,
        events: &[EventLogEntry],
    ) -> MetricsResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        Self::write_snapshot(&tx, snapshot)?;
        Self::write_cohorts(&tx, snapshot.period, cohorts)?;
        for entry in events {
            Self::insert_event(&tx, entry)?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Parse a `YYYY-MM-DD` column, reporting failures as a conversion error.
fn date_column(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    raw.parse::<NaiveDate>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a JSON text column inside a row mapper.
fn json_column<T: serde::de::DeserializeOwned>(idx: usize, raw: String) -> rusqlite::Result<T> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
