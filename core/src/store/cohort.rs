use super::{date_column, MetricsStore};
use crate::{
    breakdown::{CohortBaseline, CohortMetrics},
    error::MetricsResult,
    period::Period,
    types::CohortKey,
};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;

impl MetricsStore {
    // ── Cohort baselines ───────────────────────────────────────

    pub(super) fn read_cohort_baselines(
        &self,
        period: Period,
    ) -> MetricsResult<BTreeMap<CohortKey, CohortBaseline>> {
        let mut stmt = self.conn.prepare(
            "SELECT cohort_key, cohort_date, initial_customers, initial_mrr_cents
             FROM cohort_baseline WHERE period = ?1 ORDER BY cohort_key ASC",
        )?;
        let rows = stmt
            .query_map(params![period.as_str()], |row| {
                Ok(CohortBaseline {
                    cohort_key:        row.get(0)?,
                    cohort_date:       date_column(1, row.get(1)?)?,
                    initial_customers: row.get::<_, i64>(2)? as u64,
                    initial_mrr:       row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(|b| (b.cohort_key.clone(), b)).collect())
    }

    /// Baseline columns are only written by the INSERT arm.
    pub(super) fn write_cohorts(
        conn: &Connection,
        period: Period,
        cohorts: &BTreeMap<CohortKey, CohortMetrics>,
    ) -> MetricsResult<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO cohort_baseline (
                cohort_key, period, cohort_date, initial_customers, initial_mrr_cents,
                current_customers, current_mrr_cents, retention_rate, revenue_retention
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(cohort_key, period) DO UPDATE SET
                current_customers = excluded.current_customers,
                current_mrr_cents = excluded.current_mrr_cents,
                retention_rate    = excluded.retention_rate,
                revenue_retention = excluded.revenue_retention",
        )?;
        for c in cohorts.values() {
            stmt.execute(params![
                c.cohort_key,
                period.as_str(),
                c.cohort_date.to_string(),
                c.initial_customers as i64,
                c.initial_mrr,
                c.current_customers as i64,
                c.current_mrr,
                c.retention_rate,
                c.revenue_retention,
            ])?;
        }
        Ok(())
    }

    pub fn cohort_count(&self) -> MetricsResult<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM cohort_baseline", [], |row| row.get(0))?;
        Ok(n)
    }
}
