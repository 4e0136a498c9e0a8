use super::{date_column, json_column, MetricsStore};
use crate::{error::MetricsResult, period::Period, snapshot::RevenueMetricSnapshot};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

const SNAPSHOT_COLUMNS: &str = "snapshot_date, period, period_start,
    mrr, arr, new_mrr, expansion_mrr, contraction_mrr, churn_mrr, net_new_mrr,
    total_customers, new_customers, churned_customers, arpu, ltv,
    by_plan, by_region, by_cohort";

impl MetricsStore {
    // ── Metric snapshots ───────────────────────────────────────

    /// Full replace on conflict: a recomputed key never accumulates.
    pub(super) fn write_snapshot(conn: &Connection, s: &RevenueMetricSnapshot) -> MetricsResult<()> {
        let by_plan = serde_json::to_string(&s.by_plan)?;
        let by_region = serde_json::to_string(&s.by_region)?;
        let by_cohort = serde_json::to_string(&s.by_cohort)?;

        conn.execute(
            "INSERT INTO metric_snapshot (
                snapshot_date, period, period_start,
                mrr, arr, new_mrr, expansion_mrr, contraction_mrr, churn_mrr, net_new_mrr,
                total_customers, new_customers, churned_customers, arpu, ltv,
                by_plan, by_region, by_cohort
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
            ON CONFLICT(snapshot_date, period) DO UPDATE SET
                period_start      = excluded.period_start,
                mrr               = excluded.mrr,
                arr               = excluded.arr,
                new_mrr           = excluded.new_mrr,
                expansion_mrr     = excluded.expansion_mrr,
                contraction_mrr   = excluded.contraction_mrr,
                churn_mrr         = excluded.churn_mrr,
                net_new_mrr       = excluded.net_new_mrr,
                total_customers   = excluded.total_customers,
                new_customers     = excluded.new_customers,
                churned_customers = excluded.churned_customers,
                arpu              = excluded.arpu,
                ltv               = excluded.ltv,
                by_plan           = excluded.by_plan,
                by_region         = excluded.by_region,
                by_cohort         = excluded.by_cohort",
            params![
                s.date.to_string(),
                s.period.as_str(),
                s.period_start.to_string(),
                s.mrr,
                s.arr,
                s.new_mrr,
                s.expansion_mrr,
                s.contraction_mrr,
                s.churn_mrr,
                s.net_new_mrr,
                s.total_customers as i64,
                s.new_customers as i64,
                s.churned_customers as i64,
                s.arpu,
                s.ltv,
                by_plan,
                by_region,
                by_cohort,
            ],
        )?;
        Ok(())
    }

    pub(super) fn read_snapshot(
        &self,
        date: NaiveDate,
        period: Period,
    ) -> MetricsResult<Option<RevenueMetricSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshot
             WHERE snapshot_date = ?1 AND period = ?2"
        );
        let snapshot = self
            .conn
            .query_row(&sql, params![date.to_string(), period.as_str()], map_snapshot)
            .optional()?;
        Ok(snapshot)
    }

    pub(super) fn read_history(
        &self,
        period: Period,
        limit: usize,
    ) -> MetricsResult<Vec<RevenueMetricSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshot
             WHERE period = ?1
             ORDER BY snapshot_date DESC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut snapshots = stmt
            .query_map(params![period.as_str(), limit as i64], map_snapshot)?
            .collect::<Result<Vec<_>, _>>()?;
        snapshots.reverse();
        Ok(snapshots)
    }

    /// Like `read_history(Monthly, ..)`, restricted to rows dated on the
    /// last day of their month.
    pub(super) fn read_month_end_history(&self, limit: usize) -> MetricsResult<Vec<RevenueMetricSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshot
             WHERE period = ?1 AND strftime('%d', snapshot_date, '+1 day') = '01'
             ORDER BY snapshot_date DESC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut snapshots = stmt
            .query_map(params![Period::Monthly.as_str(), limit as i64], map_snapshot)?
            .collect::<Result<Vec<_>, _>>()?;
        snapshots.reverse();
        Ok(snapshots)
    }

    pub(super) fn count_snapshots(&self) -> MetricsResult<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM metric_snapshot", [], |row| row.get(0))?;
        Ok(n)
    }
}

fn map_snapshot(row: &Row<'_>) -> rusqlite::Result<RevenueMetricSnapshot> {
    Ok(RevenueMetricSnapshot {
        date:              date_column(0, row.get(0)?)?,
        period:            Period::parse_lenient(&row.get::<_, String>(1)?),
        period_start:      date_column(2, row.get(2)?)?,
        mrr:               row.get(3)?,
        arr:               row.get(4)?,
        new_mrr:           row.get(5)?,
        expansion_mrr:     row.get(6)?,
        contraction_mrr:   row.get(7)?,
        churn_mrr:         row.get(8)?,
        net_new_mrr:       row.get(9)?,
        total_customers:   row.get::<_, i64>(10)? as u64,
        new_customers:     row.get::<_, i64>(11)? as u64,
        churned_customers: row.get::<_, i64>(12)? as u64,
        arpu:              row.get(13)?,
        ltv:               row.get(14)?,
        by_plan:           json_column(15, row.get(15)?)?,
        by_region:         json_column(16, row.get(16)?)?,
        by_cohort:         json_column(17, row.get(17)?)?,
    })
}
