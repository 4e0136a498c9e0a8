//! Store tests: upsert semantics, history ordering, cohort baselines.

use chrono::NaiveDate;
use revmetrics_core::{
    breakdown::CohortMetrics,
    event::{EventLogEntry, MetricsEvent},
    period::Period,
    pricing::PlanTier,
    snapshot::{BreakdownEntry, RevenueMetricSnapshot},
    store::{MetricsSnapshotStore, MetricsStore},
};
use std::collections::BTreeMap;

fn store() -> MetricsStore {
    let store = MetricsStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn snapshot(day: NaiveDate, period: Period, mrr: f64) -> RevenueMetricSnapshot {
    let mut by_plan = BTreeMap::new();
    by_plan.insert(
        PlanTier::Professional,
        BreakdownEntry {
            count:      1,
            mrr,
            percentage: 100.0,
        },
    );
    RevenueMetricSnapshot {
        date: day,
        period,
        period_start: day,
        mrr,
        arr: mrr * 12.0,
        new_mrr: mrr,
        expansion_mrr: 0.0,
        contraction_mrr: 0.0,
        churn_mrr: 0.0,
        net_new_mrr: mrr,
        total_customers: 1,
        new_customers: 1,
        churned_customers: 0,
        arpu: mrr,
        ltv: mrr * 24.0,
        by_plan,
        by_region: BTreeMap::new(),
        by_cohort: BTreeMap::new(),
    }
}

fn cohort(key: &str, initial: u64, current: u64) -> CohortMetrics {
    CohortMetrics {
        cohort_key:        key.into(),
        cohort_date:       format!("{key}-01").parse().unwrap(),
        initial_customers: initial,
        current_customers: current,
        initial_mrr:       initial as i64 * 9_900,
        current_mrr:       current as i64 * 9_900,
        retention_rate:    current as f64 / initial as f64 * 100.0,
        revenue_retention: current as f64 / initial as f64 * 100.0,
    }
}

#[test]
fn upsert_replaces_same_key() {
    let store = store();
    store.upsert_snapshot(&snapshot(date(2024, 1, 31), Period::Monthly, 99.0)).unwrap();
    store.upsert_snapshot(&snapshot(date(2024, 1, 31), Period::Monthly, 198.0)).unwrap();

    assert_eq!(store.snapshot_count().unwrap(), 1);
    let stored = store.snapshot(date(2024, 1, 31), Period::Monthly).unwrap().unwrap();
    assert_eq!(stored, snapshot(date(2024, 1, 31), Period::Monthly, 198.0));
}

#[test]
fn same_date_different_period_are_distinct_keys() {
    let store = store();
    store.upsert_snapshot(&snapshot(date(2024, 3, 31), Period::Monthly, 10.0)).unwrap();
    store.upsert_snapshot(&snapshot(date(2024, 3, 31), Period::Quarterly, 20.0)).unwrap();

    assert_eq!(store.snapshot_count().unwrap(), 2);
    assert_eq!(
        store.snapshot(date(2024, 3, 31), Period::Quarterly).unwrap().unwrap().mrr,
        20.0
    );
    assert!(store.snapshot(date(2024, 3, 31), Period::Weekly).unwrap().is_none());
}

#[test]
fn history_is_most_recent_window_oldest_first() {
    let store = store();
    for (m, mrr) in [(1, 10.0), (2, 20.0), (3, 30.0), (4, 40.0)] {
        store.upsert_snapshot(&snapshot(date(2024, m, 28), Period::Monthly, mrr)).unwrap();
    }
    store.upsert_snapshot(&snapshot(date(2024, 4, 28), Period::Daily, 99.0)).unwrap();

    let history = store.snapshot_history(Period::Monthly, 3).unwrap();
    let mrr: Vec<f64> = history.iter().map(|s| s.mrr).collect();
    assert_eq!(mrr, vec![20.0, 30.0, 40.0]);
}

#[test]
fn cohort_baseline_written_once() {
    let store = store();
    let mut cohorts = BTreeMap::new();
    cohorts.insert("2024-01".to_string(), cohort("2024-01", 4, 4));
    store.upsert_cohorts(Period::Monthly, &cohorts).unwrap();

    // A later run that (wrongly) carries different initial values must not
    // move the baseline.
    cohorts.insert("2024-01".to_string(), cohort("2024-01", 3, 3));
    cohorts.insert("2024-02".to_string(), cohort("2024-02", 2, 2));
    store.upsert_cohorts(Period::Monthly, &cohorts).unwrap();

    let baselines = store.cohort_baselines(Period::Monthly).unwrap();
    assert_eq!(store.cohort_count().unwrap(), 2);
    assert_eq!(baselines["2024-01"].initial_customers, 4);
    assert_eq!(baselines["2024-01"].initial_mrr, 39_600);
    assert_eq!(baselines["2024-01"].cohort_date, date(2024, 1, 1));
    assert_eq!(baselines["2024-02"].initial_customers, 2);
}

#[test]
fn commit_computation_writes_snapshot_cohorts_and_events() {
    let store = store();
    let snap = snapshot(date(2024, 1, 31), Period::Monthly, 99.0);
    let mut cohorts = BTreeMap::new();
    cohorts.insert("2024-01".to_string(), cohort("2024-01", 1, 1));
    let event = MetricsEvent::SnapshotComputed {
        date:            snap.date,
        period:          snap.period,
        mrr:             snap.mrr,
        net_new_mrr:     snap.net_new_mrr,
        total_customers: snap.total_customers,
    };
    let entry = EventLogEntry {
        id:             None,
        computation_id: "c-1".into(),
        event_type:     event.type_name().into(),
        payload:        serde_json::to_string(&event).unwrap(),
    };

    store.commit_computation(&snap, &cohorts, &[entry]).unwrap();

    assert_eq!(store.snapshot_count().unwrap(), 1);
    assert_eq!(store.cohort_count().unwrap(), 1);
    assert_eq!(store.event_count().unwrap(), 1);
    let logged = store.events_of_type("snapshot_computed").unwrap();
    assert_eq!(logged[0].computation_id, "c-1");
    let decoded: MetricsEvent = serde_json::from_str(&logged[0].payload).unwrap();
    assert_eq!(decoded, event);
}

#[test]
fn cohort_baselines_are_scoped_by_period() {
    let store = store();
    let mut daily = BTreeMap::new();
    daily.insert("2024-01".to_string(), cohort("2024-01", 1, 1));
    store.upsert_cohorts(Period::Daily, &daily).unwrap();
    let mut monthly = BTreeMap::new();
    monthly.insert("2024-01".to_string(), cohort("2024-01", 5, 5));
    store.upsert_cohorts(Period::Monthly, &monthly).unwrap();

    assert_eq!(store.cohort_count().unwrap(), 2);
    assert_eq!(store.cohort_baselines(Period::Daily).unwrap()["2024-01"].initial_customers, 1);
    assert_eq!(store.cohort_baselines(Period::Monthly).unwrap()["2024-01"].initial_customers, 5);
    assert!(store.cohort_baselines(Period::Weekly).unwrap().is_empty());
}

#[test]
fn month_end_history_skips_mid_month_keys() {
    let store = store();
    store.upsert_snapshot(&snapshot(date(2024, 1, 31), Period::Monthly, 10.0)).unwrap();
    store.upsert_snapshot(&snapshot(date(2024, 2, 15), Period::Monthly, 15.0)).unwrap();
    store.upsert_snapshot(&snapshot(date(2024, 2, 29), Period::Monthly, 20.0)).unwrap();
    store.upsert_snapshot(&snapshot(date(2024, 3, 31), Period::Quarterly, 30.0)).unwrap();

    let mrr: Vec<f64> = store.month_end_history(12).unwrap().iter().map(|s| s.mrr).collect();
    assert_eq!(mrr, vec![10.0, 20.0]);
    assert_eq!(store.month_end_history(1).unwrap()[0].mrr, 20.0);
}
