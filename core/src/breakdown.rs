//! Breakdown aggregation: plan, region and signup-cohort views of the
//! current customer base.
//!
//! Grouping happens first, normalization second: percentages are only
//! computed once every group total is known. A zero parent total gives
//! zero percentages, never NaN.

use crate::{
    entity::BillableEntity,
    mrr::PlanBucket,
    period::month_label,
    pricing::PricingTable,
    types::{Cents, CohortKey, UNKNOWN_REGION},
};
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShareBucket {
    pub customer_count: u64,
    pub mrr:            Cents,
    pub percentage:     f64,
}

/// What the store remembers about a cohort the first time it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortBaseline {
    pub cohort_key:        CohortKey,
    pub cohort_date:       NaiveDate,
    pub initial_customers: u64,
    pub initial_mrr:       Cents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortMetrics {
    pub cohort_key:        CohortKey,
    pub cohort_date:       NaiveDate,
    pub initial_customers: u64,
    pub current_customers: u64,
    pub initial_mrr:       Cents,
    pub current_mrr:       Cents,
    pub retention_rate:    f64,
    pub revenue_retention: f64,
}

impl CohortMetrics {
    /// True once `date` falls on or after the last day of the signup
    /// month, i.e. no further signups can join the cohort.
    pub fn signup_month_closed_by(&self, date: NaiveDate) -> bool {
        self.cohort_date
            .checked_add_months(Months::new(1))
            .is_some_and(|next| date >= next - Duration::days(1))
    }
}

/// `part / total × 100`, or 0 when `total` is 0.
pub fn share_pct(part: Cents, total: Cents) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// `current / initial × 100`, or 100 when there is nothing to compare to.
fn retained_pct(current: i64, initial: i64) -> f64 {
    if initial == 0 {
        100.0
    } else {
        current as f64 / initial as f64 * 100.0
    }
}

/// Attach percentages of the combined MRR to every bucket.
pub fn with_shares<K: Ord + Clone>(buckets: &BTreeMap<K, PlanBucket>) -> BTreeMap<K, ShareBucket> {
    let total: Cents = buckets.values().map(|b| b.mrr).sum();
    buckets
        .iter()
        .map(|(k, b)| {
            (
                k.clone(),
                ShareBucket {
                    customer_count: b.customer_count,
                    mrr:            b.mrr,
                    percentage:     share_pct(b.mrr, total),
                },
            )
        })
        .collect()
}

pub struct BreakdownAggregator<'a> {
    pricing: &'a PricingTable,
}

impl<'a> BreakdownAggregator<'a> {
    pub fn new(pricing: &'a PricingTable) -> Self {
        Self { pricing }
    }

    pub fn by_region(&self, entities: &[BillableEntity]) -> BTreeMap<String, ShareBucket> {
        let mut groups: BTreeMap<String, PlanBucket> = BTreeMap::new();
        for entity in entities {
            let region = entity
                .region
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(UNKNOWN_REGION);
            let bucket = groups.entry(region.to_string()).or_default();
            bucket.customer_count += 1;
            bucket.mrr += self.pricing.monthly(entity.plan_tier);
        }
        with_shares(&groups)
    }

    /// Group by signup month. Cohorts with a stored baseline are measured
    /// against it; new cohorts take their live values as the baseline.
    pub fn by_cohort(
        &self,
        entities: &[BillableEntity],
        baselines: &BTreeMap<CohortKey, CohortBaseline>,
    ) -> BTreeMap<CohortKey, CohortMetrics> {
        let mut live: BTreeMap<CohortKey, (NaiveDate, PlanBucket)> = BTreeMap::new();
        for entity in entities {
            let signup = entity.created_at.date_naive();
            let key = month_label(signup);
            let (_, bucket) = live
                .entry(key)
                .or_insert_with(|| (cohort_month(signup), PlanBucket::default()));
            bucket.customer_count += 1;
            bucket.mrr += self.pricing.monthly(entity.plan_tier);
        }

        live.into_iter()
            .map(|(key, (cohort_date, bucket))| {
                let (initial_customers, initial_mrr) = match baselines.get(&key) {
                    Some(b) => (b.initial_customers, b.initial_mrr),
                    None => (bucket.customer_count, bucket.mrr),
                };
                let metrics = CohortMetrics {
                    cohort_key: key.clone(),
                    cohort_date,
                    initial_customers,
                    current_customers: bucket.customer_count,
                    initial_mrr,
                    current_mrr: bucket.mrr,
                    retention_rate: retained_pct(
                        bucket.customer_count as i64,
                        initial_customers as i64,
                    ),
                    revenue_retention: retained_pct(bucket.mrr, initial_mrr),
                };
                (key, metrics)
            })
            .collect()
    }
}

fn cohort_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
