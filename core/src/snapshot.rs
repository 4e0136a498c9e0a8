//! Revenue metric snapshot, the record persisted per (date, period).
//!
//! This is the formatting boundary: everything upstream works in cents,
//! everything in here is in major currency units. Maps are ordered so
//! two computations over the same inputs serialize identically.

use crate::{
    breakdown::{CohortMetrics, ShareBucket},
    mrr::MrrDecomposition,
    period::{Period, PeriodWindow},
    pricing::PlanTier,
    types::{to_major, CohortKey},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub count:      u64,
    pub mrr:        f64,
    pub percentage: f64,
}

impl From<&ShareBucket> for BreakdownEntry {
    fn from(b: &ShareBucket) -> Self {
        Self {
            count:      b.customer_count,
            mrr:        to_major(b.mrr),
            percentage: b.percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortBreakdown {
    pub cohort_date:       NaiveDate,
    pub initial_customers: u64,
    pub current_customers: u64,
    pub initial_mrr:       f64,
    pub current_mrr:       f64,
    pub retention_rate:    f64,
    pub revenue_retention: f64,
}

impl From<&CohortMetrics> for CohortBreakdown {
    fn from(c: &CohortMetrics) -> Self {
        Self {
            cohort_date:       c.cohort_date,
            initial_customers: c.initial_customers,
            current_customers: c.current_customers,
            initial_mrr:       to_major(c.initial_mrr),
            current_mrr:       to_major(c.current_mrr),
            retention_rate:    c.retention_rate,
            revenue_retention: c.revenue_retention,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueMetricSnapshot {
    pub date:              NaiveDate,
    pub period:            Period,
    pub period_start:      NaiveDate,
    // Revenue
    pub mrr:               f64,
    pub arr:               f64,
    pub new_mrr:           f64,
    pub expansion_mrr:     f64,
    pub contraction_mrr:   f64,
    pub churn_mrr:         f64,
    pub net_new_mrr:       f64,
    // Customers
    pub total_customers:   u64,
    /// Signups in the window, from the provider's flow. Unlike `new_mrr`
    /// this includes customers who signed up and churned inside the same
    /// window, so it can be non-zero while `new_mrr` is 0.
    pub new_customers:     u64,
    /// Cancellations in the window, from the provider's flow. Counts a
    /// same-window signup that already left, which never reaches
    /// `churn_mrr` because it was absent from the previous cutoff.
    pub churned_customers: u64,
    // Unit economics
    pub arpu:              f64,
    pub ltv:               f64,
    // Breakdowns
    pub by_plan:           BTreeMap<PlanTier, BreakdownEntry>,
    pub by_region:         BTreeMap<String, BreakdownEntry>,
    pub by_cohort:         BTreeMap<CohortKey, CohortBreakdown>,
}

/// Everything a snapshot is assembled from, still in cents.
pub struct SnapshotParts<'a> {
    pub window:              &'a PeriodWindow,
    pub decomposition:       &'a MrrDecomposition,
    pub plans:               &'a BTreeMap<PlanTier, ShareBucket>,
    pub regions:             &'a BTreeMap<String, ShareBucket>,
    pub cohorts:             &'a BTreeMap<CohortKey, CohortMetrics>,
    pub total_customers:     u64,
    pub new_customers:       u64,
    pub churned_customers:   u64,
    pub ltv_lifespan_months: f64,
}

impl RevenueMetricSnapshot {
    pub fn assemble(parts: SnapshotParts<'_>) -> Self {
        let d = parts.decomposition;
        let mrr = to_major(d.total_mrr);
        let arpu = if parts.total_customers == 0 {
            0.0
        } else {
            mrr / parts.total_customers as f64
        };

        Self {
            date:              parts.window.end_date,
            period:            parts.window.period,
            period_start:      parts.window.start_date,
            mrr,
            arr:               to_major(d.total_mrr * 12),
            new_mrr:           to_major(d.new_mrr),
            expansion_mrr:     to_major(d.expansion_mrr),
            contraction_mrr:   to_major(d.contraction_mrr),
            churn_mrr:         to_major(d.churn_mrr),
            net_new_mrr:       to_major(d.net_new_mrr),
            total_customers:   parts.total_customers,
            new_customers:     parts.new_customers,
            churned_customers: parts.churned_customers,
            arpu,
            ltv:               arpu * parts.ltv_lifespan_months,
            by_plan:           parts.plans.iter().map(|(k, v)| (*k, v.into())).collect(),
            by_region:         parts.regions.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            by_cohort:         parts.cohorts.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
        }
    }
}
