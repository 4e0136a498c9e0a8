//! Computation audit log.
//!
//! Every engine operation records what it did as one or more events.
//! The log is append-only; snapshots stay idempotent regardless of how
//! many times a key is recomputed.

use crate::{period::Period, pricing::PlanTier};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Variants are added over time, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricsEvent {
    SnapshotComputed {
        date:            NaiveDate,
        period:          Period,
        mrr:             f64,
        net_new_mrr:     f64,
        total_customers: u64,
    },
    PricingGap {
        date:  NaiveDate,
        tiers: Vec<PlanTier>,
    },
    ForecastProduced {
        as_of:        NaiveDate,
        horizon:      u32,
        history_size: usize,
        fallback:     bool,
    },
    RetentionMeasured {
        as_of:                 NaiveDate,
        period_months:         u32,
        cohort_size:           u64,
        net_revenue_retention: f64,
    },
}

impl MetricsEvent {
    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SnapshotComputed { .. }  => "snapshot_computed",
            Self::PricingGap { .. }        => "pricing_gap",
            Self::ForecastProduced { .. }  => "forecast_produced",
            Self::RetentionMeasured { .. } => "retention_measured",
        }
    }
}

/// A persisted event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:             Option<i64>,
    pub computation_id: String,
    pub event_type:     String,
    pub payload:        String,
}
