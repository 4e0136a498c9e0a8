//! Net revenue retention for a fixed cohort.
//!
//! The cohort is the id set active at the start of the window. Only
//! those ids are priced again "now"; anyone who has since churned
//! contributes zero, which is what lets NRR fall below 100%.

use crate::{
    entity::BillableEntity,
    pricing::PricingTable,
    types::{Cents, EntityId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub cohort_size:             u64,
    pub retained_customers:      u64,
    pub starting_mrr:            Cents,
    pub current_mrr:             Cents,
    /// `current / starting × 100`; 100 when starting MRR is zero.
    pub net_revenue_retention:   f64,
    /// As above with each customer capped at their starting price.
    pub gross_revenue_retention: f64,
}

pub struct RetentionCalculator<'a> {
    pricing: &'a PricingTable,
}

impl<'a> RetentionCalculator<'a> {
    pub fn new(pricing: &'a PricingTable) -> Self {
        Self { pricing }
    }

    /// `cohort` holds the entities as they were at the period start,
    /// `current` the customer base now. Entities in `current` that are
    /// not in `cohort` are ignored.
    pub fn measure(&self, cohort: &[BillableEntity], current: &[BillableEntity]) -> RetentionReport {
        let now: HashMap<&EntityId, Cents> = current
            .iter()
            .map(|e| (&e.id, self.pricing.monthly(e.plan_tier)))
            .collect();

        let mut starting_mrr = 0;
        let mut current_mrr = 0;
        let mut capped_mrr = 0;
        let mut retained_customers = 0;

        for entity in cohort {
            let before = self.pricing.monthly(entity.plan_tier);
            starting_mrr += before;
            if let Some(&after) = now.get(&entity.id) {
                retained_customers += 1;
                current_mrr += after;
                capped_mrr += after.min(before);
            }
        }

        RetentionReport {
            cohort_size: cohort.len() as u64,
            retained_customers,
            starting_mrr,
            current_mrr,
            net_revenue_retention: retention_pct(current_mrr, starting_mrr),
            gross_revenue_retention: retention_pct(capped_mrr, starting_mrr),
        }
    }
}

fn retention_pct(current: Cents, starting: Cents) -> f64 {
    if starting == 0 {
        100.0
    } else {
        current as f64 / starting as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{PlanPrice, PlanTier};
    use chrono::{TimeZone, Utc};

    fn pricing() -> PricingTable {
        PricingTable::new([
            (PlanTier::Starter, PlanPrice { monthly: 0, yearly: 0 }),
            (PlanTier::Professional, PlanPrice { monthly: 10000, yearly: 100000 }),
            (PlanTier::Enterprise, PlanPrice { monthly: 50000, yearly: 500000 }),
        ])
    }

    fn org(id: &str, tier: PlanTier) -> BillableEntity {
        BillableEntity::new(id, tier, Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn unchanged_cohort_retains_everything() {
        let table = pricing();
        let cohort = vec![org("a", PlanTier::Professional), org("b", PlanTier::Enterprise)];

        let r = RetentionCalculator::new(&table).measure(&cohort, &cohort);

        assert_eq!(r.net_revenue_retention, 100.0);
        assert_eq!(r.gross_revenue_retention, 100.0);
        assert_eq!(r.retained_customers, 2);
    }

    #[test]
    fn churn_pulls_nrr_below_one_hundred() {
        let table = pricing();
        let cohort = vec![org("a", PlanTier::Professional), org("b", PlanTier::Professional)];
        let current = vec![org("a", PlanTier::Professional)];

        let r = RetentionCalculator::new(&table).measure(&cohort, &current);

        assert_eq!(r.starting_mrr, 20000);
        assert_eq!(r.current_mrr, 10000);
        assert_eq!(r.net_revenue_retention, 50.0);
    }

    #[test]
    fn expansion_lifts_nrr_but_not_grr() {
        let table = pricing();
        let cohort = vec![org("a", PlanTier::Professional), org("b", PlanTier::Professional)];
        let current = vec![
            org("a", PlanTier::Enterprise),
            org("b", PlanTier::Professional),
            org("newcomer", PlanTier::Enterprise),
        ];

        let r = RetentionCalculator::new(&table).measure(&cohort, &current);

        assert_eq!(r.current_mrr, 60000, "newcomers are outside the cohort");
        assert_eq!(r.net_revenue_retention, 300.0);
        assert_eq!(r.gross_revenue_retention, 100.0);
    }

    #[test]
    fn zero_starting_mrr_reads_one_hundred() {
        let table = pricing();
        let cohort = vec![org("a", PlanTier::Starter)];
        let current = vec![org("a", PlanTier::Enterprise)];

        let r = RetentionCalculator::new(&table).measure(&cohort, &current);
        assert_eq!(r.net_revenue_retention, 100.0);

        let empty = RetentionCalculator::new(&table).measure(&[], &current);
        assert_eq!(empty.net_revenue_retention, 100.0);
        assert_eq!(empty.cohort_size, 0);
    }
}
