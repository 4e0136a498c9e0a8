//! MRR decomposition: totals by plan and the new / expansion /
//! contraction / churn movement between two snapshots.
//!
//! Every amount here is integer cents. Nothing in this module divides.

use crate::{
    entity::BillableEntity,
    pricing::{PlanTier, PricingTable},
    types::{Cents, EntityId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanBucket {
    pub customer_count: u64,
    pub mrr:            Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrrDecomposition {
    pub total_mrr:       Cents,
    pub by_plan:         BTreeMap<PlanTier, PlanBucket>,
    // Movements
    pub new_mrr:         Cents,
    pub expansion_mrr:   Cents,
    pub contraction_mrr: Cents,
    pub churn_mrr:       Cents,
    pub net_new_mrr:     Cents,
    // Movement counts
    pub new_customers:        u64,
    pub expanded_customers:   u64,
    pub contracted_customers: u64,
    pub churned_customers:    u64,
}

pub struct MrrDecomposer<'a> {
    pricing: &'a PricingTable,
}

impl<'a> MrrDecomposer<'a> {
    pub fn new(pricing: &'a PricingTable) -> Self {
        Self { pricing }
    }

    pub fn price(&self, entity: &BillableEntity) -> Cents {
        self.pricing.monthly(entity.plan_tier)
    }

    pub fn total_mrr(&self, entities: &[BillableEntity]) -> Cents {
        entities.iter().map(|e| self.price(e)).sum()
    }

    /// One bucket per tier in `PlanTier::ALL`, including empty ones.
    pub fn mrr_by_plan(&self, entities: &[BillableEntity]) -> BTreeMap<PlanTier, PlanBucket> {
        let mut buckets: BTreeMap<PlanTier, PlanBucket> = PlanTier::ALL
            .iter()
            .map(|t| (*t, PlanBucket::default()))
            .collect();

        for entity in entities {
            let bucket = buckets.entry(entity.plan_tier).or_default();
            bucket.customer_count += 1;
            bucket.mrr += self.price(entity);
        }
        buckets
    }

    pub fn decompose(
        &self,
        current: &[BillableEntity],
        previous: &[BillableEntity],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> MrrDecomposition {
        let by_plan = self.mrr_by_plan(current);
        let total_mrr = by_plan.values().map(|b| b.mrr).sum();

        // ── New ────────────────────────────────────────────────
        let mut new_mrr = 0;
        let mut new_customers = 0;
        for entity in current {
            let signup = entity.created_at.date_naive();
            if signup >= start_date && signup <= end_date {
                new_mrr += self.price(entity);
                new_customers += 1;
            }
        }

        // ── Expansion / contraction / churn ────────────────────
        let current_prices: HashMap<&EntityId, Cents> =
            current.iter().map(|e| (&e.id, self.price(e))).collect();

        let mut expansion_mrr = 0;
        let mut contraction_mrr = 0;
        let mut churn_mrr = 0;
        let mut expanded_customers = 0;
        let mut contracted_customers = 0;
        let mut churned_customers = 0;

        for entity in previous {
            let before = self.price(entity);
            match current_prices.get(&entity.id) {
                Some(&after) if after > before => {
                    expansion_mrr += after - before;
                    expanded_customers += 1;
                }
                Some(&after) if after < before => {
                    contraction_mrr += before - after;
                    contracted_customers += 1;
                }
                Some(_) => {}
                None => {
                    churn_mrr += before;
                    churned_customers += 1;
                }
            }
        }

        MrrDecomposition {
            total_mrr,
            by_plan,
            new_mrr,
            expansion_mrr,
            contraction_mrr,
            churn_mrr,
            net_new_mrr: new_mrr + expansion_mrr - contraction_mrr - churn_mrr,
            new_customers,
            expanded_customers,
            contracted_customers,
            churned_customers,
        }
    }
}
