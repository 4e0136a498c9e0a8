//! Synthetic tenant population: a seeded, month-by-month history of
//! signups, plan moves and churn, written into an `EntityLedger`.
//!
//! Used by the runner and the soak tests. Same seed, same config, same
//! ledger, always.

use crate::{
    entity::{BillableEntity, EntityLedger},
    error::MetricsResult,
    pricing::PlanTier,
    rng::{RngBank, StreamRng, StreamSlot},
    types::EntityId,
};
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionWeight {
    pub region:  String,
    pub country: String,
    pub weight:  f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Signups placed in the first month on top of the usual inflow.
    pub initial_customers:    u64,
    pub monthly_signups_mean: f64,
    /// Signup weights in `PlanTier::ALL` order.
    pub tier_weights:         [f64; 3],
    pub monthly_upgrade_rate:   f64,
    pub monthly_downgrade_rate: f64,
    pub monthly_churn_rate:     f64,
    pub regions:              Vec<RegionWeight>,
    /// Share of signups that carry no region at all.
    pub unknown_region_rate:  f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        let region = |region: &str, country: &str, weight: f64| RegionWeight {
            region:  region.into(),
            country: country.into(),
            weight,
        };
        Self {
            initial_customers:      40,
            monthly_signups_mean:   12.0,
            tier_weights:           [0.50, 0.38, 0.12],
            monthly_upgrade_rate:   0.04,
            monthly_downgrade_rate: 0.015,
            monthly_churn_rate:     0.025,
            regions: vec![
                region("North America", "US", 0.45),
                region("Europe", "DE", 0.35),
                region("Asia Pacific", "SG", 0.20),
            ],
            unknown_region_rate: 0.05,
        }
    }
}

pub struct PopulationGenerator {
    config: PopulationConfig,
    bank:   RngBank,
}

impl PopulationGenerator {
    pub fn new(seed: u64, config: PopulationConfig) -> Self {
        Self {
            config,
            bank: RngBank::new(seed),
        }
    }

    /// History covering `months` calendar months starting with the month
    /// that contains `start`.
    pub fn generate(&self, start: NaiveDate, months: u32) -> MetricsResult<EntityLedger> {
        let mut signup_rng = self.bank.for_stream(StreamSlot::Signup);
        let mut plan_rng = self.bank.for_stream(StreamSlot::PlanChange);
        let mut churn_rng = self.bank.for_stream(StreamSlot::Churn);
        let mut region_rng = self.bank.for_stream(StreamSlot::Region);

        let first_month = start.with_day(1).unwrap_or(start);
        let mut ledger = EntityLedger::new();
        let mut live: Vec<EntityId> = Vec::new();
        let mut next_id: u64 = 0;

        for m in 0..months {
            let Some(month) = first_month.checked_add_months(Months::new(m)) else {
                break;
            };

            // ── Existing customers: churn or move plan ─────────
            let mut survivors = Vec::with_capacity(live.len());
            for id in live.drain(..) {
                if churn_rng.chance(self.config.monthly_churn_rate) {
                    ledger.churn(&id, at_day(month, &mut churn_rng))?;
                    continue;
                }
                if let Some(tier) = ledger.latest_plan(&id) {
                    if let Some(moved) = self.plan_move(tier, &mut plan_rng) {
                        ledger.change_plan(&id, at_day(month, &mut plan_rng), moved)?;
                    }
                }
                survivors.push(id);
            }
            live = survivors;

            // ── New signups ────────────────────────────────────
            let mut signups = signup_rng.poisson(self.config.monthly_signups_mean);
            if m == 0 {
                signups += self.config.initial_customers;
            }
            for _ in 0..signups {
                let id = format!("org-{next_id:06}");
                next_id += 1;

                let tier = PlanTier::ALL[signup_rng.weighted_index(&self.config.tier_weights)];
                let mut entity = BillableEntity::new(id.clone(), tier, at_day(month, &mut signup_rng));
                if !region_rng.chance(self.config.unknown_region_rate) && !self.config.regions.is_empty() {
                    let weights: Vec<f64> = self.config.regions.iter().map(|r| r.weight).collect();
                    let r = &self.config.regions[region_rng.weighted_index(&weights)];
                    entity = entity.with_region(r.region.clone()).with_country(r.country.clone());
                }
                ledger.onboard(entity);
                live.push(id);
            }
        }

        log::info!(
            "population: {} entities over {months} months ({} live at end)",
            ledger.len(),
            live.len()
        );
        Ok(ledger)
    }

    fn plan_move(&self, tier: PlanTier, rng: &mut StreamRng) -> Option<PlanTier> {
        let idx = PlanTier::ALL.iter().position(|t| *t == tier)?;
        let roll = rng.next_f64();
        if roll < self.config.monthly_upgrade_rate {
            PlanTier::ALL.get(idx + 1).copied()
        } else if roll < self.config.monthly_upgrade_rate + self.config.monthly_downgrade_rate {
            idx.checked_sub(1).map(|i| PlanTier::ALL[i])
        } else {
            None
        }
    }
}

/// Noon UTC on a random day 1–28 of `month`.
fn at_day(month: NaiveDate, rng: &mut StreamRng) -> DateTime<Utc> {
    let day = month.with_day(1 + rng.next_u64_below(28) as u32).unwrap_or(month);
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
    day.and_time(noon).and_utc()
}
