//! Pricing table: plan tier to fixed monthly/yearly price.
//!
//! The table is injected through `MetricsConfig` and never mutated
//! after load. A tier missing from the table prices at zero.

use crate::types::Cents;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    Starter,
    Professional,
    Enterprise,
}

impl PlanTier {
    /// Every tier, in ascending price order. Plan breakdowns always
    /// carry one bucket per entry here.
    pub const ALL: [PlanTier; 3] = [
        PlanTier::Starter,
        PlanTier::Professional,
        PlanTier::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter      => "STARTER",
            Self::Professional => "PROFESSIONAL",
            Self::Enterprise   => "ENTERPRISE",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STARTER"      => Ok(Self::Starter),
            "PROFESSIONAL" => Ok(Self::Professional),
            "ENTERPRISE"   => Ok(Self::Enterprise),
            other          => Err(format!("Unknown plan tier: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPrice {
    pub monthly: Cents,
    pub yearly:  Cents,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTable {
    plans: BTreeMap<PlanTier, PlanPrice>,
}

impl PricingTable {
    pub fn new(plans: impl IntoIterator<Item = (PlanTier, PlanPrice)>) -> Self {
        Self {
            plans: plans.into_iter().collect(),
        }
    }

    pub fn get(&self, tier: PlanTier) -> Option<&PlanPrice> {
        self.plans.get(&tier)
    }

    pub fn contains(&self, tier: PlanTier) -> bool {
        self.plans.contains_key(&tier)
    }

    /// Monthly price for `tier`, or 0 when the table has no entry.
    pub fn monthly(&self, tier: PlanTier) -> Cents {
        self.plans.get(&tier).map(|p| p.monthly).unwrap_or(0)
    }

    /// Yearly list price for `tier`, or 0 when the table has no entry.
    pub fn yearly(&self, tier: PlanTier) -> Cents {
        self.plans.get(&tier).map(|p| p.yearly).unwrap_or(0)
    }

    /// Tiers referenced by `tiers` that the table cannot price.
    pub fn missing<'a>(&self, tiers: impl IntoIterator<Item = &'a PlanTier>) -> Vec<PlanTier> {
        let mut missing: Vec<PlanTier> = tiers
            .into_iter()
            .filter(|t| !self.contains(**t))
            .copied()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlanTier, &PlanPrice)> {
        self.plans.iter()
    }
}
