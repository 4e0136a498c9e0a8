//! Billable entities and the snapshot provider seam.
//!
//! RULE: the engine never mutates entities. It asks a provider for the
//! state of the customer base at a cutoff and works on the copy.
//!
//! `EntityLedger` is the in-memory provider used by tests and the
//! runner. It keeps a time-indexed history per entity (signup, plan
//! changes, churn) so any past cutoff can be replayed.

use crate::{
    error::{MetricsError, MetricsResult},
    pricing::PlanTier,
    types::EntityId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableEntity {
    pub id:                  EntityId,
    pub plan_tier:           PlanTier,
    pub created_at:          DateTime<Utc>,
    pub country:             Option<String>,
    pub region:              Option<String>,
    pub subscription_status: Option<String>,
}

impl BillableEntity {
    pub fn new(id: impl Into<EntityId>, plan_tier: PlanTier, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            plan_tier,
            created_at,
            country: None,
            region: None,
            subscription_status: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }
}

/// Source of customer-base snapshots.
///
/// All ranges are half-open: `[start, end)`. A cutoff is exclusive: an
/// entity created exactly at `cutoff` is not yet part of the snapshot.
pub trait EntitySnapshotProvider {
    /// Stable name used in error messages and logs.
    fn name(&self) -> &'static str;

    /// Entities created before `cutoff` and not churned by it, with the
    /// plan they held at that instant.
    fn entities_as_of(&self, cutoff: DateTime<Utc>) -> MetricsResult<Vec<BillableEntity>>;

    /// Entities whose signup falls in `[start, end)`.
    fn created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MetricsResult<Vec<BillableEntity>>;

    /// Entities that churned in `[start, end)`, with the plan they held
    /// when they left.
    fn churned_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MetricsResult<Vec<BillableEntity>>;
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    id:         EntityId,
    created_at: DateTime<Utc>,
    country:    Option<String>,
    region:     Option<String>,
    /// Plan history, ascending by effective time. First entry is signup.
    plans:      Vec<(DateTime<Utc>, PlanTier)>,
    churned_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    fn active_at(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff && self.churned_at.map_or(true, |c| c >= cutoff)
    }

    /// Plan in force strictly before `cutoff`; falls back to the signup plan.
    fn plan_before(&self, cutoff: DateTime<Utc>) -> PlanTier {
        self.plans
            .iter()
            .take_while(|(at, _)| *at < cutoff)
            .last()
            .or_else(|| self.plans.first())
            .map(|(_, tier)| *tier)
            .unwrap_or(PlanTier::Starter)
    }

    fn to_entity(&self, plan_tier: PlanTier, status: &str) -> BillableEntity {
        BillableEntity {
            id: self.id.clone(),
            plan_tier,
            created_at: self.created_at,
            country: self.country.clone(),
            region: self.region.clone(),
            subscription_status: Some(status.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityLedger {
    entries: BTreeMap<EntityId, LedgerEntry>,
}

impl EntityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a signup. Re-onboarding an existing id replaces its history.
    pub fn onboard(&mut self, entity: BillableEntity) {
        let entry = LedgerEntry {
            id:         entity.id.clone(),
            created_at: entity.created_at,
            country:    entity.country,
            region:     entity.region,
            plans:      vec![(entity.created_at, entity.plan_tier)],
            churned_at: None,
        };
        self.entries.insert(entity.id, entry);
    }

    pub fn change_plan(&mut self, id: &str, at: DateTime<Utc>, tier: PlanTier) -> MetricsResult<()> {
        let entry = self.entry_mut(id)?;
        entry.plans.push((at, tier));
        entry.plans.sort_by_key(|(at, _)| *at);
        Ok(())
    }

    pub fn churn(&mut self, id: &str, at: DateTime<Utc>) -> MetricsResult<()> {
        let entry = self.entry_mut(id)?;
        entry.churned_at = Some(at);
        Ok(())
    }

    /// Current plan of `id` ignoring time, if the entity exists and is live.
    pub fn latest_plan(&self, id: &str) -> Option<PlanTier> {
        self.entries
            .get(id)
            .filter(|e| e.churned_at.is_none())
            .and_then(|e| e.plans.last().map(|(_, t)| *t))
    }

    fn entry_mut(&mut self, id: &str) -> MetricsResult<&mut LedgerEntry> {
        self.entries.get_mut(id).ok_or_else(|| MetricsError::Provider {
            source_name: "ledger".into(),
            message:     format!("unknown entity {id}"),
        })
    }
}

impl EntitySnapshotProvider for EntityLedger {
    fn name(&self) -> &'static str {
        "ledger"
    }

    fn entities_as_of(&self, cutoff: DateTime<Utc>) -> MetricsResult<Vec<BillableEntity>> {
        Ok(self
            .entries
            .values()
            .filter(|e| e.active_at(cutoff))
            .map(|e| e.to_entity(e.plan_before(cutoff), "active"))
            .collect())
    }

    fn created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MetricsResult<Vec<BillableEntity>> {
        Ok(self
            .entries
            .values()
            .filter(|e| e.created_at >= start && e.created_at < end)
            .map(|e| {
                let status = if e.active_at(end) { "active" } else { "churned" };
                e.to_entity(e.plan_before(end), status)
            })
            .collect())
    }

    fn churned_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MetricsResult<Vec<BillableEntity>> {
        Ok(self
            .entries
            .values()
            .filter_map(|e| {
                let at = e.churned_at?;
                (at >= start && at < end).then(|| e.to_entity(e.plan_before(at), "churned"))
            })
            .collect())
    }
}
