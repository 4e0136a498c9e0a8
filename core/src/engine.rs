//! The metrics engine: orchestrates one computation end to end.
//!
//! PIPELINE (fixed order):
//!   1. Resolve the period window.
//!   2. Fetch current / previous / new / churned entity sets.
//!   3. Decompose MRR, aggregate plan / region / cohort breakdowns.
//!   4. Assemble the snapshot.
//!   5. Persist snapshot, cohorts and audit events in one commit.
//!
//! RULES:
//!   - Nothing is written before step 5.
//!   - Money stays in cents until the snapshot is assembled.
//!   - "Today" comes from the injected clock, never the wall clock.

use crate::{
    breakdown::{with_shares, BreakdownAggregator, CohortMetrics},
    clock::{Clock, SystemClock},
    config::MetricsConfig,
    entity::{BillableEntity, EntitySnapshotProvider},
    error::{MetricsError, MetricsResult},
    event::{EventLogEntry, MetricsEvent},
    forecast::{ForecastEngine, ForecastPoint, MrrObservation},
    mrr::MrrDecomposer,
    period::{midnight, Period, PeriodWindow},
    retention::{RetentionCalculator, RetentionReport},
    snapshot::{RevenueMetricSnapshot, SnapshotParts},
    store::{MetricsSnapshotStore, MetricsStore},
    types::{to_major, CohortKey},
};
use chrono::{Duration, Months, NaiveDate};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The four entity sets one period computation needs.
#[derive(Debug, Clone, Default)]
pub struct PeriodInputs {
    pub current:  Vec<BillableEntity>,
    pub previous: Vec<BillableEntity>,
    pub new:      Vec<BillableEntity>,
    pub churned:  Vec<BillableEntity>,
}

pub struct MetricsEngine<P, S = MetricsStore, C = SystemClock> {
    config:   MetricsConfig,
    provider: P,
    store:    S,
    clock:    C,
}

impl<P: EntitySnapshotProvider, S: MetricsSnapshotStore> MetricsEngine<P, S, SystemClock> {
    pub fn new(config: MetricsConfig, provider: P, store: S) -> Self {
        Self::with_clock(config, provider, store, SystemClock)
    }
}

impl<P, S, C> MetricsEngine<P, S, C>
where
    P: EntitySnapshotProvider,
    S: MetricsSnapshotStore,
    C: Clock,
{
    pub fn with_clock(config: MetricsConfig, provider: P, store: S, clock: C) -> Self {
        Self {
            config,
            provider,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ── Snapshot computation ───────────────────────────────────

    /// Compute and persist the snapshot for `(reference_date, period)`.
    /// Recomputing the same key replaces the stored record.
    pub fn compute_snapshot(
        &self,
        reference_date: NaiveDate,
        period: Period,
    ) -> MetricsResult<RevenueMetricSnapshot> {
        let computation_id = Uuid::new_v4().to_string();
        let window = PeriodWindow::resolve(reference_date, period);
        let inputs = self.fetch_period_inputs(&window)?;
        let pricing = &self.config.pricing;

        let mut events = Vec::new();
        let gaps = pricing.missing(
            inputs
                .current
                .iter()
                .chain(&inputs.previous)
                .map(|e| &e.plan_tier),
        );
        if !gaps.is_empty() {
            log::warn!(
                "[{computation_id}] no price for {:?}; those entities count as 0 MRR",
                gaps
            );
            events.push(MetricsEvent::PricingGap {
                date:  window.end_date,
                tiers: gaps,
            });
        }

        let decomposition = MrrDecomposer::new(pricing).decompose(
            &inputs.current,
            &inputs.previous,
            window.start_date,
            window.end_date,
        );
        let plans = with_shares(&decomposition.by_plan);

        let aggregator = BreakdownAggregator::new(pricing);
        let regions = aggregator.by_region(&inputs.current);
        let baselines = self.store.cohort_baselines(period)?;
        let cohorts = aggregator.by_cohort(&inputs.current, &baselines);
        // A cohort whose signup month is still open would freeze a partial
        // baseline; report it against live values and persist it later.
        let settled: BTreeMap<CohortKey, CohortMetrics> = cohorts
            .iter()
            .filter(|(_, c)| c.signup_month_closed_by(window.end_date))
            .map(|(k, c)| (k.clone(), c.clone()))
            .collect();

        let snapshot = RevenueMetricSnapshot::assemble(SnapshotParts {
            window:              &window,
            decomposition:       &decomposition,
            plans:               &plans,
            regions:             &regions,
            cohorts:             &cohorts,
            total_customers:     inputs.current.len() as u64,
            new_customers:       inputs.new.len() as u64,
            churned_customers:   inputs.churned.len() as u64,
            ltv_lifespan_months: self.config.ltv_lifespan_months,
        });

        events.push(MetricsEvent::SnapshotComputed {
            date:            snapshot.date,
            period:          snapshot.period,
            mrr:             snapshot.mrr,
            net_new_mrr:     snapshot.net_new_mrr,
            total_customers: snapshot.total_customers,
        });
        let entries = log_entries(&computation_id, &events)?;
        self.store.commit_computation(&snapshot, &settled, &entries)?;

        log::info!(
            "[{computation_id}] {} {}..={}: mrr {:.2}, net new {:.2}, {} customers",
            period,
            window.start_date,
            window.end_date,
            snapshot.mrr,
            snapshot.net_new_mrr,
            snapshot.total_customers
        );
        Ok(snapshot)
    }

    /// Fan-out/fan-in over the provider: returns once all four sets are
    /// in hand, or with the first failure.
    pub fn fetch_period_inputs(&self, window: &PeriodWindow) -> MetricsResult<PeriodInputs> {
        let start = window.previous_cutoff();
        let end = window.current_cutoff();

        let current = self.provider.entities_as_of(end)?;
        let previous = self.provider.entities_as_of(start)?;
        let new = self.provider.created_between(start, end)?;
        let churned = self.provider.churned_between(start, end)?;

        log::debug!(
            "{}: {} current, {} previous, {} new, {} churned",
            self.provider.name(),
            current.len(),
            previous.len(),
            new.len(),
            churned.len()
        );
        Ok(PeriodInputs {
            current,
            previous,
            new,
            churned,
        })
    }

    /// A previously computed snapshot, or `SnapshotNotFound`.
    pub fn stored_snapshot(&self, date: NaiveDate, period: Period) -> MetricsResult<RevenueMetricSnapshot> {
        self.store
            .snapshot(date, period)?
            .ok_or_else(|| MetricsError::SnapshotNotFound {
                date:   date.to_string(),
                period: period.to_string(),
            })
    }

    // ── Forecast ───────────────────────────────────────────────

    /// Project MRR `horizon_months` ahead from stored MONTHLY snapshots
    /// dated on a month end; mid-month MONTHLY keys are ignored so the
    /// growth ratios compare whole months. With no history, the live MRR
    /// grows at the configured flat rate.
    pub fn get_forecast(&self, horizon_months: u32) -> MetricsResult<Vec<ForecastPoint>> {
        let computation_id = Uuid::new_v4().to_string();
        let today = self.clock.today();
        let forecast = &self.config.forecast;
        let engine = ForecastEngine::new(forecast);

        let history: Vec<MrrObservation> = self
            .store
            .month_end_history(forecast.history_limit)?
            .iter()
            .map(|s| MrrObservation {
                date: s.date,
                mrr:  s.mrr,
            })
            .collect();

        let fallback = history.is_empty();
        let points = if fallback {
            let live = self.provider.entities_as_of(midnight(today + Duration::days(1)))?;
            let mrr = to_major(MrrDecomposer::new(&self.config.pricing).total_mrr(&live));
            log::info!("[{computation_id}] no monthly history; flat forecast from live mrr {mrr:.2}");
            engine.project_flat(today, mrr, horizon_months)
        } else {
            engine.project(&history, horizon_months)
        };

        let event = MetricsEvent::ForecastProduced {
            as_of:        today,
            horizon:      horizon_months,
            history_size: history.len(),
            fallback,
        };
        for entry in log_entries(&computation_id, &[event])? {
            self.store.append_event(&entry)?;
        }
        Ok(points)
    }

    // ── Retention ──────────────────────────────────────────────

    /// NRR (%) of the customers active `period_months` ago, measured today.
    pub fn get_net_revenue_retention(&self, period_months: u32) -> MetricsResult<f64> {
        Ok(self.retention_report(period_months)?.net_revenue_retention)
    }

    pub fn retention_report(&self, period_months: u32) -> MetricsResult<RetentionReport> {
        let computation_id = Uuid::new_v4().to_string();
        let today = self.clock.today();
        let period_start = today
            .checked_sub_months(Months::new(period_months))
            .ok_or_else(|| {
                MetricsError::InvalidConfig(format!("retention period of {period_months} months is out of range"))
            })?;

        let cohort = self.provider.entities_as_of(midnight(period_start))?;
        let current = self.provider.entities_as_of(midnight(today + Duration::days(1)))?;
        let report = RetentionCalculator::new(&self.config.pricing).measure(&cohort, &current);

        let event = MetricsEvent::RetentionMeasured {
            as_of: today,
            period_months,
            cohort_size: report.cohort_size,
            net_revenue_retention: report.net_revenue_retention,
        };
        for entry in log_entries(&computation_id, &[event])? {
            self.store.append_event(&entry)?;
        }

        log::info!(
            "[{computation_id}] nrr over {period_months} months since {period_start}: {:.2}% ({} of {} retained)",
            report.net_revenue_retention,
            report.retained_customers,
            report.cohort_size
        );
        Ok(report)
    }
}

fn log_entries(computation_id: &str, events: &[MetricsEvent]) -> MetricsResult<Vec<EventLogEntry>> {
    events
        .iter()
        .map(|event| {
            Ok(EventLogEntry {
                id:             None,
                computation_id: computation_id.to_string(),
                event_type:     event.type_name().to_string(),
                payload:        serde_json::to_string(event)?,
            })
        })
        .collect()
}
