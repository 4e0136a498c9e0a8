use crate::{
    error::{MetricsError, MetricsResult},
    pricing::{PlanPrice, PlanTier, PricingTable},
    types::Cents,
};
use serde::{Deserialize, Serialize};

// ── Pricing ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPriceConfig {
    pub plan:    PlanTier,
    pub label:   String,
    pub monthly: Cents,
    pub yearly:  Cents,
}

#[derive(Debug, Clone, Deserialize)]
struct PricingFile {
    plans: Vec<PlanPriceConfig>,
}

// ── Forecasting ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForecastConfig {
    /// Confidence (0–100) before any per-period decay.
    pub base_confidence: f64,
    /// Confidence lost per projected period.
    pub confidence_decay: f64,
    pub confidence_floor: f64,
    /// Bound widening per projected period, as a fraction.
    pub uncertainty_step: f64,
    /// Growth per period assumed when there is no history.
    pub fallback_growth_rate: f64,
    pub fallback_base_confidence: f64,
    /// Bound half-width as a fraction of the projection, no-history mode.
    pub fallback_band: f64,
    /// Most recent snapshots fed into a forecast.
    pub history_limit: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            base_confidence:          95.0,
            confidence_decay:         5.0,
            confidence_floor:         50.0,
            uncertainty_step:         0.1,
            fallback_growth_rate:     0.05,
            fallback_base_confidence: 70.0,
            fallback_band:            0.10,
            history_limit:            12,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MetricsFile {
    ltv_lifespan_months: f64,
    #[serde(default)]
    nrr_default_months:  Option<u32>,
    #[serde(default)]
    forecast:            ForecastConfig,
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub pricing:             PricingTable,
    pub plan_labels:         Vec<(PlanTier, String)>,
    pub forecast:            ForecastConfig,
    /// Assumed average customer lifespan used for LTV.
    pub ltv_lifespan_months: f64,
    pub nrr_default_months:  u32,
}

impl MetricsConfig {
    /// Load from the data/ directory.
    /// In tests, use MetricsConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let pricing_path = format!("{data_dir}/pricing/pricing_table.json");
        let pricing_content = std::fs::read_to_string(&pricing_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {pricing_path}: {e}"))?;
        let pricing_file: PricingFile = serde_json::from_str(&pricing_content)?;

        let metrics_path = format!("{data_dir}/metrics/metrics_config.json");
        let metrics_content = std::fs::read_to_string(&metrics_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {metrics_path}: {e}"))?;
        let metrics_file: MetricsFile = serde_json::from_str(&metrics_content)?;

        let config = Self::from_parts(
            pricing_file.plans,
            metrics_file.forecast,
            metrics_file.ltv_lifespan_months,
            metrics_file.nrr_default_months.unwrap_or(12),
        );
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let plans = vec![
            PlanPriceConfig {
                plan:    PlanTier::Starter,
                label:   "Starter".into(),
                monthly: 0,
                yearly:  0,
            },
            PlanPriceConfig {
                plan:    PlanTier::Professional,
                label:   "Professional".into(),
                monthly: 9_900,
                yearly:  99_000,
            },
            PlanPriceConfig {
                plan:    PlanTier::Enterprise,
                label:   "Enterprise".into(),
                monthly: 49_900,
                yearly:  499_000,
            },
        ];
        Self::from_parts(plans, ForecastConfig::default(), 24.0, 12)
    }

    /// Same config with a different pricing table.
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Display label for a tier; falls back to the wire name.
    pub fn plan_label(&self, tier: PlanTier) -> &str {
        self.plan_labels
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, label)| label.as_str())
            .unwrap_or(tier.as_str())
    }

    pub fn validate(&self) -> MetricsResult<()> {
        if let Some((tier, _)) = self
            .pricing
            .iter()
            .find(|(_, p)| p.monthly < 0 || p.yearly < 0)
        {
            return Err(MetricsError::InvalidConfig(format!(
                "negative price for plan {tier}"
            )));
        }
        let f = &self.forecast;
        if f.confidence_floor > f.base_confidence || f.confidence_floor > f.fallback_base_confidence {
            return Err(MetricsError::InvalidConfig(format!(
                "confidence floor {} exceeds a base confidence",
                f.confidence_floor
            )));
        }
        if f.confidence_decay < 0.0 || f.uncertainty_step < 0.0 || f.fallback_band < 0.0 {
            return Err(MetricsError::InvalidConfig(
                "forecast decay, step and band must be non-negative".into(),
            ));
        }
        if self.ltv_lifespan_months <= 0.0 {
            return Err(MetricsError::InvalidConfig(
                "ltv_lifespan_months must be positive".into(),
            ));
        }
        Ok(())
    }

    fn from_parts(
        plans: Vec<PlanPriceConfig>,
        forecast: ForecastConfig,
        ltv_lifespan_months: f64,
        nrr_default_months: u32,
    ) -> Self {
        let pricing = PricingTable::new(plans.iter().map(|p| {
            (
                p.plan,
                PlanPrice {
                    monthly: p.monthly,
                    yearly:  p.yearly,
                },
            )
        }));
        let plan_labels = plans.into_iter().map(|p| (p.plan, p.label)).collect();
        Self {
            pricing,
            plan_labels,
            forecast,
            ltv_lifespan_months,
            nrr_default_months,
        }
    }
}
