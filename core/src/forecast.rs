//! MRR forecasting: compound average growth with variance-derived
//! confidence bands.
//!
//! One deterministic pass, no state. With history: the mean of the
//! period-over-period growth ratios drives the projection and the
//! population standard deviation of the raw MRR series drives the band.
//! Without history: a configured flat growth rate is applied to the
//! live MRR and the band is a fixed fraction of the projection.
//!
//! Invariants for every point: `0 ≤ lower_bound ≤ projected_mrr ≤
//! upper_bound`, and confidence never rises as the horizon grows.

use crate::{config::ForecastConfig, period::month_label};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MrrObservation {
    pub date: NaiveDate,
    /// Major currency units.
    pub mrr:  f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period:        String,
    pub projected_mrr: f64,
    pub projected_arr: f64,
    pub confidence:    f64,
    pub lower_bound:   f64,
    pub upper_bound:   f64,
    pub assumptions:   Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthStats {
    pub avg_growth_rate: f64,
    pub std_dev:         f64,
    pub sample_size:     usize,
    /// Growth ratios that had a non-zero denominator.
    pub ratio_count:     usize,
}

impl GrowthStats {
    /// `None` for an empty history.
    pub fn from_history(history: &[MrrObservation]) -> Option<Self> {
        if history.is_empty() {
            return None;
        }

        let ratios: Vec<f64> = history
            .windows(2)
            .filter(|w| w[0].mrr > 0.0)
            .map(|w| (w[1].mrr - w[0].mrr) / w[0].mrr)
            .collect();
        let avg_growth_rate = if ratios.is_empty() {
            0.0
        } else {
            ratios.iter().sum::<f64>() / ratios.len() as f64
        };

        let n = history.len() as f64;
        let mean = history.iter().map(|o| o.mrr).sum::<f64>() / n;
        let variance = history.iter().map(|o| (o.mrr - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            avg_growth_rate,
            std_dev: variance.sqrt(),
            sample_size: history.len(),
            ratio_count: ratios.len(),
        })
    }
}

pub struct ForecastEngine<'a> {
    config: &'a ForecastConfig,
}

impl<'a> ForecastEngine<'a> {
    pub fn new(config: &'a ForecastConfig) -> Self {
        Self { config }
    }

    /// Project `horizon` periods past the last observation. `history`
    /// must be ordered oldest to newest; an empty history yields no
    /// points (use `project_flat` for that case).
    pub fn project(&self, history: &[MrrObservation], horizon: u32) -> Vec<ForecastPoint> {
        let (Some(stats), Some(last)) = (GrowthStats::from_history(history), history.last()) else {
            return Vec::new();
        };
        let cfg = self.config;

        (1..=horizon)
            .map(|k| {
                let kf = k as f64;
                let projected_mrr = (last.mrr * (1.0 + stats.avg_growth_rate).powi(k as i32)).max(0.0);
                let bound = stats.std_dev * (1.0 + kf * cfg.uncertainty_step) * 2.0;
                ForecastPoint {
                    period: period_label(last.date, k),
                    projected_mrr,
                    projected_arr: projected_mrr * 12.0,
                    confidence: self.confidence(cfg.base_confidence, k),
                    lower_bound: (projected_mrr - bound).max(0.0),
                    upper_bound: projected_mrr + bound,
                    assumptions: vec![
                        format!(
                            "Average growth rate of {:.2}% per period",
                            stats.avg_growth_rate * 100.0
                        ),
                        format!(
                            "Based on {} historical snapshots ({} growth ratios)",
                            stats.sample_size, stats.ratio_count
                        ),
                        format!("MRR standard deviation of {:.2}", stats.std_dev),
                        format!(
                            "Bounds widen by {:.0}% per period ahead",
                            cfg.uncertainty_step * 100.0
                        ),
                    ],
                }
            })
            .collect()
    }

    /// No history: grow `current_mrr` at the configured flat rate.
    pub fn project_flat(&self, as_of: NaiveDate, current_mrr: f64, horizon: u32) -> Vec<ForecastPoint> {
        let cfg = self.config;
        let current_mrr = current_mrr.max(0.0);

        (1..=horizon)
            .map(|k| {
                let kf = k as f64;
                let projected_mrr = current_mrr * (1.0 + cfg.fallback_growth_rate).powi(k as i32);
                let bound = projected_mrr * cfg.fallback_band * (1.0 + kf * cfg.uncertainty_step);
                ForecastPoint {
                    period: period_label(as_of, k),
                    projected_mrr,
                    projected_arr: projected_mrr * 12.0,
                    confidence: self.confidence(cfg.fallback_base_confidence, k),
                    lower_bound: (projected_mrr - bound).max(0.0),
                    upper_bound: projected_mrr + bound,
                    assumptions: vec![
                        format!(
                            "No history available; assuming {:.1}% growth per period",
                            cfg.fallback_growth_rate * 100.0
                        ),
                        format!("Projected from current live MRR of {current_mrr:.2}"),
                        format!(
                            "Bounds fixed at {:.0}% of projection, widening {:.0}% per period",
                            cfg.fallback_band * 100.0,
                            cfg.uncertainty_step * 100.0
                        ),
                    ],
                }
            })
            .collect()
    }

    fn confidence(&self, base: f64, k: u32) -> f64 {
        (base - k as f64 * self.config.confidence_decay)
            .max(self.config.confidence_floor)
            .clamp(0.0, 100.0)
    }
}

/// `YYYY-MM` label `k` months after the month containing `from`.
fn period_label(from: NaiveDate, k: u32) -> String {
    from.checked_add_months(Months::new(k))
        .map(month_label)
        .unwrap_or_else(|| format!("{}+{k}", month_label(from)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn obs(m: u32, mrr: f64) -> MrrObservation {
        MrrObservation {
            date: NaiveDate::from_ymd_opt(2024, m, 28).unwrap(),
            mrr,
        }
    }

    #[test]
    fn stats_skip_zero_denominators() {
        let history = vec![obs(1, 0.0), obs(2, 100.0), obs(3, 110.0)];
        let stats = GrowthStats::from_history(&history).unwrap();

        assert_eq!(stats.ratio_count, 1);
        assert!((stats.avg_growth_rate - 0.10).abs() < 1e-12);
        assert_eq!(stats.sample_size, 3);
    }

    #[test]
    fn population_standard_deviation() {
        let history = vec![obs(1, 2.0), obs(2, 4.0), obs(3, 4.0), obs(4, 4.0),
                           obs(5, 5.0), obs(6, 5.0), obs(7, 7.0), obs(8, 9.0)];
        let stats = GrowthStats::from_history(&history).unwrap();
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
    }

    #[test]
    fn steady_growth_compounds() {
        let config = ForecastConfig::default();
        let history = vec![obs(1, 1000.0), obs(2, 1100.0), obs(3, 1210.0)];

        let points = ForecastEngine::new(&config).project(&history, 3);

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].period, "2024-04");
        assert_eq!(points[2].period, "2024-06");
        assert!((points[0].projected_mrr - 1331.0).abs() < 1e-6);
        assert!((points[0].projected_arr - 1331.0 * 12.0).abs() < 1e-6);
        assert_eq!(points[0].confidence, 90.0);
        assert_eq!(points[2].confidence, 80.0);
        assert!(points[0].assumptions[0].contains("10.00%"));
    }

    #[test]
    fn confidence_floors_at_fifty() {
        let config = ForecastConfig::default();
        let history = vec![obs(1, 500.0), obs(2, 520.0)];

        let points = ForecastEngine::new(&config).project(&history, 24);

        assert_eq!(points.last().unwrap().confidence, 50.0);
        assert_eq!(points[8].confidence, 50.0);
    }

    #[test]
    fn single_observation_projects_flat_with_zero_band() {
        let config = ForecastConfig::default();
        let points = ForecastEngine::new(&config).project(&[obs(6, 750.0)], 2);

        assert_eq!(points[1].projected_mrr, 750.0);
        assert_eq!(points[1].lower_bound, 750.0);
        assert_eq!(points[1].upper_bound, 750.0);
    }

    #[test]
    fn empty_history_projects_nothing() {
        let config = ForecastConfig::default();
        assert!(ForecastEngine::new(&config).project(&[], 6).is_empty());
    }

    #[test]
    fn flat_fallback_uses_configured_rate() {
        let config = ForecastConfig::default();
        let as_of = NaiveDate::from_ymd_opt(2024, 12, 15).unwrap();

        let points = ForecastEngine::new(&config).project_flat(as_of, 1000.0, 3);

        assert_eq!(points[0].period, "2025-01");
        assert!((points[0].projected_mrr - 1050.0).abs() < 1e-9);
        assert!((points[1].projected_mrr - 1102.5).abs() < 1e-9);
        assert_eq!(points[0].confidence, 65.0);
        assert!(points[0].lower_bound < points[0].projected_mrr);
        assert!(points[0].assumptions[0].starts_with("No history available"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Bounds bracket the projection and confidence never rises.
        #[test]
        fn bounds_bracket_and_confidence_decays(
            series in prop::collection::vec(0.0f64..1_000_000.0, 1..12),
            horizon in 1u32..36,
        ) {
            let config = ForecastConfig::default();
            let history: Vec<MrrObservation> = series
                .iter()
                .enumerate()
                .map(|(i, m)| MrrObservation {
                    date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + chrono::Duration::days(31 * i as i64),
                    mrr: *m,
                })
                .collect();

            let points = ForecastEngine::new(&config).project(&history, horizon);
            prop_assert_eq!(points.len(), horizon as usize);

            for p in &points {
                prop_assert!(p.lower_bound >= 0.0);
                prop_assert!(p.lower_bound <= p.projected_mrr);
                prop_assert!(p.projected_mrr <= p.upper_bound);
                prop_assert!(p.confidence >= config.confidence_floor);
            }
            for w in points.windows(2) {
                prop_assert!(w[1].confidence <= w[0].confidence);
            }
        }
    }
}
