//! metrics-runner: headless revenue metrics runner.
//!
//! Generates a seeded synthetic customer base, computes one MONTHLY
//! snapshot per month, then prints the forecast and NRR.
//!
//! Usage:
//!   metrics-runner --seed 12345 --months 18 --db metrics.db
//!   metrics-runner --seed 7 --start 2024-01-01 --horizon 6 --json

use anyhow::Result;
use chrono::{Datelike, Duration, Months, NaiveDate};
use revmetrics_core::{
    clock::{Clock, FixedClock},
    config::MetricsConfig,
    engine::MetricsEngine,
    entity::EntityLedger,
    forecast::ForecastPoint,
    period::Period,
    population::{PopulationConfig, PopulationGenerator},
    retention::RetentionReport,
    snapshot::RevenueMetricSnapshot,
    store::{MetricsSnapshotStore, MetricsStore},
};
use std::env;
use std::path::Path;
use std::rc::Rc;

#[derive(serde::Serialize)]
struct RunReport<'a> {
    seed:      u64,
    months:    u32,
    snapshots: &'a [RevenueMetricSnapshot],
    forecast:  &'a [ForecastPoint],
    retention: &'a RetentionReport,
}

type Engine = MetricsEngine<EntityLedger, MetricsStore, Rc<FixedClock>>;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let months = parse_arg(&args, "--months", 12u32);
    let horizon = parse_arg(&args, "--horizon", 6u32);
    let start = parse_arg(
        &args,
        "--start",
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
    );
    let json = args.iter().any(|a| a == "--json");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    if !json {
        println!("Revenue metrics: metrics-runner");
        println!("  seed:      {seed}");
        println!("  months:    {months}");
        println!("  start:     {start}");
        println!("  horizon:   {horizon}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = load_config(data_dir)?;
    let nrr_months = parse_arg(&args, "--nrr-months", config.nrr_default_months);

    let store = if db == ":memory:" {
        MetricsStore::in_memory()?
    } else {
        MetricsStore::open(db)?
    };
    store.migrate()?;

    let ledger = PopulationGenerator::new(seed, PopulationConfig::default()).generate(start, months)?;
    let clock = Rc::new(FixedClock::new(start));
    let engine: Engine = MetricsEngine::with_clock(config, ledger, store, Rc::clone(&clock));

    let snapshots = run_months(&engine, &clock, start, months)?;
    let forecast = engine.get_forecast(horizon)?;
    let retention = engine.retention_report(nrr_months)?;

    if json {
        let report = RunReport {
            seed,
            months,
            snapshots: &snapshots,
            forecast: &forecast,
            retention: &retention,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&engine, &snapshots, &forecast, &retention, nrr_months)?;
    }

    Ok(())
}

/// Built-in defaults only when the data directory is absent; a present
/// but unreadable, malformed or invalid config is an error.
fn load_config(data_dir: &str) -> Result<MetricsConfig> {
    if !Path::new(data_dir).exists() {
        log::warn!("data dir {data_dir} not found; using built-in defaults");
        return Ok(MetricsConfig::default_test());
    }
    MetricsConfig::load(data_dir)
}

/// Step the clock to each month end and compute that month's snapshot.
fn run_months(
    engine: &Engine,
    clock: &FixedClock,
    start: NaiveDate,
    months: u32,
) -> Result<Vec<RevenueMetricSnapshot>> {
    let mut snapshots = Vec::with_capacity(months as usize);
    let first = start.with_day(1).unwrap_or(start);
    for m in 0..months {
        let Some(next) = first.checked_add_months(Months::new(m + 1)) else {
            break;
        };
        let month_end = next - Duration::days(1);
        clock.set(month_end);
        snapshots.push(engine.compute_snapshot(month_end, Period::Monthly)?);
    }
    Ok(snapshots)
}

fn print_summary(
    engine: &Engine,
    snapshots: &[RevenueMetricSnapshot],
    forecast: &[ForecastPoint],
    retention: &RetentionReport,
    nrr_months: u32,
) -> Result<()> {
    println!("=== MONTHLY SNAPSHOTS ===");
    println!(
        "  {:<10} {:>12} {:>10} {:>10} {:>10} {:>10} {:>7} {:>5} {:>5}",
        "month", "mrr", "new", "expand", "contract", "churn", "cust", "+", "-"
    );
    for s in snapshots {
        println!(
            "  {:<10} {:>12.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>7} {:>5} {:>5}",
            s.date,
            s.mrr,
            s.new_mrr,
            s.expansion_mrr,
            s.contraction_mrr,
            s.churn_mrr,
            s.total_customers,
            s.new_customers,
            s.churned_customers
        );
    }

    if let Some(last) = snapshots.last() {
        println!();
        println!("=== LATEST ({}) ===", last.date);
        println!("  arr:            {:.2}", last.arr);
        println!("  arpu:           {:.2}", last.arpu);
        println!("  ltv:            {:.2}", last.ltv);
        for (plan, entry) in &last.by_plan {
            println!(
                "  {:<14}  {:>5} customers  {:>12.2}  {:>6.2}%",
                engine.config().plan_label(*plan),
                entry.count,
                entry.mrr,
                entry.percentage
            );
        }
        for (region, entry) in &last.by_region {
            println!(
                "  {:<14}  {:>5} customers  {:>12.2}  {:>6.2}%",
                region, entry.count, entry.mrr, entry.percentage
            );
        }
    }

    println!();
    println!("=== FORECAST ===");
    if forecast.is_empty() {
        println!("  (No forecast requested)");
    }
    for p in forecast {
        println!(
            "  {}  mrr {:>12.2}  [{:>12.2} .. {:>12.2}]  confidence {:>5.1}",
            p.period, p.projected_mrr, p.lower_bound, p.upper_bound, p.confidence
        );
    }

    println!();
    println!("=== RETENTION ({nrr_months} months to {}) ===", engine.clock().today());
    println!("  cohort size:    {}", retention.cohort_size);
    println!("  retained:       {}", retention.retained_customers);
    println!("  nrr:            {:.2}%", retention.net_revenue_retention);
    println!("  grr:            {:.2}%", retention.gross_revenue_retention);

    println!();
    println!("  stored snapshots: {}", engine.store().snapshot_count()?);
    println!("  audit events:     {}", engine.store().event_count()?);
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("metrics-runner-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("pricing")).unwrap();
        fs::create_dir_all(dir.join("metrics")).unwrap();
        fs::write(
            dir.join("metrics/metrics_config.json"),
            r#"{ "ltv_lifespan_months": 24 }"#,
        )
        .unwrap();
        dir
    }

    #[test]
    fn missing_data_dir_uses_defaults() {
        let dir = env::temp_dir().join(format!("metrics-runner-absent-{}", std::process::id()));
        let config = load_config(dir.to_str().unwrap()).unwrap();
        assert_eq!(config.ltv_lifespan_months, MetricsConfig::default_test().ltv_lifespan_months);
    }

    #[test]
    fn invalid_pricing_in_present_dir_is_an_error() {
        let dir = scratch_dir("negative");
        fs::write(
            dir.join("pricing/pricing_table.json"),
            r#"{ "plans": [ { "plan": "PROFESSIONAL", "label": "Pro", "monthly": -100, "yearly": 0 } ] }"#,
        )
        .unwrap();

        let err = load_config(dir.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("negative price"), "{err}");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_pricing_in_present_dir_is_an_error() {
        let dir = scratch_dir("malformed");
        fs::write(dir.join("pricing/pricing_table.json"), "{ not json").unwrap();

        assert!(load_config(dir.to_str().unwrap()).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn shipped_data_dir_loads() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../data");
        let config = load_config(dir.to_str().unwrap()).unwrap();
        config.validate().unwrap();
    }
}
