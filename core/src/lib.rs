//! revmetrics-core: MRR decomposition, breakdowns, retention and
//! forecasting over a customer base supplied by an external provider.

pub mod breakdown;
pub mod clock;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod forecast;
pub mod mrr;
pub mod period;
pub mod population;
pub mod pricing;
pub mod retention;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod types;
