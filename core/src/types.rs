//! Shared primitive types used across the metrics engine.

/// Money in minor currency units (cents). All decomposition arithmetic
/// happens in this unit; conversion to dollars is done once, when a
/// snapshot is formatted.
pub type Cents = i64;

/// A stable, opaque identifier for a billable entity.
pub type EntityId = String;

/// Signup-month key, formatted `YYYY-MM`.
pub type CohortKey = String;

/// Region label used when an entity carries none.
pub const UNKNOWN_REGION: &str = "Unknown";

/// Convert cents to major currency units.
pub fn to_major(amount: Cents) -> f64 {
    amount as f64 / 100.0
}
