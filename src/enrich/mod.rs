//! Enrichment Logic
//!
//! Age reconciliation and freshness scoring, both pure functions over
//! candidate state.

pub mod age;
pub mod freshness;

pub use age::{parse_duration_expr, resolve_age, resolve_age_from_hints};
pub use freshness::{FreshnessScorer, FreshnessWeights};
