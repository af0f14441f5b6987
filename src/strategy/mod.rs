//! Strategy Layer - Candidate filtering
//!
//! The three-stage filter that turns aggregated candidates into accepted
//! picks under a user strategy.

pub mod filter;

pub use filter::{prefilter_pass, FilterConfig, StrategyFilter};
