//! Domain Layer - Core business logic for the discovery pipeline
//!
//! Pure domain types and logic with no hidden external dependencies. All
//! network interactions happen through the ports layer.

pub mod aggregator;
pub mod candidate;
pub mod strategy;

pub use aggregator::{CandidateAggregator, SourceBatch};
pub use candidate::{
    normalize_address, AgeHint, CandidateUpdate, RawTokenRecord, SourceKind, TokenCandidate,
};
pub use strategy::{MinAge, StrategyConfig};
