//! Token Scout - New Listing Discovery and Filtering Library
//!
//! Discovers newly listed tokens across heterogeneous feeds, reconciles them
//! into canonical candidates, selectively enriches the fields a strategy
//! actually checks, and filters the result.
//!
//! # Modules
//!
//! - `domain`: Core business logic (TokenCandidate, CandidateAggregator, StrategyConfig)
//! - `ports`: Trait abstractions (DiscoverySource, Enricher)
//! - `pipeline`: Shared plumbing (TtlCache, HostRateLimiter, RetryExecutor, DedupeStore, EnrichmentQueue)
//! - `enrich`: Age resolution and freshness scoring
//! - `strategy`: The three-stage strategy filter
//! - `adapters`: External implementations (DexScreener, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: The scan pipeline orchestrator

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod enrich;
pub mod pipeline;
pub mod ports;
pub mod strategy;
