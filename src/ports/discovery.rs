//! Discovery Port
//!
//! Abstraction over new-token discovery feeds. Each source returns raw
//! JSON records; schema normalization is the aggregator's job, so adding a
//! feed never touches domain code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::candidate::{RawTokenRecord, SourceKind};

/// Errors from discovery sources.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Fetch hints passed to every source.
#[derive(Debug, Clone)]
pub struct DiscoveryParams {
    /// Soft cap on records per fetch.
    pub limit: usize,
    /// Skip listings older than this, when the source can filter upstream.
    pub newer_than: Option<DateTime<Utc>>,
}

impl Default for DiscoveryParams {
    fn default() -> Self {
        Self {
            limit: 50,
            newer_than: None,
        }
    }
}

/// One discovery feed.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Human-readable source name for logging.
    fn name(&self) -> &str;

    /// Feed class, which fixes merge priority during aggregation.
    fn kind(&self) -> SourceKind;

    /// Fetch the latest raw token records.
    async fn fetch_candidates(
        &self,
        params: &DiscoveryParams,
    ) -> Result<Vec<RawTokenRecord>, DiscoveryError>;
}
