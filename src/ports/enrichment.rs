//! Enrichment Port
//!
//! Abstraction over per-token detail lookups. Adapters fetch only what a
//! strategy actually needs, expressed as a requested-field list.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::candidate::CandidateUpdate;
use crate::pipeline::retry::Retryable;

/// Errors from enrichment adapters.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("http status {status}")]
    Http {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("parse error: {0}")]
    Parse(String),
}

impl Retryable for EnrichError {
    fn is_retryable(&self) -> bool {
        match self {
            EnrichError::Network(_) | EnrichError::Timeout => true,
            EnrichError::Http { status, .. } => *status == 429 || *status >= 500,
            EnrichError::Parse(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            EnrichError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A field a strategy wants resolved before final filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichField {
    Price,
    MarketCap,
    Liquidity,
    Volume,
    Holders,
    Age,
    OnchainEvidence,
    Verified,
}

/// Per-token detail lookup.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Fetch the requested fields for `address`. Fields the upstream cannot
    /// provide are simply absent from the returned update.
    async fn enrich(
        &self,
        address: &str,
        requested: &[EnrichField],
    ) -> Result<CandidateUpdate, EnrichError>;
}
