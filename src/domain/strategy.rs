//! Strategy Configuration
//!
//! User-supplied predicate configuration for one filtering pass. Treated as
//! an immutable value object; tightening any single threshold can only
//! shrink the surviving set.

use serde::{Deserialize, Serialize};

use crate::enrich::age::parse_duration_expr;
use crate::ports::enrichment::EnrichField;

use super::candidate::TokenCandidate;

/// Minimum-age threshold. Legacy feeds write plain numbers (minutes);
/// newer configs use duration strings like `"2h"` or `"90s"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MinAge {
    Minutes(f64),
    Expr(String),
}

impl MinAge {
    /// Resolved threshold in fractional seconds. Unparseable expressions
    /// behave like "no threshold".
    pub fn as_seconds(&self) -> Option<f64> {
        match self {
            MinAge::Minutes(m) if m.is_finite() && *m >= 0.0 => Some(m * 60.0),
            MinAge::Minutes(_) => None,
            MinAge::Expr(s) => parse_duration_expr(s),
        }
    }
}

/// Per-user strategy predicate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Reject candidates priced below this (missing price counts as 0).
    pub min_price: Option<f64>,
    /// Reject candidates priced above this.
    pub max_price: Option<f64>,
    pub min_market_cap: Option<f64>,
    pub min_liquidity: Option<f64>,
    pub min_volume: Option<f64>,
    pub min_holders: Option<u64>,
    /// Minutes or a duration string. Unknown age is rejected only when the
    /// resolved threshold is at least 60 seconds.
    pub min_age: Option<MinAge>,
    pub min_freshness_score: Option<f64>,
    /// Require direct on-chain creation evidence.
    pub require_onchain: bool,
    pub only_verified: bool,
    /// A disabled strategy rejects everything.
    pub enabled: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_price: None,
            max_price: None,
            min_market_cap: None,
            min_liquidity: None,
            min_volume: None,
            min_holders: None,
            min_age: None,
            min_freshness_score: None,
            require_onchain: false,
            only_verified: false,
            enabled: true,
        }
    }
}

impl StrategyConfig {
    pub fn min_age_seconds(&self) -> Option<f64> {
        self.min_age.as_ref().and_then(MinAge::as_seconds)
    }

    /// Whether this strategy demands fields that discovery feeds are
    /// unlikely to have supplied, i.e. whether selective enrichment is
    /// worth a network round trip at all.
    pub fn needs_enrichment(&self) -> bool {
        self.min_liquidity.is_some()
            || self.min_volume.is_some()
            || self.min_age.is_some()
            || self.require_onchain
    }

    /// Fields still missing on `candidate` that this strategy will check.
    /// Age is only requested when neither a canonical value nor any raw
    /// hint is available locally.
    pub fn requested_fields(&self, candidate: &TokenCandidate) -> Vec<EnrichField> {
        let mut fields = Vec::new();
        if self.min_liquidity.is_some() && candidate.liquidity_usd.is_none() {
            fields.push(EnrichField::Liquidity);
        }
        if self.min_volume.is_some() && candidate.volume_usd.is_none() {
            fields.push(EnrichField::Volume);
        }
        if self.min_market_cap.is_some() && candidate.market_cap_usd.is_none() {
            fields.push(EnrichField::MarketCap);
        }
        if (self.min_price.is_some() || self.max_price.is_some())
            && candidate.price_usd.is_none()
        {
            fields.push(EnrichField::Price);
        }
        if self.min_holders.is_some() && candidate.holders.is_none() {
            fields.push(EnrichField::Holders);
        }
        if self.min_age.is_some()
            && candidate.age_seconds.is_none()
            && candidate.age_hints.is_empty()
        {
            fields.push(EnrichField::Age);
        }
        if self.require_onchain && !candidate.has_onchain_evidence() {
            fields.push(EnrichField::OnchainEvidence);
        }
        if self.only_verified && candidate.verified.is_none() {
            fields.push(EnrichField::Verified);
        }
        fields
    }

    pub fn with_min_liquidity(mut self, min: f64) -> Self {
        self.min_liquidity = Some(min);
        self
    }

    pub fn with_min_volume(mut self, min: f64) -> Self {
        self.min_volume = Some(min);
        self
    }

    pub fn with_min_age_minutes(mut self, minutes: f64) -> Self {
        self.min_age = Some(MinAge::Minutes(minutes));
        self
    }

    pub fn with_min_freshness(mut self, score: f64) -> Self {
        self.min_freshness_score = Some(score);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
