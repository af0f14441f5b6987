//! Token Candidate Model
//!
//! The canonical in-flight record for one discovered token. Discovery feeds
//! hand over loosely-typed JSON records; the aggregator normalizes them into
//! this strict shape exactly once, and every downstream stage consumes only
//! this shape.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw, unstructured token record as produced by a discovery feed.
///
/// The pipeline never assumes a fixed schema beyond the field-name fallback
/// chains applied at ingestion.
pub type RawTokenRecord = serde_json::Map<String, serde_json::Value>;

/// Which discovery feed produced or corroborated a candidate.
///
/// Priority order (highest first) decides field conflicts when the same
/// address arrives from multiple feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Aggregated market-data API (prices, liquidity, volume).
    MarketFeed,
    /// Realtime launch event stream (websocket style).
    RealtimeStream,
    /// Historical on-chain scan.
    ChainScan,
}

impl SourceKind {
    /// Merge priority; lower wins conflicts.
    pub fn priority(&self) -> u8 {
        match self {
            SourceKind::MarketFeed => 0,
            SourceKind::RealtimeStream => 1,
            SourceKind::ChainScan => 2,
        }
    }

    /// Stable tag used for `source_tags` and provenance bookkeeping.
    pub fn tag(&self) -> &'static str {
        match self {
            SourceKind::MarketFeed => "market_feed",
            SourceKind::RealtimeStream => "realtime_stream",
            SourceKind::ChainScan => "chain_scan",
        }
    }
}

/// A raw timestamp-like signal collected at ingestion, resolved later by the
/// age resolver. Numbers may be ms epochs, second epochs or legacy minutes;
/// strings may be duration expressions or calendar dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgeHint {
    Number(f64),
    Text(String),
}

/// Partial field set produced by one enrichment call.
///
/// Applying an update augments a candidate: `Some` values land, `None`
/// values never erase what is already known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateUpdate {
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_usd: Option<f64>,
    pub holders: Option<u64>,
    pub verified: Option<bool>,
    pub onchain_created_at: Option<DateTime<Utc>>,
    pub age_hints: Vec<AgeHint>,
}

impl CandidateUpdate {
    /// True when the update carries no information at all.
    pub fn is_empty(&self) -> bool {
        self.price_usd.is_none()
            && self.market_cap_usd.is_none()
            && self.liquidity_usd.is_none()
            && self.volume_usd.is_none()
            && self.holders.is_none()
            && self.verified.is_none()
            && self.onchain_created_at.is_none()
            && self.age_hints.is_empty()
    }
}

/// Canonical candidate record, keyed by normalized address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenCandidate {
    /// Chain-native address, whitespace-trimmed, original casing preserved.
    /// Compared case-insensitively everywhere.
    pub address: String,
    /// Discovery feeds that produced or corroborated this candidate.
    pub source_tags: BTreeSet<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_usd: Option<f64>,
    pub holders: Option<u64>,
    /// Canonical reconciled age in fractional seconds. Never truncated to
    /// whole seconds; sub-minute precision matters for listing detection.
    pub age_seconds: Option<f64>,
    pub freshness_score: Option<f64>,
    pub verified: Option<bool>,
    /// On-chain creation timestamp, when a feed supplied direct evidence.
    pub onchain_created_at: Option<DateTime<Utc>>,
    /// Unresolved timestamp signals, in ingestion order.
    pub age_hints: Vec<AgeHint>,
    /// Per-field provenance (field name -> source tag). Diagnostics only,
    /// never consulted by filtering.
    pub raw_by_field: BTreeMap<String, String>,
}

impl TokenCandidate {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Case-insensitive lookup key for this candidate's address.
    pub fn key(&self) -> String {
        self.address.to_ascii_lowercase()
    }

    /// Whether any feed supplied direct on-chain creation evidence.
    pub fn has_onchain_evidence(&self) -> bool {
        self.onchain_created_at.is_some()
    }

    pub fn tag_source(&mut self, kind: SourceKind) {
        self.source_tags.insert(kind.tag().to_string());
    }

    /// Fill-only merge used during aggregation: a field already known is
    /// never replaced, incoming non-null values only land in empty slots.
    /// Source tags accumulate; age hints append.
    pub fn merge_fill(&mut self, other: TokenCandidate) {
        fill(&mut self.symbol, other.symbol);
        fill(&mut self.name, other.name);
        fill(&mut self.price_usd, other.price_usd);
        fill(&mut self.market_cap_usd, other.market_cap_usd);
        fill(&mut self.liquidity_usd, other.liquidity_usd);
        fill(&mut self.volume_usd, other.volume_usd);
        fill(&mut self.holders, other.holders);
        fill(&mut self.age_seconds, other.age_seconds);
        fill(&mut self.verified, other.verified);
        fill(&mut self.onchain_created_at, other.onchain_created_at);
        self.source_tags.extend(other.source_tags);
        self.age_hints.extend(other.age_hints);
        for (field, tag) in other.raw_by_field {
            self.raw_by_field.entry(field).or_insert(tag);
        }
    }

    /// Apply an enrichment result. Fresh non-null values overwrite, null
    /// values never regress a known field.
    pub fn apply_update(&mut self, update: &CandidateUpdate) {
        overwrite(&mut self.price_usd, update.price_usd);
        overwrite(&mut self.market_cap_usd, update.market_cap_usd);
        overwrite(&mut self.liquidity_usd, update.liquidity_usd);
        overwrite(&mut self.volume_usd, update.volume_usd);
        overwrite(&mut self.holders, update.holders);
        overwrite(&mut self.verified, update.verified);
        overwrite(&mut self.onchain_created_at, update.onchain_created_at);
        self.age_hints.extend(update.age_hints.iter().cloned());
    }
}

fn fill<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if slot.is_none() {
        *slot = incoming;
    }
}

fn overwrite<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// Normalize a raw address string: trim whitespace, reject empty or
/// obviously malformed values. Original casing is preserved; callers compare
/// via [`TokenCandidate::key`]. Base58 alphabet violations are rejected so a
/// junk record cannot poison the candidate set.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 64 {
        return None;
    }
    // Hex addresses (0x...) pass through; everything else must be base58.
    if !trimmed.starts_with("0x") && bs58::decode(trimmed).into_vec().is_err() {
        return None;
    }
    Some(trimmed.to_string())
}
