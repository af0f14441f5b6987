//! Candidate Aggregator
//!
//! Merges token lists from the discovery sources (market-data feed, realtime
//! event stream, historical chain scan) into one deduplicated candidate set
//! keyed by normalized address. Field-name fallback chains are applied here,
//! once, so every downstream component consumes only the strict
//! [`TokenCandidate`] shape.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

use super::candidate::{
    normalize_address, AgeHint, RawTokenRecord, SourceKind, TokenCandidate,
};

/// One discovery source's output for a single aggregation pass.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub kind: SourceKind,
    pub records: Vec<RawTokenRecord>,
}

/// Fallback chains for the fields the pipeline understands. The same logical
/// field hides under many key names across feeds; the first present,
/// parseable key wins.
const ADDRESS_KEYS: &[&str] = &["address", "mint", "tokenAddress", "token_address", "ca"];
const SYMBOL_KEYS: &[&str] = &["symbol", "ticker", "baseSymbol"];
const NAME_KEYS: &[&str] = &["name", "tokenName"];
const PRICE_KEYS: &[&str] = &["priceUsd", "price_usd", "price"];
const MARKET_CAP_KEYS: &[&str] = &["marketCapUsd", "market_cap", "marketCap", "mcap", "fdv"];
const LIQUIDITY_KEYS: &[&str] = &["liquidityUsd", "liquidity_usd", "liquidity", "liq"];
const VOLUME_KEYS: &[&str] = &["volumeUsd", "volume_usd", "volume24h", "volume_24h", "volume"];
const HOLDERS_KEYS: &[&str] = &["holders", "holderCount", "holder_count"];
const VERIFIED_KEYS: &[&str] = &["verified", "isVerified", "is_verified"];
const ONCHAIN_TS_KEYS: &[&str] = &["blockTime", "block_time", "mintedAt", "onchainCreatedAt"];
const AGE_KEYS: &[&str] = &[
    "ageMs",
    "age_ms",
    "pairCreatedAt",
    "createdAt",
    "created_at",
    "creationTime",
    "creation_time",
    "listedAt",
    "listed_at",
    "openTime",
    "firstSeen",
    "age",
    "ageMinutes",
    "age_minutes",
];

/// Merges loosely-typed source batches into an ordered candidate set.
#[derive(Debug, Clone)]
pub struct CandidateAggregator {
    /// Drop obvious non-candidates (stablecoins, wrapped majors) by symbol.
    screen_symbols: bool,
}

impl Default for CandidateAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateAggregator {
    pub fn new() -> Self {
        Self {
            screen_symbols: true,
        }
    }

    pub fn without_symbol_screening(mut self) -> Self {
        self.screen_symbols = false;
        self
    }

    /// Merge batches into one deduplicated set. Batches are processed in
    /// source-priority order, so "first non-null wins" also means "higher
    /// priority source wins on conflict". Insertion order of first sighting
    /// is preserved in the output.
    pub fn aggregate(&self, mut batches: Vec<SourceBatch>) -> Vec<TokenCandidate> {
        batches.sort_by_key(|b| b.kind.priority());

        let mut ordered: Vec<TokenCandidate> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for batch in batches {
            for record in &batch.records {
                let Some(candidate) = self.ingest(record, batch.kind) else {
                    continue;
                };
                let key = candidate.key();
                match index.get(&key) {
                    Some(&i) => ordered[i].merge_fill(candidate),
                    None => {
                        index.insert(key, ordered.len());
                        ordered.push(candidate);
                    }
                }
            }
        }

        debug!(candidates = ordered.len(), "aggregation pass complete");
        ordered
    }

    /// Normalize one raw record into a candidate. Malformed values are
    /// treated as absent fields, never as errors.
    fn ingest(&self, record: &RawTokenRecord, kind: SourceKind) -> Option<TokenCandidate> {
        let raw_address = first_string(record, ADDRESS_KEYS)?;
        let address = normalize_address(&raw_address)?;

        let symbol = first_string(record, SYMBOL_KEYS);
        if self.screen_symbols {
            if let Some(sym) = &symbol {
                if is_stablecoin(sym) || is_wrapped_major(sym) {
                    return None;
                }
            }
        }

        let mut candidate = TokenCandidate::new(address);
        candidate.tag_source(kind);
        let tag = kind.tag();

        let mut set_field =
            |candidate: &mut TokenCandidate, field: &str| {
                candidate
                    .raw_by_field
                    .insert(field.to_string(), tag.to_string());
            };

        if let Some(sym) = symbol {
            candidate.symbol = Some(sym);
            set_field(&mut candidate, "symbol");
        }
        if let Some(name) = first_string(record, NAME_KEYS) {
            candidate.name = Some(name);
            set_field(&mut candidate, "name");
        }
        if let Some(v) = first_number(record, PRICE_KEYS) {
            candidate.price_usd = Some(v);
            set_field(&mut candidate, "price_usd");
        }
        if let Some(v) = first_number(record, MARKET_CAP_KEYS) {
            candidate.market_cap_usd = Some(v);
            set_field(&mut candidate, "market_cap_usd");
        }
        if let Some(v) = first_number(record, LIQUIDITY_KEYS) {
            candidate.liquidity_usd = Some(v);
            set_field(&mut candidate, "liquidity_usd");
        }
        if let Some(v) = first_number(record, VOLUME_KEYS) {
            candidate.volume_usd = Some(v);
            set_field(&mut candidate, "volume_usd");
        }
        if let Some(v) = first_number(record, HOLDERS_KEYS) {
            if v.is_finite() && v >= 0.0 {
                candidate.holders = Some(v as u64);
                set_field(&mut candidate, "holders");
            }
        }
        if let Some(v) = first_bool(record, VERIFIED_KEYS) {
            candidate.verified = Some(v);
            set_field(&mut candidate, "verified");
        }
        if let Some(ts) = first_number(record, ONCHAIN_TS_KEYS).and_then(epoch_to_datetime) {
            candidate.onchain_created_at = Some(ts);
            set_field(&mut candidate, "onchain_created_at");
        }

        for key in AGE_KEYS {
            match record.get(*key) {
                Some(Value::Number(n)) => {
                    if let Some(f) = n.as_f64() {
                        candidate.age_hints.push(AgeHint::Number(f));
                    }
                }
                Some(Value::String(s)) if !s.trim().is_empty() => {
                    // Numeric strings are still numbers to a legacy feed.
                    match s.trim().parse::<f64>() {
                        Ok(f) => candidate.age_hints.push(AgeHint::Number(f)),
                        Err(_) => candidate.age_hints.push(AgeHint::Text(s.clone())),
                    }
                }
                _ => {}
            }
        }

        Some(candidate)
    }
}

/// First present string value along a fallback chain.
fn first_string(record: &RawTokenRecord, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = record.get(*key) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// First present, parseable numeric value along a fallback chain. Numbers
/// encoded as strings are accepted; anything unparseable is skipped.
fn first_number(record: &RawTokenRecord, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match record.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(f) = n.as_f64() {
                    if f.is_finite() {
                        return Some(f);
                    }
                }
            }
            Some(Value::String(s)) => {
                if let Ok(f) = s.trim().parse::<f64>() {
                    if f.is_finite() {
                        return Some(f);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn first_bool(record: &RawTokenRecord, keys: &[&str]) -> Option<bool> {
    for key in keys {
        match record.get(*key) {
            Some(Value::Bool(b)) => return Some(*b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => return Some(true),
                "false" => return Some(false),
                _ => {}
            },
            _ => {}
        }
    }
    None
}

/// Interpret an epoch number as a UTC timestamp (ms above 1e12, seconds
/// above 1e9, otherwise not a timestamp).
fn epoch_to_datetime(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    if value > 1e12 {
        Utc.timestamp_millis_opt(value as i64).single()
    } else if value > 1e9 {
        Utc.timestamp_millis_opt((value * 1000.0) as i64).single()
    } else {
        None
    }
}

fn is_stablecoin(symbol: &str) -> bool {
    let stable_symbols = ["USDC", "USDT", "BUSD", "DAI", "TUSD", "USDP", "FRAX"];
    let upper = symbol.to_uppercase();
    stable_symbols.iter().any(|s| upper.contains(s))
}

fn is_wrapped_major(symbol: &str) -> bool {
    let upper = symbol.to_uppercase();
    symbol.starts_with(['w', 'W'])
        && (upper.contains("BTC") || upper.contains("ETH") || upper.contains("SOL"))
}
