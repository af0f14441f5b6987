//! Strategy Filter
//!
//! Three-stage filtering over aggregated candidates: a cheap prefilter on
//! locally known fields, selective enrichment for the survivors that still
//! miss strategy-relevant data, then the authoritative final pass. Input
//! order is preserved end to end; enrichment failures degrade a candidate
//! to its known fields instead of erroring the whole run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::candidate::TokenCandidate;
use crate::domain::strategy::StrategyConfig;
use crate::enrich::age::resolve_age;
use crate::enrich::freshness::FreshnessScorer;
use crate::pipeline::queue::{EnrichmentJob, EnrichmentQueue, JobOutcome};

/// Unknown age only rejects when the requested threshold is at least this
/// many seconds. Looser thresholds give brand-new listings the benefit of
/// the doubt.
const UNKNOWN_AGE_REJECT_FLOOR: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Enrichment budget per run; survivors past this count skip straight
    /// to the final pass with whatever fields they have.
    pub candidate_limit: usize,
    /// Wall-clock budget for one candidate's enrichment result.
    pub item_timeout: Duration,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 8,
            item_timeout: Duration::from_secs(2),
        }
    }
}

pub struct StrategyFilter {
    queue: Arc<EnrichmentQueue>,
    scorer: FreshnessScorer,
    config: FilterConfig,
}

impl StrategyFilter {
    pub fn new(queue: Arc<EnrichmentQueue>, scorer: FreshnessScorer, config: FilterConfig) -> Self {
        Self {
            queue,
            scorer,
            config,
        }
    }

    /// Run the full filter over `candidates`. Returns the accepted subset
    /// in the original order.
    pub async fn run(
        &self,
        candidates: Vec<TokenCandidate>,
        strategy: &StrategyConfig,
        now: DateTime<Utc>,
    ) -> Vec<TokenCandidate> {
        if !strategy.enabled {
            debug!("filter: strategy disabled, rejecting all {} candidates", candidates.len());
            return Vec::new();
        }

        let total = candidates.len();
        let mut survivors: Vec<TokenCandidate> = candidates
            .into_iter()
            .filter(|c| prefilter_pass(c, strategy))
            .collect();
        debug!("filter: prefilter kept {}/{total}", survivors.len());

        if strategy.needs_enrichment() {
            self.enrich_top(&mut survivors, strategy).await;
        }

        let accepted: Vec<TokenCandidate> = survivors
            .into_iter()
            .filter_map(|mut c| {
                if self.final_pass(&mut c, strategy, now) {
                    Some(c)
                } else {
                    None
                }
            })
            .collect();
        info!("filter: accepted {}/{total} candidates", accepted.len());
        accepted
    }

    /// Enrich survivors inside the positional window: the first
    /// `candidate_limit` survivors count against the budget whether or not
    /// they need fields filled, and anything past the window keeps its known
    /// fields. Results are awaited concurrently; a skipped, failed or
    /// timed-out job leaves its candidate unchanged.
    async fn enrich_top(&self, survivors: &mut [TokenCandidate], strategy: &StrategyConfig) {
        let mut join_set: JoinSet<(usize, Option<JobOutcome>)> = JoinSet::new();

        for (idx, candidate) in survivors.iter().enumerate() {
            if idx >= self.config.candidate_limit {
                break;
            }
            let requested = strategy.requested_fields(candidate);
            if requested.is_empty() {
                continue;
            }

            let ticket = self
                .queue
                .enqueue(EnrichmentJob::new(candidate.address.clone(), requested))
                .await;
            let timeout = self.config.item_timeout;
            join_set.spawn(async move {
                match tokio::time::timeout(timeout, ticket.wait()).await {
                    Ok(outcome) => (idx, Some(outcome)),
                    Err(_) => (idx, None),
                }
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let Ok((idx, outcome)) = joined else { continue };
            let address = &survivors[idx].address;
            match outcome {
                Some(JobOutcome::Completed(update)) => {
                    survivors[idx].apply_update(&update);
                }
                Some(JobOutcome::Skipped { reason }) => {
                    debug!("filter: enrichment skipped for {address}: {reason}");
                }
                Some(JobOutcome::Failed { error }) => {
                    warn!("filter: enrichment failed for {address}: {error}");
                }
                None => {
                    warn!("filter: enrichment timed out for {address}");
                }
            }
        }
    }

    /// Authoritative predicate over the (possibly enriched) candidate.
    /// Missing numeric fields default to zero here; only the age gate has
    /// a permissive unknown rule.
    fn final_pass(
        &self,
        candidate: &mut TokenCandidate,
        strategy: &StrategyConfig,
        now: DateTime<Utc>,
    ) -> bool {
        if candidate.age_seconds.is_none() {
            candidate.age_seconds = resolve_age(candidate, now);
        }
        let score = self.scorer.score_candidate(candidate);
        candidate.freshness_score = Some(score);

        let price = candidate.price_usd.unwrap_or(0.0);
        if strategy.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if strategy.max_price.is_some_and(|max| price > max) {
            return false;
        }
        if strategy
            .min_market_cap
            .is_some_and(|min| candidate.market_cap_usd.unwrap_or(0.0) < min)
        {
            return false;
        }
        if strategy
            .min_liquidity
            .is_some_and(|min| candidate.liquidity_usd.unwrap_or(0.0) < min)
        {
            return false;
        }
        if strategy
            .min_volume
            .is_some_and(|min| candidate.volume_usd.unwrap_or(0.0) < min)
        {
            return false;
        }
        if strategy
            .min_holders
            .is_some_and(|min| candidate.holders.unwrap_or(0) < min)
        {
            return false;
        }
        if let Some(min_age) = strategy.min_age_seconds() {
            match candidate.age_seconds {
                Some(age) if age < min_age => return false,
                Some(_) => {}
                None if min_age >= UNKNOWN_AGE_REJECT_FLOOR => return false,
                None => {}
            }
        }
        if strategy.min_freshness_score.is_some_and(|min| score < min) {
            return false;
        }
        if strategy.require_onchain && !candidate.has_onchain_evidence() {
            return false;
        }
        if strategy.only_verified && candidate.verified != Some(true) {
            return false;
        }
        true
    }
}

/// Cheap local rejection on fields already present. A missing field never
/// rejects here; only present-and-failing values do. Age participates only
/// once a canonical value is attached, raw hints wait for the final pass.
pub fn prefilter_pass(candidate: &TokenCandidate, strategy: &StrategyConfig) -> bool {
    if let (Some(min), Some(price)) = (strategy.min_price, candidate.price_usd) {
        if price < min {
            return false;
        }
    }
    if let (Some(max), Some(price)) = (strategy.max_price, candidate.price_usd) {
        if price > max {
            return false;
        }
    }
    if let (Some(min), Some(mcap)) = (strategy.min_market_cap, candidate.market_cap_usd) {
        if mcap < min {
            return false;
        }
    }
    if let (Some(min), Some(liq)) = (strategy.min_liquidity, candidate.liquidity_usd) {
        if liq < min {
            return false;
        }
    }
    if let (Some(min), Some(vol)) = (strategy.min_volume, candidate.volume_usd) {
        if vol < min {
            return false;
        }
    }
    if let (Some(min), Some(holders)) = (strategy.min_holders, candidate.holders) {
        if holders < min {
            return false;
        }
    }
    if let (Some(min_age), Some(age)) = (strategy.min_age_seconds(), candidate.age_seconds) {
        if age < min_age {
            return false;
        }
    }
    true
}
