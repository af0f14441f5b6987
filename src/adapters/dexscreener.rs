//! DexScreener Market Data Adapter
//!
//! Implements both ports against the DexScreener public API: the latest
//! token profiles feed for discovery and the per-token pairs endpoint for
//! enrichment. Requests go through the shared per-host limiter; enrichment
//! responses are cached briefly and retried on transient failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::domain::candidate::{CandidateUpdate, RawTokenRecord, SourceKind};
use crate::pipeline::cache::TtlCache;
use crate::pipeline::rate_limit::HostRateLimiter;
use crate::pipeline::retry::{parse_retry_after, RetryExecutor};
use crate::ports::discovery::{DiscoveryError, DiscoveryParams, DiscoverySource};
use crate::ports::enrichment::{EnrichError, EnrichField, Enricher};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DexScreenerClient {
    http: Client,
    base_url: String,
    host: String,
    retry: RetryExecutor,
    limiter: Arc<HostRateLimiter>,
    cache: TtlCache<String, CandidateUpdate>,
}

impl DexScreenerClient {
    pub fn new(
        base_url: &str,
        retry: RetryExecutor,
        limiter: Arc<HostRateLimiter>,
        cache_ttl: Duration,
    ) -> Result<Self, EnrichError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| EnrichError::Network(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let host = reqwest::Url::parse(&base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        Ok(Self {
            http,
            base_url,
            host,
            retry,
            limiter,
            cache: TtlCache::new(cache_ttl),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, EnrichError> {
        let response = self
            .limiter
            .run(&self.host, || self.http.get(url).send())
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(EnrichError::Http {
                status: status.as_u16(),
                retry_after,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| EnrichError::Parse(e.to_string()))
    }

    /// Best pair for a token is the one with the deepest liquidity. Pairs
    /// where the token sits on the quote side are ignored.
    fn best_pair(address: &str, pairs: Vec<PairData>) -> Option<PairData> {
        pairs
            .into_iter()
            .filter(|p| match &p.base_token {
                Some(token) => token
                    .address
                    .as_deref()
                    .is_some_and(|a| a.eq_ignore_ascii_case(address)),
                None => true,
            })
            .max_by(|a, b| {
                let liq_a = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
                let liq_b = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
                liq_a.total_cmp(&liq_b)
            })
    }

    fn pair_to_update(pair: &PairData) -> CandidateUpdate {
        let mut update = CandidateUpdate {
            price_usd: pair.price_usd.as_deref().and_then(|p| p.parse().ok()),
            market_cap_usd: pair.fdv,
            liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd),
            volume_usd: pair.volume.as_ref().and_then(|v| v.h24),
            ..Default::default()
        };
        if let Some(created_ms) = pair.pair_created_at {
            update
                .age_hints
                .push(crate::domain::candidate::AgeHint::Number(created_ms));
        }
        update
    }
}

#[async_trait]
impl DiscoverySource for DexScreenerClient {
    fn name(&self) -> &str {
        "dexscreener"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::MarketFeed
    }

    async fn fetch_candidates(
        &self,
        params: &DiscoveryParams,
    ) -> Result<Vec<RawTokenRecord>, DiscoveryError> {
        let url = format!("{}/token-profiles/latest/v1", self.base_url);
        let profiles: Vec<TokenProfile> = self.get_json(&url).await.map_err(|e| match e {
            EnrichError::Http { status: 429, .. } => DiscoveryError::RateLimited,
            EnrichError::Parse(msg) => DiscoveryError::Parse(msg),
            other => DiscoveryError::Network(other.to_string()),
        })?;

        debug!("dexscreener: fetched {} token profiles", profiles.len());
        Ok(profiles
            .into_iter()
            .take(params.limit)
            .map(|profile| {
                let mut record = RawTokenRecord::new();
                if let Some(address) = profile.token_address {
                    record.insert("address".into(), address.into());
                }
                if let Some(chain) = profile.chain_id {
                    record.insert("chainId".into(), chain.into());
                }
                record
            })
            .collect())
    }
}

#[async_trait]
impl Enricher for DexScreenerClient {
    async fn enrich(
        &self,
        address: &str,
        _requested: &[EnrichField],
    ) -> Result<CandidateUpdate, EnrichError> {
        let cache_key = address.to_ascii_lowercase();
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!("dexscreener: cache hit for {address}");
            return Ok(cached);
        }

        let url = format!("{}/latest/dex/tokens/{address}", self.base_url);
        let response: TokensResponse = self
            .retry
            .retry("dexscreener enrich", |_| self.get_json(&url))
            .await?;

        let update = Self::best_pair(address, response.pairs.unwrap_or_default())
            .map(|pair| Self::pair_to_update(&pair))
            .unwrap_or_default();
        self.cache.insert(cache_key, update.clone());
        Ok(update)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> EnrichError {
    if err.is_timeout() {
        EnrichError::Timeout
    } else if let Some(status) = err.status() {
        EnrichError::Http {
            status: status.as_u16(),
            retry_after: None,
        }
    } else {
        EnrichError::Network(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenProfile {
    token_address: Option<String>,
    chain_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokensResponse {
    pairs: Option<Vec<PairData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairData {
    base_token: Option<BaseToken>,
    price_usd: Option<String>,
    liquidity: Option<LiquidityData>,
    volume: Option<VolumeData>,
    fdv: Option<f64>,
    pair_created_at: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BaseToken {
    address: Option<String>,
    #[allow(dead_code)]
    symbol: Option<String>,
    #[allow(dead_code)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LiquidityData {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VolumeData {
    h24: Option<f64>,
}
