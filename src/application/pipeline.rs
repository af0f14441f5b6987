//! Scan Pipeline
//!
//! Wires discovery sources, the aggregator, the enrichment queue and the
//! strategy filter into one unit. A scan is one pass over all sources; watch
//! mode repeats scans on an interval until stopped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};

use crate::adapters::dexscreener::DexScreenerClient;
use crate::config::loader::Config;
use crate::domain::aggregator::{CandidateAggregator, SourceBatch};
use crate::domain::candidate::TokenCandidate;
use crate::domain::strategy::StrategyConfig;
use crate::enrich::freshness::FreshnessScorer;
use crate::pipeline::dedupe::{build_dedupe_store, DedupeStore};
use crate::pipeline::queue::{EnrichmentQueue, QueueConfig};
use crate::pipeline::rate_limit::HostRateLimiter;
use crate::pipeline::retry::{RetryExecutor, RetryPolicy};
use crate::ports::discovery::{DiscoveryParams, DiscoverySource};
use crate::strategy::filter::{FilterConfig, StrategyFilter};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline initialization failed: {0}")]
    Init(String),

    #[error("all {0} discovery sources failed")]
    AllSourcesFailed(usize),
}

/// Counter snapshot for status reporting.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub running: bool,
    pub active_jobs: usize,
    pub peak_active_jobs: usize,
    pub completed_jobs: u64,
    pub skipped_jobs: u64,
    pub failed_jobs: u64,
}

pub struct ScanPipeline {
    sources: Vec<Arc<dyn DiscoverySource>>,
    aggregator: CandidateAggregator,
    filter: StrategyFilter,
    queue: Arc<EnrichmentQueue>,
    dedupe: Arc<dyn DedupeStore>,
    discovery_params: DiscoveryParams,
    /// When set, each round only asks sources for listings newer than
    /// `now - lookback`.
    lookback: Option<chrono::Duration>,
    poll_interval: Duration,
    is_running: Arc<RwLock<bool>>,
    /// Wakes the watch loop out of its poll sleep on [`stop`](Self::stop).
    stop_notify: Arc<Notify>,
}

impl ScanPipeline {
    pub fn new(
        sources: Vec<Arc<dyn DiscoverySource>>,
        aggregator: CandidateAggregator,
        filter: StrategyFilter,
        queue: Arc<EnrichmentQueue>,
        dedupe: Arc<dyn DedupeStore>,
        discovery_params: DiscoveryParams,
        poll_interval: Duration,
    ) -> Self {
        Self {
            sources,
            aggregator,
            filter,
            queue,
            dedupe,
            discovery_params,
            lookback: None,
            poll_interval,
            is_running: Arc::new(RwLock::new(false)),
            stop_notify: Arc::new(Notify::new()),
        }
    }

    pub fn with_lookback(mut self, lookback: chrono::Duration) -> Self {
        self.lookback = Some(lookback);
        self
    }

    /// Wire the default production pipeline from configuration.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let limiter = Arc::new(HostRateLimiter::new(config.pipeline.per_host_concurrency));
        let retry = RetryExecutor::new(RetryPolicy {
            attempts: config.retry.attempts,
            base_delay: Duration::from_millis(config.retry.base_delay_ms),
            max_delay: Duration::from_millis(config.retry.max_delay_ms),
        });

        let market = Arc::new(
            DexScreenerClient::new(
                &config.sources.market_api_url,
                retry,
                limiter,
                Duration::from_secs(config.enrichment.cache_ttl_secs),
            )
            .map_err(|e| PipelineError::Init(e.to_string()))?,
        );

        let dedupe = build_dedupe_store(&config.dedupe);
        let queue = Arc::new(EnrichmentQueue::new(
            QueueConfig {
                max_concurrent: config.pipeline.max_concurrent_jobs,
                capacity: config.pipeline.queue_capacity,
                dedupe_ttl: Duration::from_secs(config.dedupe.ttl_secs),
            },
            market.clone(),
            dedupe.clone(),
        ));
        let filter = StrategyFilter::new(
            queue.clone(),
            FreshnessScorer::default(),
            FilterConfig {
                candidate_limit: config.enrichment.candidate_limit,
                item_timeout: Duration::from_millis(config.enrichment.item_timeout_ms),
            },
        );

        let mut pipeline = Self::new(
            vec![market],
            CandidateAggregator::new(),
            filter,
            queue,
            dedupe,
            DiscoveryParams {
                limit: config.sources.discovery_limit,
                newer_than: None,
            },
            Duration::from_secs(config.pipeline.poll_interval_secs),
        );
        if config.sources.lookback_minutes > 0 {
            pipeline = pipeline
                .with_lookback(chrono::Duration::minutes(config.sources.lookback_minutes as i64));
        }
        Ok(pipeline)
    }

    /// One full round: discover, aggregate, filter. A single failing source
    /// is logged and skipped; the round only fails when every source does.
    pub async fn scan(
        &self,
        strategy: &StrategyConfig,
    ) -> Result<Vec<TokenCandidate>, PipelineError> {
        let mut params = self.discovery_params.clone();
        if let Some(lookback) = self.lookback {
            params.newer_than = Some(Utc::now() - lookback);
        }

        let mut batches = Vec::new();
        let mut failures = 0;
        for source in &self.sources {
            match source.fetch_candidates(&params).await {
                Ok(records) => {
                    info!("pipeline: {} returned {} records", source.name(), records.len());
                    batches.push(SourceBatch {
                        kind: source.kind(),
                        records,
                    });
                }
                Err(err) => {
                    warn!("pipeline: {} failed: {err}", source.name());
                    failures += 1;
                }
            }
        }
        if !self.sources.is_empty() && failures == self.sources.len() {
            return Err(PipelineError::AllSourcesFailed(failures));
        }

        let candidates = self.aggregator.aggregate(batches);
        info!("pipeline: aggregated {} unique candidates", candidates.len());
        Ok(self.filter.run(candidates, strategy, Utc::now()).await)
    }

    /// Scan repeatedly until [`stop`](Self::stop) is called. Failed rounds
    /// are logged and the loop keeps going.
    pub async fn watch<F>(&self, strategy: &StrategyConfig, mut on_round: F)
    where
        F: FnMut(Vec<TokenCandidate>),
    {
        *self.is_running.write().await = true;
        info!(
            "pipeline: watch started, polling every {:?}",
            self.poll_interval
        );
        while *self.is_running.read().await {
            match self.scan(strategy).await {
                Ok(accepted) => on_round(accepted),
                Err(err) => error!("pipeline: round failed: {err}"),
            }
            // An in-flight scan always finishes; only the sleep is cut short.
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.stop_notify.notified() => {}
            }
        }
        info!("pipeline: watch stopped");
    }

    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        self.stop_notify.notify_one();
    }

    pub async fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: *self.is_running.read().await,
            active_jobs: self.queue.active_jobs(),
            peak_active_jobs: self.queue.peak_active(),
            completed_jobs: self.queue.completed_count(),
            skipped_jobs: self.queue.skipped_count(),
            failed_jobs: self.queue.failed_count(),
        }
    }

    /// Graceful teardown: stop watching, drain the queue, release dedupe
    /// backend resources.
    pub async fn close(&self) {
        self.stop().await;
        self.queue.close().await;
        self.dedupe.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::SourceKind;
    use crate::pipeline::dedupe::LocalDedupeStore;
    use crate::ports::mocks::{MockDiscoverySource, MockEnricher};

    fn pipeline_with(sources: Vec<Arc<dyn DiscoverySource>>) -> ScanPipeline {
        pipeline_with_interval(sources, Duration::from_millis(10))
    }

    fn pipeline_with_interval(
        sources: Vec<Arc<dyn DiscoverySource>>,
        poll_interval: Duration,
    ) -> ScanPipeline {
        let dedupe: Arc<dyn DedupeStore> = Arc::new(LocalDedupeStore::new());
        let queue = Arc::new(EnrichmentQueue::new(
            QueueConfig::default(),
            Arc::new(MockEnricher::new()),
            dedupe.clone(),
        ));
        let filter = StrategyFilter::new(
            queue.clone(),
            FreshnessScorer::default(),
            FilterConfig::default(),
        );
        ScanPipeline::new(
            sources,
            CandidateAggregator::new(),
            filter,
            queue,
            dedupe,
            DiscoveryParams::default(),
            poll_interval,
        )
    }

    #[tokio::test]
    async fn test_scan_aggregates_and_filters() {
        let source = MockDiscoverySource::new(
            SourceKind::MarketFeed,
            vec![
                MockDiscoverySource::record(r#"{"address": "Mint1", "priceUsd": 0.5}"#),
                MockDiscoverySource::record(r#"{"address": "Mint2", "priceUsd": 0.001}"#),
            ],
        );
        let pipeline = pipeline_with(vec![Arc::new(source)]);

        let strategy = StrategyConfig {
            min_price: Some(0.01),
            ..Default::default()
        };
        let accepted = pipeline.scan(&strategy).await.unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].address, "Mint1");
        pipeline.close().await;
    }

    #[tokio::test]
    async fn test_one_failing_source_is_tolerated() {
        let good = MockDiscoverySource::new(
            SourceKind::MarketFeed,
            vec![MockDiscoverySource::record(r#"{"address": "Mint1"}"#)],
        );
        let bad = MockDiscoverySource::failing(SourceKind::ChainScan);
        let pipeline = pipeline_with(vec![Arc::new(good), Arc::new(bad)]);

        let accepted = pipeline.scan(&StrategyConfig::default()).await.unwrap();
        assert_eq!(accepted.len(), 1);
        pipeline.close().await;
    }

    #[tokio::test]
    async fn test_all_sources_failing_is_an_error() {
        let pipeline = pipeline_with(vec![
            Arc::new(MockDiscoverySource::failing(SourceKind::MarketFeed)),
            Arc::new(MockDiscoverySource::failing(SourceKind::ChainScan)),
        ]);

        let result = pipeline.scan(&StrategyConfig::default()).await;
        assert!(matches!(result, Err(PipelineError::AllSourcesFailed(2))));
        pipeline.close().await;
    }

    #[tokio::test]
    async fn test_status_reflects_queue_counters() {
        let pipeline = pipeline_with(Vec::new());
        let status = pipeline.status().await;
        assert!(!status.running);
        assert_eq!(status.active_jobs, 0);
        assert_eq!(status.completed_jobs, 0);
        pipeline.close().await;
    }

    #[tokio::test]
    async fn test_watch_stops_on_request() {
        let source = MockDiscoverySource::new(SourceKind::MarketFeed, Vec::new());
        let pipeline = Arc::new(pipeline_with(vec![Arc::new(source)]));

        let watcher = pipeline.clone();
        let handle = tokio::spawn(async move {
            watcher.watch(&StrategyConfig::default(), |_| {}).await;
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        pipeline.stop().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watch loop did not stop")
            .unwrap();
        pipeline.close().await;
    }

    #[tokio::test]
    async fn test_stop_interrupts_poll_sleep() {
        let source = MockDiscoverySource::new(SourceKind::MarketFeed, Vec::new());
        let pipeline = Arc::new(pipeline_with_interval(
            vec![Arc::new(source)],
            Duration::from_secs(60),
        ));

        let watcher = pipeline.clone();
        let handle = tokio::spawn(async move {
            watcher.watch(&StrategyConfig::default(), |_| {}).await;
        });

        // The loop is deep in its 60s sleep by now; stop must still land.
        tokio::time::sleep(Duration::from_millis(30)).await;
        pipeline.stop().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stop did not interrupt the poll sleep")
            .unwrap();
        pipeline.close().await;
    }
}
