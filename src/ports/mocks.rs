//! Mock Port Implementations
//!
//! Scripted in-memory sources and enrichers for unit and integration
//! tests. Calls are recorded so tests can assert on interaction counts.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::candidate::{CandidateUpdate, RawTokenRecord, SourceKind};

use super::discovery::{DiscoveryError, DiscoveryParams, DiscoverySource};
use super::enrichment::{EnrichError, EnrichField, Enricher};

/// Discovery source that replays a scripted batch of records.
pub struct MockDiscoverySource {
    name: String,
    kind: SourceKind,
    records: Vec<RawTokenRecord>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockDiscoverySource {
    pub fn new(kind: SourceKind, records: Vec<RawTokenRecord>) -> Self {
        Self {
            name: format!("mock-{}", kind.tag()),
            kind,
            records,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Build a record from JSON literal text. Panics on invalid JSON, which
    /// is fine in test setup.
    pub fn record(json: &str) -> RawTokenRecord {
        serde_json::from_str(json).unwrap()
    }

    pub fn failing(kind: SourceKind) -> Self {
        Self {
            fail: true,
            ..Self::new(kind, Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoverySource for MockDiscoverySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch_candidates(
        &self,
        params: &DiscoveryParams,
    ) -> Result<Vec<RawTokenRecord>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DiscoveryError::Network("mock failure".to_string()));
        }
        Ok(self.records.iter().take(params.limit).cloned().collect())
    }
}

/// Enricher with canned per-address responses, an optional artificial
/// delay and an optional set of addresses that always fail.
#[derive(Default)]
pub struct MockEnricher {
    responses: HashMap<String, CandidateUpdate>,
    failures: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Vec<EnrichField>)>>,
}

impl MockEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, address: impl Into<String>, update: CandidateUpdate) -> Self {
        self.responses
            .insert(address.into().to_ascii_lowercase(), update);
        self
    }

    pub fn with_failure(mut self, address: impl Into<String>) -> Self {
        self.failures.insert(address.into().to_ascii_lowercase());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, Vec<EnrichField>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Enricher for MockEnricher {
    async fn enrich(
        &self,
        address: &str,
        requested: &[EnrichField],
    ) -> Result<CandidateUpdate, EnrichError> {
        self.calls
            .lock()
            .unwrap()
            .push((address.to_string(), requested.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let key = address.to_ascii_lowercase();
        if self.failures.contains(&key) {
            return Err(EnrichError::Network("mock failure".to_string()));
        }
        Ok(self.responses.get(&key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_source_replays_records() {
        let source = MockDiscoverySource::new(
            SourceKind::MarketFeed,
            vec![MockDiscoverySource::record(r#"{"address": "Mint1"}"#)],
        );

        let records = source
            .fetch_candidates(&DiscoveryParams::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_source_respects_limit() {
        let records = (0..10)
            .map(|i| MockDiscoverySource::record(&format!(r#"{{"address": "Mint{i}"}}"#)))
            .collect();
        let source = MockDiscoverySource::new(SourceKind::MarketFeed, records);

        let params = DiscoveryParams {
            limit: 3,
            ..Default::default()
        };
        assert_eq!(source.fetch_candidates(&params).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_enricher_records_requested_fields() {
        let enricher = MockEnricher::new().with_response(
            "Mint1",
            CandidateUpdate {
                liquidity_usd: Some(100.0),
                ..Default::default()
            },
        );

        let update = enricher
            .enrich("MINT1", &[EnrichField::Liquidity])
            .await
            .unwrap();
        assert_eq!(update.liquidity_usd, Some(100.0));

        let calls = enricher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, vec![EnrichField::Liquidity]);
    }

    #[tokio::test]
    async fn test_mock_enricher_failure() {
        let enricher = MockEnricher::new().with_failure("MintBad");
        assert!(enricher
            .enrich("mintbad", &[EnrichField::Volume])
            .await
            .is_err());
    }
}
