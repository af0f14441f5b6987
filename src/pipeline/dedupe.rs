//! Duplicate-Work Suppression
//!
//! At-most-once admission per key within a TTL window. A local in-process
//! store backs single-instance deployments; a Redis-backed store coordinates
//! multiple instances and falls back to the local store when Redis is
//! unreachable. Availability beats strict deduplication: on backend failure
//! admission proceeds rather than stalling the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::loader::DedupeSection;

/// Admission gate shared by all enrichment producers.
#[async_trait]
pub trait DedupeStore: Send + Sync {
    /// Atomically claim `key` for `ttl`. Returns true exactly once per
    /// window; repeat calls inside the window return false.
    async fn try_admit(&self, key: &str, ttl: Duration) -> bool;

    /// Release backend resources. A no-op for stores without connections.
    async fn close(&self) {}
}

/// Cap after which expired entries are swept opportunistically.
const PURGE_THRESHOLD: usize = 10_000;

/// In-process dedupe map. Entry-level locking makes check-and-set atomic
/// per key under concurrent callers.
#[derive(Debug, Default)]
pub struct LocalDedupeStore {
    entries: DashMap<String, Instant>,
}

impl LocalDedupeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DedupeStore for LocalDedupeStore {
    async fn try_admit(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let admitted = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    false
                } else {
                    occupied.insert(now + ttl);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now + ttl);
                true
            }
        };
        if self.entries.len() > PURGE_THRESHOLD {
            self.entries.retain(|_, expires| *expires > now);
        }
        admitted
    }
}

/// Redis-backed dedupe keyed with `SET NX PX`. Connection setup happens in
/// the background so startup never blocks on an unreachable Redis; until
/// the connection is live (and whenever it breaks) admission routes through
/// the local fallback.
pub struct RedisDedupeStore {
    conn: Arc<RwLock<Option<redis::aio::ConnectionManager>>>,
    fallback: LocalDedupeStore,
    fallback_warned: AtomicBool,
    call_timeout: Duration,
}

impl RedisDedupeStore {
    pub fn connect(url: &str, connect_timeout: Duration, call_timeout: Duration) -> Self {
        let conn: Arc<RwLock<Option<redis::aio::ConnectionManager>>> =
            Arc::new(RwLock::new(None));

        let slot = conn.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            let connected = tokio::time::timeout(connect_timeout, async {
                let client = redis::Client::open(url.as_str())?;
                redis::aio::ConnectionManager::new(client).await
            })
            .await;
            match connected {
                Ok(Ok(manager)) => {
                    info!("dedupe: redis connection established");
                    *slot.write().await = Some(manager);
                }
                Ok(Err(err)) => {
                    warn!("dedupe: redis connection failed ({err}), using local fallback");
                }
                Err(_) => {
                    warn!(
                        "dedupe: redis connection timed out after {connect_timeout:?}, \
                         using local fallback"
                    );
                }
            }
        });

        Self {
            conn,
            fallback: LocalDedupeStore::new(),
            fallback_warned: AtomicBool::new(false),
            call_timeout,
        }
    }

    async fn admit_via_redis(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<bool, redis::RedisError> {
        let manager = self.conn.read().await.clone();
        let Some(mut manager) = manager else {
            return Err(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "not connected",
            )));
        };
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut manager)
            .await?;
        Ok(reply.as_deref() == Some("OK"))
    }

    fn warn_fallback_once(&self, reason: &str) {
        if !self.fallback_warned.swap(true, Ordering::SeqCst) {
            warn!("dedupe: redis unavailable ({reason}), admitting via local store");
        } else {
            debug!("dedupe: redis unavailable ({reason}), admitting via local store");
        }
    }
}

#[async_trait]
impl DedupeStore for RedisDedupeStore {
    async fn try_admit(&self, key: &str, ttl: Duration) -> bool {
        match tokio::time::timeout(self.call_timeout, self.admit_via_redis(key, ttl)).await {
            Ok(Ok(admitted)) => {
                self.fallback_warned.store(false, Ordering::SeqCst);
                admitted
            }
            Ok(Err(err)) => {
                self.warn_fallback_once(&err.to_string());
                self.fallback.try_admit(key, ttl).await
            }
            Err(_) => {
                self.warn_fallback_once("call timed out");
                self.fallback.try_admit(key, ttl).await
            }
        }
    }

    async fn close(&self) {
        *self.conn.write().await = None;
    }
}

/// Dedupe key for one enrichment admission.
pub fn enrich_key(address: &str) -> String {
    format!("enrich:{}", address.to_ascii_lowercase())
}

/// Build the configured dedupe backend.
pub fn build_dedupe_store(section: &DedupeSection) -> Arc<dyn DedupeStore> {
    match section.backend.as_str() {
        "redis" => match section.redis_url.as_deref() {
            Some(url) => Arc::new(RedisDedupeStore::connect(
                url,
                Duration::from_millis(section.connect_timeout_ms),
                Duration::from_millis(section.call_timeout_ms),
            )),
            None => {
                warn!("dedupe: backend is redis but no url configured, using local store");
                Arc::new(LocalDedupeStore::new())
            }
        },
        other => {
            if other != "local" {
                warn!("dedupe: unknown backend '{other}', using local store");
            }
            Arc::new(LocalDedupeStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_admit_within_window_is_rejected() {
        let store = LocalDedupeStore::new();
        assert!(store.try_admit("enrich:mint1", Duration::from_secs(300)).await);
        assert!(!store.try_admit("enrich:mint1", Duration::from_secs(300)).await);
    }

    #[tokio::test]
    async fn test_distinct_keys_are_independent() {
        let store = LocalDedupeStore::new();
        assert!(store.try_admit("enrich:mint1", Duration::from_secs(300)).await);
        assert!(store.try_admit("enrich:mint2", Duration::from_secs(300)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_readmitted_after_ttl_expiry() {
        let store = LocalDedupeStore::new();
        let ttl = Duration::from_secs(1);

        assert!(store.try_admit("enrich:mint1", ttl).await);
        assert!(!store.try_admit("enrich:mint1", ttl).await);

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(store.try_admit("enrich:mint1", ttl).await);
    }

    #[tokio::test]
    async fn test_at_most_one_admission_under_contention() {
        let store = Arc::new(LocalDedupeStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_admit("enrich:contested", Duration::from_secs(300)).await
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_redis_store_falls_back_when_unreachable() {
        // Nothing listens on this port; the background connect fails and
        // admission must route through the local store.
        let store = RedisDedupeStore::connect(
            "redis://127.0.0.1:1/",
            Duration::from_millis(100),
            Duration::from_millis(50),
        );
        assert!(store.try_admit("enrich:mint1", Duration::from_secs(300)).await);
        assert!(!store.try_admit("enrich:mint1", Duration::from_secs(300)).await);
        store.close().await;
    }

    #[tokio::test]
    async fn test_enrich_key_is_case_insensitive() {
        assert_eq!(enrich_key("MintABC"), enrich_key("mintabc"));
        assert_eq!(enrich_key("MintABC"), "enrich:mintabc");
    }

    #[tokio::test]
    async fn test_build_store_defaults_to_local() {
        let section = DedupeSection::default();
        let store = build_dedupe_store(&section);
        assert!(store.try_admit("enrich:mint1", Duration::from_secs(300)).await);
    }
}
