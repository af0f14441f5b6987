//! Pipeline Infrastructure
//!
//! Reusable plumbing shared by discovery and enrichment: TTL caching,
//! per-host rate limiting, retry with backoff, duplicate suppression and
//! the bounded enrichment queue.

pub mod cache;
pub mod dedupe;
pub mod queue;
pub mod rate_limit;
pub mod retry;

pub use cache::TtlCache;
pub use dedupe::{build_dedupe_store, enrich_key, DedupeStore, LocalDedupeStore, RedisDedupeStore};
pub use queue::{EnrichmentJob, EnrichmentQueue, JobOutcome, JobTicket, QueueConfig};
pub use rate_limit::HostRateLimiter;
pub use retry::{parse_retry_after, RetryExecutor, RetryPolicy, Retryable};
