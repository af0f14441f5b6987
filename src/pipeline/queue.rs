//! Enrichment Work Queue
//!
//! Bounded-concurrency FIFO queue in front of the enrichment adapters.
//! Jobs pass the dedupe gate before entering the queue, wait in submission
//! order, and run on at most `max_concurrent` tasks at a time. Each
//! submission hands back a ticket the caller can await for the outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::candidate::CandidateUpdate;
use crate::pipeline::dedupe::{enrich_key, DedupeStore};
use crate::ports::enrichment::{EnrichField, Enricher};

/// One unit of enrichment work.
#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    pub address: String,
    pub requested_fields: Vec<EnrichField>,
    pub created_at: tokio::time::Instant,
}

impl EnrichmentJob {
    pub fn new(address: impl Into<String>, requested_fields: Vec<EnrichField>) -> Self {
        Self {
            address: address.into(),
            requested_fields,
            created_at: tokio::time::Instant::now(),
        }
    }
}

/// Terminal state of a submitted job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(CandidateUpdate),
    /// The job never ran: duplicate within the dedupe window, or the queue
    /// had already stopped accepting work.
    Skipped { reason: String },
    Failed { error: String },
}

/// Awaitable handle for one submitted job.
pub struct JobTicket {
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobTicket {
    fn pending() -> (oneshot::Sender<JobOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    fn immediate(outcome: JobOutcome) -> Self {
        let (tx, ticket) = Self::pending();
        let _ = tx.send(outcome);
        ticket
    }

    /// Wait for the job to finish. A queue torn down mid-flight reports as
    /// a failure rather than hanging the caller.
    pub async fn wait(self) -> JobOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => JobOutcome::Failed {
                error: "queue closed before execution".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    pub capacity: usize,
    pub dedupe_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            capacity: 256,
            dedupe_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    active: AtomicUsize,
    peak_active: AtomicUsize,
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

struct QueuedJob {
    job: EnrichmentJob,
    outcome_tx: oneshot::Sender<JobOutcome>,
}

/// FIFO queue with a hard concurrency cap, fed by `enqueue` and drained by
/// a single dispatcher task.
pub struct EnrichmentQueue {
    tx: mpsc::Sender<QueuedJob>,
    dedupe: Arc<dyn DedupeStore>,
    dedupe_ttl: Duration,
    accepting: AtomicBool,
    stop_tx: watch::Sender<bool>,
    counters: Arc<QueueCounters>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EnrichmentQueue {
    pub fn new(
        config: QueueConfig,
        enricher: Arc<dyn Enricher>,
        dedupe: Arc<dyn DedupeStore>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<QueuedJob>(config.capacity.max(1));
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let counters = Arc::new(QueueCounters::default());

        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let worker_counters = counters.clone();
        let dispatcher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    queued = rx.recv() => {
                        let Some(queued) = queued else { break };
                        // Acquiring here, not in the spawned task, keeps
                        // dispatch strictly FIFO: job N+1 cannot start
                        // before a slot frees up for job N.
                        let permit = permits
                            .clone()
                            .acquire_owned()
                            .await
                            .expect("queue semaphore closed");
                        let active =
                            worker_counters.active.fetch_add(1, Ordering::SeqCst) + 1;
                        worker_counters.peak_active.fetch_max(active, Ordering::SeqCst);

                        let enricher = enricher.clone();
                        let counters = worker_counters.clone();
                        tokio::spawn(async move {
                            let QueuedJob { job, outcome_tx } = queued;
                            debug!(
                                "queue: running enrichment for {} ({} fields, waited {:?})",
                                job.address,
                                job.requested_fields.len(),
                                job.created_at.elapsed()
                            );
                            let outcome = match enricher
                                .enrich(&job.address, &job.requested_fields)
                                .await
                            {
                                Ok(update) => {
                                    counters.completed.fetch_add(1, Ordering::SeqCst);
                                    JobOutcome::Completed(update)
                                }
                                Err(err) => {
                                    counters.failed.fetch_add(1, Ordering::SeqCst);
                                    warn!(
                                        "queue: enrichment failed for {}: {err}",
                                        job.address
                                    );
                                    JobOutcome::Failed {
                                        error: err.to_string(),
                                    }
                                }
                            };
                            counters.active.fetch_sub(1, Ordering::SeqCst);
                            let _ = outcome_tx.send(outcome);
                            drop(permit);
                        });
                    }
                }
            }
            info!("queue: dispatcher stopped");
        });

        Self {
            tx,
            dedupe,
            dedupe_ttl: config.dedupe_ttl,
            accepting: AtomicBool::new(true),
            stop_tx,
            counters,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Submit a job. The dedupe gate is consulted first; a rejected key
    /// resolves immediately as skipped without occupying queue capacity.
    pub async fn enqueue(&self, job: EnrichmentJob) -> JobTicket {
        if !self.accepting.load(Ordering::SeqCst) {
            self.counters.skipped.fetch_add(1, Ordering::SeqCst);
            return JobTicket::immediate(JobOutcome::Skipped {
                reason: "queue stopped".to_string(),
            });
        }

        let key = enrich_key(&job.address);
        if !self.dedupe.try_admit(&key, self.dedupe_ttl).await {
            self.counters.skipped.fetch_add(1, Ordering::SeqCst);
            debug!("queue: skipping {} (in-flight or recently attempted)", job.address);
            return JobTicket::immediate(JobOutcome::Skipped {
                reason: "in-flight or recently attempted".to_string(),
            });
        }

        let (outcome_tx, ticket) = JobTicket::pending();
        if self
            .tx
            .send(QueuedJob { job, outcome_tx })
            .await
            .is_err()
        {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            return JobTicket::immediate(JobOutcome::Failed {
                error: "queue closed".to_string(),
            });
        }
        ticket
    }

    /// Stop accepting new work and signal the dispatcher to wind down.
    pub fn stop(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);
    }

    /// Stop and wait for the dispatcher to exit.
    pub async fn close(&self) {
        self.stop();
        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn active_jobs(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.counters.peak_active.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    pub fn skipped_count(&self) -> u64 {
        self.counters.skipped.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> u64 {
        self.counters.failed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dedupe::LocalDedupeStore;
    use crate::ports::mocks::MockEnricher;

    fn queue_with(
        config: QueueConfig,
        enricher: MockEnricher,
    ) -> (Arc<EnrichmentQueue>, Arc<MockEnricher>) {
        let enricher = Arc::new(enricher);
        let queue = Arc::new(EnrichmentQueue::new(
            config,
            enricher.clone(),
            Arc::new(LocalDedupeStore::new()),
        ));
        (queue, enricher)
    }

    #[tokio::test]
    async fn test_job_runs_and_returns_update() {
        let update = CandidateUpdate {
            liquidity_usd: Some(1500.0),
            ..Default::default()
        };
        let (queue, _) = queue_with(
            QueueConfig::default(),
            MockEnricher::new().with_response("Mint1", update.clone()),
        );

        let ticket = queue
            .enqueue(EnrichmentJob::new("Mint1", vec![EnrichField::Liquidity]))
            .await;
        assert_eq!(ticket.wait().await, JobOutcome::Completed(update));
        assert_eq!(queue.completed_count(), 1);
        queue.close().await;
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_skipped() {
        let (queue, enricher) = queue_with(
            QueueConfig::default(),
            MockEnricher::new().with_response("Mint1", CandidateUpdate::default()),
        );

        let first = queue
            .enqueue(EnrichmentJob::new("Mint1", vec![EnrichField::Liquidity]))
            .await;
        let second = queue
            .enqueue(EnrichmentJob::new("MINT1", vec![EnrichField::Liquidity]))
            .await;

        assert!(matches!(second.wait().await, JobOutcome::Skipped { .. }));
        assert!(matches!(first.wait().await, JobOutcome::Completed(_)));
        assert_eq!(enricher.call_count(), 1);
        assert_eq!(queue.skipped_count(), 1);
        queue.close().await;
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_cap() {
        let mut enricher = MockEnricher::new().with_delay(Duration::from_millis(20));
        for i in 0..20 {
            enricher = enricher.with_response(format!("Mint{i}"), CandidateUpdate::default());
        }
        let config = QueueConfig {
            max_concurrent: 3,
            ..Default::default()
        };
        let (queue, _) = queue_with(config, enricher);

        let mut tickets = Vec::new();
        for i in 0..20 {
            tickets.push(
                queue
                    .enqueue(EnrichmentJob::new(
                        format!("Mint{i}"),
                        vec![EnrichField::Liquidity],
                    ))
                    .await,
            );
        }
        for ticket in tickets {
            assert!(matches!(ticket.wait().await, JobOutcome::Completed(_)));
        }

        assert!(queue.peak_active() <= 3, "peak {}", queue.peak_active());
        assert_eq!(queue.completed_count(), 20);
        queue.close().await;
    }

    #[tokio::test]
    async fn test_failed_enrichment_reports_error() {
        let (queue, _) = queue_with(
            QueueConfig::default(),
            MockEnricher::new().with_failure("MintBad"),
        );

        let ticket = queue
            .enqueue(EnrichmentJob::new("MintBad", vec![EnrichField::Liquidity]))
            .await;
        assert!(matches!(ticket.wait().await, JobOutcome::Failed { .. }));
        assert_eq!(queue.failed_count(), 1);
        queue.close().await;
    }

    #[tokio::test]
    async fn test_stopped_queue_rejects_new_work() {
        let (queue, enricher) = queue_with(
            QueueConfig::default(),
            MockEnricher::new().with_response("Mint1", CandidateUpdate::default()),
        );

        queue.stop();
        let ticket = queue
            .enqueue(EnrichmentJob::new("Mint1", vec![EnrichField::Liquidity]))
            .await;
        assert_eq!(
            ticket.wait().await,
            JobOutcome::Skipped {
                reason: "queue stopped".to_string()
            }
        );
        assert_eq!(enricher.call_count(), 0);
        queue.close().await;
    }
}
