//! Per-Host Rate Limiting
//!
//! Caps in-flight requests per upstream host with one semaphore per host.
//! Hosts are independent; saturating one never delays another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

/// Bucket used for requests whose host cannot be determined.
const ANONYMOUS_HOST: &str = "<anonymous>";

/// Limits concurrent operations per host key.
#[derive(Debug)]
pub struct HostRateLimiter {
    per_host: usize,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostRateLimiter {
    pub fn new(per_host: usize) -> Self {
        Self {
            per_host: per_host.max(1),
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn gate_for(&self, host: &str) -> Arc<Semaphore> {
        let key = if host.trim().is_empty() {
            ANONYMOUS_HOST
        } else {
            host
        };
        let mut gates = self.gates.lock().unwrap();
        gates
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host)))
            .clone()
    }

    /// Run `op` once a slot for `host` is free. Waiters are served in
    /// acquisition order.
    pub async fn run<F, Fut, T>(&self, host: &str, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let gate = self.gate_for(host);
        // The semaphore is never closed.
        let _permit = gate
            .acquire_owned()
            .await
            .expect("rate limiter gate closed");
        op().await
    }

    /// Currently available slots for a host, mostly for tests and status
    /// reporting.
    pub fn available(&self, host: &str) -> usize {
        self.gate_for(host).available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_limits_concurrency_per_host() {
        let limiter = Arc::new(HostRateLimiter::new(2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run("api.example.com", || async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_hosts_do_not_share_slots() {
        let limiter = Arc::new(HostRateLimiter::new(1));

        // Hold the only slot for host A, then run against host B.
        let blocker = limiter.clone();
        let hold = tokio::spawn(async move {
            blocker
                .run("a.example.com", || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = tokio::time::timeout(
            Duration::from_millis(20),
            limiter.run("b.example.com", || async { 42 }),
        )
        .await;
        assert_eq!(result.unwrap(), 42);

        hold.await.unwrap();
    }

    #[tokio::test]
    async fn test_blank_hosts_share_anonymous_bucket() {
        let limiter = HostRateLimiter::new(3);
        limiter.run("", || async {}).await;
        limiter.run("   ", || async {}).await;
        assert_eq!(limiter.available(""), 3);
        assert_eq!(limiter.available("   "), 3);
    }
}
