//! Per-method request counters.
//!
//! # Responsibilities
//! - Count forwarded requests by HTTP method
//! - Periodically dump the counts to the log
//!
//! # Design Decisions
//! - One mutex around the whole map; it is held only for a single update
//! - Counts live for the process lifetime and are never reset

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};

/// Concurrency-safe accumulator of request counts per method.
#[derive(Debug, Default)]
pub struct MethodCounters {
    counts: Mutex<HashMap<String, u64>>,
}

impl MethodCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `delta` to the count for `method`.
    pub fn add(&self, method: &str, delta: u64) {
        let mut counts = self.lock();
        match counts.get_mut(method) {
            Some(count) => *count += delta,
            None => {
                counts.insert(method.to_string(), delta);
            }
        }
    }

    /// Current count for `method` (0 if never seen).
    pub fn get(&self, method: &str) -> u64 {
        self.lock().get(method).copied().unwrap_or(0)
    }

    /// Sorted copy of every count.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.lock()
            .iter()
            .map(|(method, count)| (method.clone(), *count))
            .collect()
    }

    /// Log every count. Logs nothing when no request has been counted yet.
    ///
    /// Returns whether anything was logged.
    pub fn print(&self) -> bool {
        let counts = self.lock();
        if counts.is_empty() {
            return false;
        }

        let mut pairs: Vec<_> = counts.iter().collect();
        pairs.sort();
        let total: u64 = pairs.iter().map(|(_, count)| **count).sum();
        let dump = pairs
            .iter()
            .map(|(method, count)| format!("{}={}", method, count))
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!(total, counters = %dump, "Method counters");
        true
    }
}

/// Background task dumping the counters on a fixed interval.
pub struct CounterReporter {
    counters: Arc<MethodCounters>,
    interval: Duration,
}

impl CounterReporter {
    pub fn new(counters: Arc<MethodCounters>, interval: Duration) -> Self {
        Self { counters, interval }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(interval = ?self.interval, "Counter reporter starting");

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.counters.print();
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Counter reporter received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_creates_and_accumulates() {
        let counters = MethodCounters::new();
        assert_eq!(counters.get("GET"), 0);

        counters.add("GET", 1);
        counters.add("GET", 2);
        counters.add("POST", 5);

        assert_eq!(counters.get("GET"), 3);
        assert_eq!(counters.get("POST"), 5);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["GET", "POST"]);
    }

    #[test]
    fn test_print_empty_is_silent() {
        let counters = MethodCounters::new();
        assert!(!counters.print());
        counters.add("DELETE", 1);
        assert!(counters.print());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_adds_are_not_lost() {
        const TASKS: usize = 64;
        const ADDS_PER_TASK: usize = 2_000;

        let counters = Arc::new(MethodCounters::new());
        let handles: Vec<_> = (0..TASKS)
            .map(|_| {
                let counters = counters.clone();
                tokio::spawn(async move {
                    for i in 0..ADDS_PER_TASK {
                        counters.add("GET", 1);
                        if i % 100 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counters.get("GET"), (TASKS * ADDS_PER_TASK) as u64);
    }

    #[test]
    fn test_concurrent_adds_from_threads() {
        let counters = Arc::new(MethodCounters::new());
        std::thread::scope(|scope| {
            for _ in 0..16 {
                let counters = &counters;
                scope.spawn(move || {
                    for _ in 0..10_000 {
                        counters.add("PUT", 1);
                    }
                });
            }
        });
        assert_eq!(counters.get("PUT"), 160_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_stops_on_shutdown() {
        let counters = Arc::new(MethodCounters::new());
        counters.add("GET", 1);
        let (tx, rx) = broadcast::channel(1);

        let reporter = CounterReporter::new(counters, Duration::from_secs(10));
        let handle = tokio::spawn(reporter.run(rx));

        time::sleep(Duration::from_secs(25)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
