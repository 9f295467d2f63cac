//! Concurrent load helpers.
//!
//! These run one closure on many threads at once and summarize the
//! outcome, so tests can hammer a store without repeating thread plumbing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl StressResult {
    /// Creates a new result.
    #[must_use]
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Operations per second.
    #[must_use]
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Operations issued by each thread.
    pub ops_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            ops_per_thread: 100,
        }
    }
}

impl StressConfig {
    /// Creates a configuration.
    #[must_use]
    pub const fn new(threads: usize, ops_per_thread: usize) -> Self {
        Self {
            threads,
            ops_per_thread,
        }
    }
}

/// Runs `op(thread_index, op_index)` `ops_per_thread` times on each of
/// `threads` threads. All threads are released together.
///
/// `op` returns whether the operation succeeded.
pub fn run_concurrent<F>(config: &StressConfig, op: F) -> StressResult
where
    F: Fn(usize, usize) -> bool + Sync,
{
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let barrier = Barrier::new(config.threads);
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let (op, barrier, successful, failed) = (&op, &barrier, &successful, &failed);
            scope.spawn(move || {
                barrier.wait();
                for i in 0..config.ops_per_thread {
                    if op(t, i) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    StressResult::new(
        successful.into_inner(),
        failed.into_inner(),
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_every_operation() {
        let result = run_concurrent(&StressConfig::new(3, 10), |t, i| (t + i) % 2 == 0);
        assert_eq!(result.total_ops, 30);
        assert_eq!(result.successful_ops + result.failed_ops, 30);
        assert!(result.successful_ops > 0);
        assert!(result.failed_ops > 0);
    }

    #[test]
    fn default_config() {
        let config = StressConfig::default();
        assert_eq!(config.threads, 4);
        assert_eq!(config.ops_per_thread, 100);
    }
}
