//! Stress tests for EntiGate.
//!
//! These drive the mutation pipeline from many threads at once and count
//! outcomes, so callers can assert the concurrency guarantees hold under
//! contention.

use crate::fixtures::{post_payload, user, TestPipeline};
use entigate_core::MutationError;
use entigate_model::{Fields, ResourceId, Value, Version};
use entigate_storage::RecordStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Committed operations.
    pub successful_ops: usize,
    /// Operations rejected with a version conflict.
    pub conflicts: usize,
    /// Operations that failed for any other reason.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, conflicts: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + conflicts + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            conflicts,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Conflicts: {}", self.conflicts);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations each thread attempts.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct resources written.
    pub resource_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            resource_count: 8,
        }
    }
}

impl StressConfig {
    /// Creates a configuration for quick runs.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            operations: 25,
            threads: 4,
            resource_count: 2,
        }
    }
}

fn title_patch(thread: usize, op: usize) -> Fields {
    let mut patch = Fields::new();
    patch.insert("title".into(), Value::Text(format!("t{thread}-{op}")));
    patch
}

/// Seeds `count` posts owned by `alice` and returns their ids.
pub fn seed_posts<S: RecordStore>(harness: &TestPipeline<S>, count: usize) -> Vec<ResourceId> {
    let alice = user("alice");
    (0..count)
        .filter_map(|_| harness.insert(&alice, "post", post_payload("alice")).ok())
        .map(|record| record.id)
        .collect()
}

/// Every thread reads then updates a shared resource at the version it read.
///
/// Conflicts are expected; every other error counts as a failure. Writers
/// never retry, so each successful op is exactly one new version.
pub fn stress_contended_updates<S: RecordStore + 'static>(
    harness: &TestPipeline<S>,
    config: &StressConfig,
) -> StressTestResult {
    let ids = Arc::new(seed_posts(harness, config.resource_count));
    let successful = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(config.threads));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let pipeline = Arc::clone(&harness.pipeline);
            let ids = Arc::clone(&ids);
            let successful = Arc::clone(&successful);
            let conflicts = Arc::clone(&conflicts);
            let failed = Arc::clone(&failed);
            let barrier = Arc::clone(&barrier);
            let operations = config.operations;

            thread::spawn(move || {
                let alice = user("alice");
                barrier.wait();
                for i in 0..operations {
                    let id = ids[(t + i) % ids.len()];
                    let result = pipeline.get(&alice, "post", id).and_then(|current| {
                        pipeline.update(&alice, "post", id, title_patch(t, i), current.version)
                    });
                    match result {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(MutationError::VersionConflict { .. }) => conflicts.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        conflicts.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// All threads race one update against the same expected version.
///
/// Returns the result counts and the version every thread started from.
pub fn race_single_version<S: RecordStore + 'static>(
    harness: &TestPipeline<S>,
    threads: usize,
) -> (StressTestResult, Version) {
    let alice = user("alice");
    let Some(&id) = seed_posts(harness, 1).first() else {
        return (StressTestResult::new(0, 0, threads, Duration::ZERO), Version::NONE);
    };
    let base = Version::INITIAL;

    let successful = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(threads));
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let pipeline = Arc::clone(&harness.pipeline);
            let alice = alice.clone();
            let successful = Arc::clone(&successful);
            let conflicts = Arc::clone(&conflicts);
            let failed = Arc::clone(&failed);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();
                match pipeline.update(&alice, "post", id, title_patch(t, 0), base) {
                    Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                    Err(MutationError::VersionConflict { .. }) => conflicts.fetch_add(1, Ordering::Relaxed),
                    Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                };
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        conflicts.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    (result, base)
}
