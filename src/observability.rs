use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Dispatch and collaborator usage counters
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub dispatch_attempts: AtomicU64,
    pub dispatch_successes: AtomicU64,
    pub dispatch_failures: AtomicU64,
    pub jobs_created: AtomicU64,
    pub push_failures: AtomicU64,
    pub notification_failures: AtomicU64,
    pub set_cache_hits: AtomicU64,
    pub set_cache_misses: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.dispatch_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, jobs: usize) {
        self.dispatch_successes.fetch_add(1, Ordering::Relaxed);
        self.jobs_created.fetch_add(jobs as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push_failure(&self) {
        self.push_failures.fetch_add(1, Ordering::Relaxed);
        warn!("Job push to execution system failed");
    }

    pub fn record_notification_failure(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.set_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.set_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> DispatchStats {
        DispatchStats {
            dispatch_attempts: self.dispatch_attempts.load(Ordering::Relaxed),
            dispatch_successes: self.dispatch_successes.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            set_cache_hits: self.set_cache_hits.load(Ordering::Relaxed),
            set_cache_misses: self.set_cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Dispatch metrics: attempts={}, successes={}, failures={}, jobs={}, push_failures={}, notification_failures={}, cache_hits={}, cache_misses={}",
            stats.dispatch_attempts,
            stats.dispatch_successes,
            stats.dispatch_failures,
            stats.jobs_created,
            stats.push_failures,
            stats.notification_failures,
            stats.set_cache_hits,
            stats.set_cache_misses
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatch_attempts: u64,
    pub dispatch_successes: u64,
    pub dispatch_failures: u64,
    pub jobs_created: u64,
    pub push_failures: u64,
    pub notification_failures: u64,
    pub set_cache_hits: u64,
    pub set_cache_misses: u64,
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
