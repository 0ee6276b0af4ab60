use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, trace};

/// Counters for the view-count mechanism.
///
/// View counts are best-effort analytics, so these are the only visibility
/// into dropped batches and swallowed storage failures. Everything is a
/// relaxed atomic; precision under contention does not matter here.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Local cache lookups that returned a fresh value
    pub cache_hits: AtomicU64,
    /// Local cache lookups that missed or hit a stale entry
    pub cache_misses: AtomicU64,
    /// Stale or corrupt cache entries purged
    pub cache_purges: AtomicU64,
    /// Durable storage operations that failed and were swallowed
    pub storage_failures: AtomicU64,
    /// Batch flushes issued by the coalescer
    pub batch_flushes: AtomicU64,
    /// Slugs carried by those flushes
    pub batched_slugs: AtomicU64,
    /// Batch flushes that failed (slugs dropped for the cycle)
    pub batch_failures: AtomicU64,
    /// Increment calls issued
    pub increments: AtomicU64,
    /// Total API requests sent (including retries)
    pub api_requests: AtomicU64,
    /// API retries
    pub api_retries: AtomicU64,
    /// API calls that failed terminally
    pub api_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        trace!(cache_op = "hit");
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        trace!(cache_op = "miss");
    }

    pub fn record_cache_purge(&self) {
        self.cache_purges.fetch_add(1, Ordering::Relaxed);
        trace!(cache_op = "purge");
    }

    pub fn record_storage_failure(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_flush(&self, slugs: u64) {
        self.batch_flushes.fetch_add(1, Ordering::Relaxed);
        self.batched_slugs.fetch_add(slugs, Ordering::Relaxed);
        trace!(coalescer_op = "flush", slugs);
    }

    pub fn record_batch_failure(&self) {
        self.batch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_increment(&self) {
        self.increments.fetch_add(1, Ordering::Relaxed);
        trace!(api_op = "increment");
    }

    pub fn record_api_request(&self, endpoint: &str) {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
        trace!(api_op = "request", endpoint);
    }

    pub fn record_api_retry(&self) {
        self.api_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_api_failure(&self, endpoint: &str) {
        self.api_failures.fetch_add(1, Ordering::Relaxed);
        trace!(api_op = "failure", endpoint);
    }

    /// Average number of slugs carried per batch flush.
    pub fn avg_batch_size(&self) -> f64 {
        let flushes = self.batch_flushes.load(Ordering::Relaxed);
        if flushes == 0 {
            return 0.0;
        }
        self.batched_slugs.load(Ordering::Relaxed) as f64 / flushes as f64
    }

    /// Log a summary of metrics
    pub fn log_summary(&self) {
        info!(
            operation = "pageviews_metrics_summary",
            cache_hits = self.cache_hits.load(Ordering::Relaxed),
            cache_misses = self.cache_misses.load(Ordering::Relaxed),
            cache_purges = self.cache_purges.load(Ordering::Relaxed),
            storage_failures = self.storage_failures.load(Ordering::Relaxed),
            batch_flushes = self.batch_flushes.load(Ordering::Relaxed),
            batched_slugs = self.batched_slugs.load(Ordering::Relaxed),
            batch_failures = self.batch_failures.load(Ordering::Relaxed),
            avg_batch_size = self.avg_batch_size(),
            increments = self.increments.load(Ordering::Relaxed),
            api_requests = self.api_requests.load(Ordering::Relaxed),
            api_retries = self.api_retries.load(Ordering::Relaxed),
            api_failures = self.api_failures.load(Ordering::Relaxed),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_batch_flush(10);
        metrics.record_batch_flush(4);
        metrics.record_increment();

        assert_eq!(metrics.cache_hits.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.cache_misses.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.batch_flushes.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.batched_slugs.load(Ordering::Relaxed), 14);
        assert_eq!(metrics.increments.load(Ordering::Relaxed), 1);
        assert!((metrics.avg_batch_size() - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_avg_batch_size_no_flushes() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_batch_size(), 0.0);
    }
}
