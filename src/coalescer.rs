use crate::api::ViewsClient;
use crate::cache::ViewsCache;
use crate::metrics::Metrics;
use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Default quiet period before a flush.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Collects read-misses for individual slugs and flushes them as one batch
/// read after a quiet period.
///
/// The debounce timer restarts whenever a new slug becomes pending, so a
/// burst of near-simultaneous misses (a list page mounting many counters)
/// collapses into a single network call. A slug that is already pending or
/// mid-flight is never queued twice. A failed batch drops its slugs for the
/// cycle; the next read-miss re-queues them.
pub struct RequestCoalescer {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<ViewsClient>,
    cache: Arc<ViewsCache>,
    metrics: Arc<Metrics>,
    debounce: Duration,
    pending: Mutex<HashSet<String>>,
    in_flight: DashSet<String>,
    timer: Mutex<Option<JoinHandle<()>>>,
    settled: Notify,
}

impl RequestCoalescer {
    pub fn new(
        client: Arc<ViewsClient>,
        cache: Arc<ViewsCache>,
        metrics: Arc<Metrics>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                cache,
                metrics,
                debounce,
                pending: Mutex::new(HashSet::new()),
                in_flight: DashSet::new(),
                timer: Mutex::new(None),
                settled: Notify::new(),
            }),
        }
    }

    /// Queue a slug for the next batch read.
    ///
    /// No-op if the slug is already pending or in an unresolved batch.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, slug: &str) {
        let newly_pending = {
            let mut pending = self.inner.pending.lock().expect("pending lock poisoned");
            // A flush marks its slugs in-flight while holding this same
            // lock, so the check cannot miss a batch that has already
            // claimed the slug
            if self.inner.in_flight.contains(slug) {
                trace!(slug, "Slug already in flight, not re-queueing");
                return;
            }
            pending.insert(slug.to_string())
        };

        // Only a new pending slug restarts the quiet period
        if newly_pending {
            trace!(slug, "Queued slug for batch read");
            self.arm_timer();
        }
    }

    fn arm_timer(&self) {
        let inner = Arc::clone(&self.inner);
        // Only the sleep is abortable. The flush itself runs in its own
        // task, so re-arming the timer can never cancel a batch that has
        // already started (which would strand its slugs as in-flight).
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                Inner::flush(&inner).await;
            });
        });

        let mut timer = self.inner.timer.lock().expect("timer lock poisoned");
        if let Some(old) = timer.replace(handle) {
            old.abort();
        }
    }

    /// Flush the pending set immediately, without waiting out the debounce.
    pub async fn flush_now(&self) {
        {
            let mut timer = self.inner.timer.lock().expect("timer lock poisoned");
            if let Some(old) = timer.take() {
                old.abort();
            }
        }
        Inner::flush(&self.inner).await;
    }

    /// Wait until the next flush (successful or not) has settled.
    pub async fn settled(&self) {
        self.inner.settled.notified().await;
    }

    /// Number of slugs currently awaiting a flush.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().expect("pending lock poisoned").len()
    }
}

impl Inner {
    async fn flush(inner: &Arc<Inner>) {
        // Atomically swap out the pending set, marking its slugs in-flight
        // before the lock drops so an enqueue racing this flush cannot
        // re-queue a slug the batch is about to cover
        let slugs: Vec<String> = {
            let mut pending = inner.pending.lock().expect("pending lock poisoned");
            let slugs: Vec<String> = pending.drain().collect();
            for slug in &slugs {
                inner.in_flight.insert(slug.clone());
            }
            slugs
        };

        if slugs.is_empty() {
            inner.settled.notify_waiters();
            return;
        }

        debug!(slugs = slugs.len(), "Flushing batch read");
        inner.metrics.record_batch_flush(slugs.len() as u64);

        match inner.client.get_views_batch(&slugs).await {
            Ok(views) => {
                inner.cache.write(views);
            }
            Err(e) => {
                // Dropped for this cycle; a later read-miss re-queues them
                warn!(error = %e, slugs = slugs.len(), "Batch read failed");
                inner.metrics.record_batch_failure();
            }
        }

        for slug in &slugs {
            inner.in_flight.remove(slug);
        }
        inner.settled.notify_waiters();
    }
}

impl Drop for RequestCoalescer {
    fn drop(&mut self) {
        // Session teardown: an un-fired timer must not outlive the context
        if let Ok(mut timer) = self.inner.timer.lock() {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
    }
}
