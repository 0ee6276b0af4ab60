use crate::api::ViewsClient;
use crate::cache::ViewsCache;
use crate::clock::{Clock, SystemClock};
use crate::coalescer::RequestCoalescer;
use crate::config::Config;
use crate::error::PageviewsResult;
use crate::metrics::Metrics;
use crate::session::SessionGate;
use crate::storage::{FileStorage, MemoryStorage, Storage};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Reserved slug backing the sitewide visitor counter.
pub const SITE_VISITOR_SLUG: &str = "_site_visitors";

/// One browser-session's worth of view-count state: cache, session flags,
/// and the batch coalescer, wired to one API client.
///
/// Constructed once per session and passed to every `ViewCounter`; dropping
/// it tears the session down (session flags are in-memory, so a new context
/// is a new session). The durable cache outlives the context by design.
pub struct ViewsContext {
    client: Arc<ViewsClient>,
    cache: Arc<ViewsCache>,
    coalescer: RequestCoalescer,
    session: SessionGate,
    metrics: Arc<Metrics>,
}

impl ViewsContext {
    /// Wire a context from its parts. Storage for the cache is durable
    /// across sessions; storage for the gate lives only as long as the
    /// session it models.
    pub fn new(
        client: Arc<ViewsClient>,
        durable_storage: Arc<dyn Storage>,
        session_storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        cache_ttl: Duration,
        debounce: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        let cache = Arc::new(ViewsCache::new(
            durable_storage,
            clock,
            cache_ttl,
            Arc::clone(&metrics),
        ));
        let coalescer = RequestCoalescer::new(
            Arc::clone(&client),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            debounce,
        );
        let session = SessionGate::new(session_storage, Arc::clone(&metrics));

        Self {
            client,
            cache,
            coalescer,
            session,
            metrics,
        }
    }

    /// Standard wiring: file-backed durable cache, in-memory session flags,
    /// system clock.
    pub fn from_config(config: &Config) -> PageviewsResult<Self> {
        let metrics = Arc::new(Metrics::new());
        let client = Arc::new(ViewsClient::with_config(
            config.api.url.clone(),
            config.api.max_retries,
            Duration::from_millis(config.api.retry_delay_ms),
            config.api.auth_credentials(),
            Some(Arc::clone(&metrics)),
        )?);

        let durable: Arc<dyn Storage> = match &config.cache.storage_dir {
            Some(dir) => Arc::new(FileStorage::new(dir.clone())?),
            None => Arc::new(FileStorage::from_default_location()?),
        };

        Ok(Self::new(
            client,
            durable,
            Arc::new(MemoryStorage::new()),
            Arc::new(SystemClock),
            Duration::from_secs(config.cache.ttl_secs),
            Duration::from_millis(config.coalesce.debounce_ms),
            metrics,
        ))
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn client(&self) -> &Arc<ViewsClient> {
        &self.client
    }

    /// Non-blocking read: the cached count if fresh, otherwise `None` with
    /// the slug queued for the next coalesced batch read.
    pub fn get_views(&self, slug: &str) -> Option<u64> {
        match self.cache.read(slug) {
            Some(views) => Some(views),
            None => {
                self.coalescer.enqueue(slug);
                None
            }
        }
    }

    /// Immediately batch-fetch any of the given slugs that are not cached.
    /// For callers that know their slugs up front (a list page); bypasses
    /// the debounce. Failures are absorbed.
    pub async fn prefetch_views(&self, slugs: &[String]) {
        let missing: Vec<String> = slugs
            .iter()
            .filter(|slug| self.cache.read(slug).is_none())
            .cloned()
            .collect();

        if missing.is_empty() {
            return;
        }

        self.metrics.record_batch_flush(missing.len() as u64);
        match self.client.get_views_batch(&missing).await {
            Ok(views) => self.cache.write(views),
            Err(e) => {
                warn!(error = %e, slugs = missing.len(), "Prefetch failed");
                self.metrics.record_batch_failure();
            }
        }
    }

    /// Count a view for this session:
    ///
    /// - already counted this session: behave like a plain read
    /// - otherwise increment immediately (never debounced) and cache the
    ///   authoritative post-increment count
    /// - on failure the session flag stays unset so a later mount retries;
    ///   any cached value keeps being served
    pub async fn increment_views(&self, slug: &str) -> Option<u64> {
        if self.session.has_viewed(slug) {
            return self.get_views(slug);
        }

        match self.client.increment_views(slug).await {
            Ok(views) => {
                self.cache.write_one(slug, views);
                self.session.mark_viewed(slug);
                Some(views)
            }
            Err(e) => {
                warn!(slug, error = %e, "Increment failed, leaving session flag unset");
                self.cache.read(slug)
            }
        }
    }

    /// Count one sitewide visit for this session.
    pub async fn record_visit(&self) -> Option<u64> {
        self.increment_views(SITE_VISITOR_SLUG).await
    }

    /// Read the sitewide visitor count. The server materializes the
    /// counter on first read.
    pub async fn visitor_count(&self) -> PageviewsResult<u64> {
        let visitors = self.client.get_visitors().await?;
        self.cache.write_one(SITE_VISITOR_SLUG, visitors);
        Ok(visitors)
    }

    /// Flush any pending coalesced reads immediately.
    pub async fn flush(&self) {
        self.coalescer.flush_now().await;
    }

    /// Wait until the next coalescer flush settles.
    pub async fn settled(&self) {
        self.coalescer.settled().await;
    }
}

/// What a counter should display right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterState {
    /// No value available yet (cached or fetched)
    Loading,
    /// A resolved count
    Resolved(u64),
}

impl std::fmt::Display for CounterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterState::Loading => write!(f, "..."),
            CounterState::Resolved(views) => write!(f, "{} views", views),
        }
    }
}

/// The per-slug display unit.
///
/// Mounting with `read_only = false` counts the view (once per slug per
/// session); every later mount in the same session, and every read-only
/// mount, only reads. `state()` re-queues a fetch on a cache miss, so an
/// expired entry refreshes silently on the next render.
pub struct ViewCounter {
    ctx: Arc<ViewsContext>,
    slug: String,
    read_only: bool,
}

impl ViewCounter {
    /// Mount the counter, running the increment-or-read flow once.
    pub async fn mount(ctx: Arc<ViewsContext>, slug: impl Into<String>, read_only: bool) -> Self {
        let counter = Self {
            ctx,
            slug: slug.into(),
            read_only,
        };

        if counter.read_only {
            let _ = counter.ctx.get_views(&counter.slug);
        } else {
            let _ = counter.ctx.increment_views(&counter.slug).await;
        }

        counter
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Current display state.
    pub fn state(&self) -> CounterState {
        match self.ctx.get_views(&self.slug) {
            Some(views) => CounterState::Resolved(views),
            None => CounterState::Loading,
        }
    }
}
