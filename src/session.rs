use crate::metrics::Metrics;
use crate::storage::Storage;
use std::sync::Arc;
use tracing::{debug, trace};

/// Per-session memory of which slugs have already been counted.
///
/// At most one increment is issued per slug per session; the flag is set
/// only after a successful increment, so a failed attempt stays retryable.
/// Storage failures read as "not viewed", which can only over-count, never
/// crash.
pub struct SessionGate {
    storage: Arc<dyn Storage>,
    metrics: Arc<Metrics>,
}

impl SessionGate {
    pub fn new(storage: Arc<dyn Storage>, metrics: Arc<Metrics>) -> Self {
        Self { storage, metrics }
    }

    fn key_for(slug: &str) -> String {
        format!("viewed-{}", slug)
    }

    /// Has a view already been counted for this slug in this session?
    pub fn has_viewed(&self, slug: &str) -> bool {
        match self.storage.get_item(&Self::key_for(slug)) {
            Ok(flag) => flag.is_some(),
            Err(e) => {
                debug!(slug, error = %e, "Session storage read failed");
                self.metrics.record_storage_failure();
                false
            }
        }
    }

    /// Record that this session's view of the slug has been counted.
    pub fn mark_viewed(&self, slug: &str) {
        trace!(slug, "Marking slug viewed for session");
        if let Err(e) = self.storage.set_item(&Self::key_for(slug), "true") {
            debug!(slug, error = %e, "Session storage write failed");
            self.metrics.record_storage_failure();
        }
    }
}
