pub mod api;
pub mod cache;
pub mod clock;
pub mod coalescer;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod session;
pub mod storage;

pub use api::ViewsClient;
pub use cache::{ViewsCache, CACHE_KEY, DEFAULT_CACHE_TTL};
pub use clock::{Clock, SystemClock};
pub use coalescer::{RequestCoalescer, DEFAULT_DEBOUNCE};
pub use config::{CliArgs, Config};
pub use context::{CounterState, ViewCounter, ViewsContext, SITE_VISITOR_SLUG};
pub use error::{PageviewsError, PageviewsResult, ValidationIssue};
pub use metrics::Metrics;
pub use session::SessionGate;
pub use storage::{FileStorage, MemoryStorage, Storage};
