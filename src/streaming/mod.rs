//! Chunked range streaming.
//!
//! Request path for `GET /dl/{opaque_id}/{display_name}`:
//!
//! 1. decode the opaque id into a reference tuple
//! 2. [`Dispatcher::pick`] the least-loaded identity and take its engine
//! 3. resolve the descriptor through the engine's cache and check its hash
//! 4. [`plan_range`] turns the `Range` header into a chunk plan
//! 5. [`ByteStreamer::stream`] fetches and trims the chunks
//!
//! # Modules
//!
//! - `session`: one session per datacenter per identity, with authorization retry
//! - `resolver`: descriptor lookup and the periodically cleared cache
//! - `engine`: the chunk stream and its workload accounting
//! - `dispatcher`: least-loaded identity selection
//! - `range`: range math and response headers

mod download;
pub mod dispatcher;
pub mod engine;
pub mod range;
pub mod resolver;
pub mod session;

pub use dispatcher::{least_loaded, Dispatcher};
pub use download::download;
pub use engine::{ByteStreamer, ChunkStream, OutcomeHandle, StreamOutcome, WorkloadGuard};
pub use range::{content_disposition, download_name, plan_range, ChunkPlan, RangePlan};
pub use resolver::FileResolver;
pub use session::{RetryFailure, RetryPolicy, SessionManager};

use axum::{routing::get, Router};
use std::time::Duration;

use crate::server::AppContext;

/// Tunables shared by every engine in a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Bytes requested per backend fetch.
    pub chunk_size: u64,
    /// Period of the wholesale descriptor cache clear.
    pub cache_clear_interval: Duration,
    /// Bound on a single chunk fetch.
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            cache_clear_interval: Duration::from_secs(30 * 60),
            fetch_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Create the download router.
pub fn download_router() -> Router<AppContext> {
    Router::new().route("/:opaque_id/:display_name", get(download))
}
