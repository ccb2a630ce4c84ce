//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a dispatcher over an in-memory
//! backend and the full [`AppContext`], plus helpers for driving the router
//! with `oneshot`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use tower::ServiceExt;

use streamgate::backend::{BackendIdentity, MemoryBackend};
use streamgate::config::Config;
use streamgate::server::{create_router, AppContext};
use streamgate::streaming::{Dispatcher, RetryPolicy, StreamSettings};
use streamgate_common::{DcId, ReferenceTuple};

/// Chunk size used by the harness, small enough to exercise multi-chunk plans.
pub const CHUNK: u64 = 4096;

/// Test harness wrapping a dispatcher over a [`MemoryBackend`].
pub struct TestHarness {
    pub backend: MemoryBackend,
    pub dispatcher: Arc<Dispatcher>,
    pub ctx: AppContext,
}

impl TestHarness {
    /// Two identities, both homed in DC 2.
    pub fn new() -> Self {
        Self::with_identities(&[("bot1", 2), ("bot2", 2)])
    }

    pub fn with_identities(identities: &[(&str, i32)]) -> Self {
        let backend = MemoryBackend::new();
        let pool = identities
            .iter()
            .map(|(name, home)| {
                Arc::new(backend.identity(*name, DcId(*home))) as Arc<dyn BackendIdentity>
            })
            .collect();
        let settings = StreamSettings {
            chunk_size: CHUNK,
            cache_clear_interval: Duration::from_secs(1800),
            fetch_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 6,
                backoff: Duration::from_millis(10),
            },
        };
        let dispatcher = Arc::new(Dispatcher::new(pool, settings).unwrap());
        let ctx = AppContext::new(Arc::clone(&dispatcher), Config::default());

        Self {
            backend,
            dispatcher,
            ctx,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    /// Store `data` as message `message_id` of store 1001 in `dc` and return its link.
    pub fn insert(
        &self,
        message_id: i64,
        dc: i32,
        name: Option<&str>,
        mime: Option<&str>,
        data: Vec<u8>,
    ) -> String {
        let tuple = self
            .backend
            .insert_object(1001, message_id, DcId(dc), name, mime, data);
        link(&tuple)
    }

    pub async fn get(&self, uri: &str, range: Option<&str>) -> Response<Body> {
        let mut request = Request::get(uri);
        if let Some(range) = range {
            request = request.header("range", range);
        }
        self.router()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn download(&self, link: &str, range: Option<&str>) -> Response<Body> {
        self.get(&format!("/dl/{link}/file"), range).await
    }
}

pub fn link(tuple: &ReferenceTuple) -> String {
    streamgate_codec::encode(tuple).unwrap()
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub async fn body_bytes(body: Body) -> Bytes {
    body.collect().await.unwrap().to_bytes()
}

pub async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}
