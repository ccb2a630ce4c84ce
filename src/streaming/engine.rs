//! Chunk streaming engine.
//!
//! One [`ByteStreamer`] per backend identity. It owns the identity's session
//! table and descriptor cache, and turns a [`ChunkPlan`] into a lazy stream of
//! trimmed chunks.

use super::range::ChunkPlan;
use super::resolver::FileResolver;
use super::session::SessionManager;
use super::StreamSettings;
use crate::backend::{BackendError, BackendIdentity};
use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use streamgate_common::{Error, FileDescriptor, Result};
use tokio::task::JoinHandle;

/// Holds one unit of an identity's workload until dropped.
#[derive(Debug)]
pub struct WorkloadGuard {
    counter: Arc<AtomicUsize>,
}

impl WorkloadGuard {
    pub fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for WorkloadGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How a chunk stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every planned chunk was emitted.
    Completed { parts: u64 },
    /// The backend returned an empty chunk before the plan was exhausted.
    EndOfObject { parts: u64 },
    /// A timeout or malformed response ended the stream early.
    Truncated { parts: u64, reason: String },
    /// Session setup or a fetch failed; an error item was yielded.
    Failed(String),
    /// The consumer dropped the stream before it ended.
    Cancelled { parts: u64 },
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOutcome::Completed { parts } => write!(f, "completed after {parts} parts"),
            StreamOutcome::EndOfObject { parts } => write!(f, "end of object after {parts} parts"),
            StreamOutcome::Truncated { parts, reason } => {
                write!(f, "truncated after {parts} parts: {reason}")
            }
            StreamOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            StreamOutcome::Cancelled { parts } => write!(f, "cancelled after {parts} parts"),
        }
    }
}

/// Shared view of a stream's terminal state.
#[derive(Debug, Clone, Default)]
pub struct OutcomeHandle(Arc<Mutex<Option<StreamOutcome>>>);

impl OutcomeHandle {
    /// `None` while the stream is still running.
    pub fn get(&self) -> Option<StreamOutcome> {
        self.0.lock().clone()
    }

    /// Record the outcome unless one is already set.
    fn finish(&self, identity_index: usize, outcome: StreamOutcome) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            tracing::debug!(identity_index, outcome = %outcome, "Stream finished");
            *slot = Some(outcome);
        }
    }
}

/// Lazy sequence of trimmed chunks for one request.
///
/// Dropping it before it ends releases the workload and records
/// [`StreamOutcome::Cancelled`].
pub struct ChunkStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    outcome: OutcomeHandle,
    parts: Arc<AtomicU64>,
    part_count: u64,
    identity_index: usize,
}

impl ChunkStream {
    pub fn outcome(&self) -> OutcomeHandle {
        self.outcome.clone()
    }
}

impl Stream for ChunkStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        let parts = self.parts.load(Ordering::SeqCst);
        let outcome = if parts == self.part_count {
            // Dropped after the last chunk, before polling the end.
            StreamOutcome::Completed { parts }
        } else {
            StreamOutcome::Cancelled { parts }
        };
        self.outcome.finish(self.identity_index, outcome);
    }
}

/// Streaming engine of one backend identity.
pub struct ByteStreamer {
    sessions: SessionManager,
    resolver: Arc<FileResolver>,
    workload: Arc<AtomicUsize>,
    fetch_timeout: Duration,
    clear_task: JoinHandle<()>,
}

impl ByteStreamer {
    /// Create the engine and start its cache clear task.
    pub fn new(
        identity: Arc<dyn BackendIdentity>,
        workload: Arc<AtomicUsize>,
        settings: &StreamSettings,
    ) -> Self {
        let resolver = Arc::new(FileResolver::new(Arc::clone(&identity)));
        let clear_task = resolver.start_clear_task(settings.cache_clear_interval);
        Self {
            sessions: SessionManager::new(identity, settings.retry),
            resolver,
            workload,
            fetch_timeout: settings.fetch_timeout,
            clear_task,
        }
    }

    pub fn resolver(&self) -> &FileResolver {
        &self.resolver
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Resolve a descriptor through this identity's cache.
    pub async fn resolve(&self, store_id: i64, message_id: i64) -> Result<FileDescriptor> {
        self.resolver.resolve(store_id, message_id).await
    }

    /// Stream `plan` out of `descriptor`.
    ///
    /// The workload is taken here, before the first poll, and released
    /// when the stream ends or is dropped.
    pub fn stream(
        self: &Arc<Self>,
        descriptor: FileDescriptor,
        identity_index: usize,
        plan: ChunkPlan,
    ) -> ChunkStream {
        let guard = WorkloadGuard::acquire(&self.workload);
        let engine = Arc::clone(self);
        let outcome = OutcomeHandle::default();
        let parts = Arc::new(AtomicU64::new(0));

        let record = outcome.clone();
        let emitted = Arc::clone(&parts);
        let inner = async_stream::stream! {
            let _guard = guard;

            if plan.part_count == 0 {
                record.finish(identity_index, StreamOutcome::Completed { parts: 0 });
                return;
            }

            tracing::debug!(
                identity_index,
                dc = %descriptor.dc_id,
                offset = plan.offset,
                part_count = plan.part_count,
                "Stream started"
            );

            let session = match engine.sessions.session_for(descriptor.dc_id).await {
                Ok(session) => session,
                Err(e) => {
                    record.finish(identity_index, StreamOutcome::Failed(e.to_string()));
                    yield Err(e);
                    return;
                }
            };

            let mut offset = plan.offset;
            let mut part = 1;
            loop {
                let fetched = tokio::time::timeout(
                    engine.fetch_timeout,
                    session.fetch(&descriptor.location, offset, plan.chunk_size),
                )
                .await
                .unwrap_or_else(|_| Err(BackendError::Timeout));

                let chunk = match fetched {
                    Ok(chunk) => chunk,
                    Err(e) if e.is_transient() => {
                        tracing::warn!(identity_index, offset, error = %e, "Stream truncated");
                        record.finish(
                            identity_index,
                            StreamOutcome::Truncated { parts: part - 1, reason: e.to_string() },
                        );
                        return;
                    }
                    Err(e) => {
                        tracing::error!(identity_index, offset, error = %e, "Chunk fetch failed");
                        if matches!(e, BackendError::Unauthorized(_)) {
                            engine.sessions.invalidate(descriptor.dc_id, &session).await;
                        }
                        record.finish(identity_index, StreamOutcome::Failed(e.to_string()));
                        yield Err(Error::backend(e.to_string()));
                        return;
                    }
                };

                if chunk.is_empty() {
                    record.finish(identity_index, StreamOutcome::EndOfObject { parts: part - 1 });
                    return;
                }

                emitted.store(part, Ordering::SeqCst);
                yield Ok(plan.trim(part, chunk));

                if part >= plan.part_count {
                    record.finish(identity_index, StreamOutcome::Completed { parts: part });
                    return;
                }
                part += 1;
                offset += plan.chunk_size;
            }
        };

        ChunkStream {
            inner: Box::pin(inner),
            outcome,
            parts,
            part_count: plan.part_count,
            identity_index,
        }
    }

    /// Stop every session of this identity.
    pub async fn shutdown(&self) {
        self.clear_task.abort();
        self.sessions.shutdown().await;
    }
}

impl Drop for ByteStreamer {
    fn drop(&mut self) {
        self.clear_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::streaming::plan_range;
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use streamgate_common::DcId;

    const CHUNK: u64 = 4;

    fn settings() -> StreamSettings {
        StreamSettings {
            chunk_size: CHUNK,
            ..StreamSettings::default()
        }
    }

    struct Fixture {
        backend: MemoryBackend,
        workload: Arc<AtomicUsize>,
        engine: Arc<ByteStreamer>,
    }

    fn fixture(data: Vec<u8>) -> Fixture {
        let backend = MemoryBackend::new();
        backend.insert_object(1, 2, DcId(4), Some("a.bin"), None, data);
        let workload = Arc::new(AtomicUsize::new(0));
        let identity = Arc::new(backend.identity("bot1", DcId(2)));
        let engine = Arc::new(ByteStreamer::new(identity, Arc::clone(&workload), &settings()));
        Fixture {
            backend,
            workload,
            engine,
        }
    }

    async fn collect(stream: ChunkStream) -> (Vec<u8>, Vec<Error>) {
        let mut bytes = Vec::new();
        let mut errors = Vec::new();
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => bytes.extend_from_slice(&chunk),
                Err(e) => errors.push(e),
            }
        }
        (bytes, errors)
    }

    #[tokio::test]
    async fn test_streams_exact_window() {
        let f = fixture((0..20u8).collect());
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(20, Some("bytes=3-13"), CHUNK).unwrap();

        let stream = f.engine.stream(descriptor, 0, plan.chunks);
        let outcome = stream.outcome();
        let (bytes, errors) = collect(stream).await;

        assert!(errors.is_empty());
        assert_eq!(bytes, (3..=13u8).collect::<Vec<_>>());
        assert_eq!(outcome.get(), Some(StreamOutcome::Completed { parts: 4 }));
        assert_eq!(f.workload.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_chunk_gets_both_cuts() {
        let f = fixture((0..20u8).collect());
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(20, Some("bytes=5-6"), CHUNK).unwrap();

        let (bytes, _) = collect(f.engine.stream(descriptor, 0, plan.chunks)).await;
        assert_eq!(bytes, vec![5, 6]);
        assert_eq!(f.backend.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_end_of_object() {
        let f = fixture((0..6u8).collect());
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = ChunkPlan {
            offset: 0,
            first_cut: 0,
            last_cut: 4,
            part_count: 5,
            chunk_size: CHUNK,
        };

        let stream = f.engine.stream(descriptor, 0, plan);
        let outcome = stream.outcome();
        let (bytes, _) = collect(stream).await;
        assert_eq!(bytes, (0..6u8).collect::<Vec<_>>());
        assert_eq!(outcome.get(), Some(StreamOutcome::EndOfObject { parts: 2 }));
    }

    #[tokio::test]
    async fn test_transient_error_truncates_silently() {
        let f = fixture((0..20u8).collect());
        f.backend.fail_fetch_at(8, BackendError::Timeout);
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(20, None, CHUNK).unwrap();

        let stream = f.engine.stream(descriptor, 0, plan.chunks);
        let outcome = stream.outcome();
        let (bytes, errors) = collect(stream).await;

        assert!(errors.is_empty());
        assert_eq!(bytes, (0..8u8).collect::<Vec<_>>());
        assert_matches!(outcome.get(), Some(StreamOutcome::Truncated { parts: 2, .. }));
        assert_eq!(f.workload.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fatal_fetch_error_is_yielded() {
        let f = fixture((0..20u8).collect());
        f.backend.fail_fetch_at(4, BackendError::Connection("reset".into()));
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(20, None, CHUNK).unwrap();

        let stream = f.engine.stream(descriptor, 0, plan.chunks);
        let outcome = stream.outcome();
        let (bytes, errors) = collect(stream).await;

        assert_eq!(bytes.len(), 4);
        assert_eq!(errors.len(), 1);
        assert_matches!(errors[0], Error::Backend(_));
        assert_matches!(outcome.get(), Some(StreamOutcome::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_fetch_times_out() {
        let f = fixture((0..20u8).collect());
        f.backend.set_fetch_delay(Duration::from_secs(120));
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(20, None, CHUNK).unwrap();

        let stream = f.engine.stream(descriptor, 0, plan.chunks);
        let outcome = stream.outcome();
        let (bytes, errors) = collect(stream).await;

        assert!(bytes.is_empty());
        assert!(errors.is_empty());
        assert_matches!(outcome.get(), Some(StreamOutcome::Truncated { parts: 0, .. }));
    }

    #[tokio::test]
    async fn test_session_failure_is_yielded() {
        let f = fixture((0..20u8).collect());
        f.backend.fail_imports(BackendError::AuthBytesInvalid);
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(20, None, CHUNK).unwrap();

        let stream = f.engine.stream(descriptor, 0, plan.chunks);
        let outcome = stream.outcome();
        let (bytes, errors) = collect(stream).await;

        assert!(bytes.is_empty());
        assert_matches!(
            errors.as_slice(),
            [Error::SessionUnavailable { attempts: 6, .. }]
        );
        assert_matches!(outcome.get(), Some(StreamOutcome::Failed(_)));
        assert_eq!(f.workload.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_parts_completes_without_fetching() {
        let f = fixture(Vec::new());
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(0, None, CHUNK).unwrap();

        let stream = f.engine.stream(descriptor, 0, plan.chunks);
        let outcome = stream.outcome();
        let (bytes, _) = collect(stream).await;
        assert!(bytes.is_empty());
        assert_eq!(outcome.get(), Some(StreamOutcome::Completed { parts: 0 }));
        assert_eq!(f.backend.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_workload_held_while_streaming_and_released_on_drop() {
        let f = fixture((0..20u8).collect());
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(20, None, CHUNK).unwrap();

        let mut stream = f.engine.stream(descriptor.clone(), 0, plan.chunks);
        assert_eq!(f.workload.load(Ordering::SeqCst), 1);
        let never_polled = f.engine.stream(descriptor, 0, plan.chunks);
        assert_eq!(f.workload.load(Ordering::SeqCst), 2);

        assert!(stream.next().await.is_some());
        let outcome = stream.outcome();
        drop(stream);
        drop(never_polled);

        assert_eq!(f.workload.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.get(), Some(StreamOutcome::Cancelled { parts: 1 }));
    }

    #[tokio::test]
    async fn test_concurrent_streams_conserve_workload() {
        let f = fixture((0..64u8).collect());
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(64, None, CHUNK).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let mut stream = f.engine.stream(descriptor.clone(), 0, plan.chunks);
                tokio::spawn(async move {
                    // Odd tasks hang up after the first chunk.
                    let take = if i % 2 == 0 { usize::MAX } else { 1 };
                    let mut seen = 0;
                    while seen < take && stream.next().await.is_some() {
                        seen += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(f.workload.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_fetch_reopens_session() {
        let f = fixture((0..20u8).collect());
        f.backend
            .fail_fetch_at(0, BackendError::Unauthorized("auth key revoked".into()));
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(20, None, CHUNK).unwrap();

        let stream = f.engine.stream(descriptor.clone(), 0, plan.chunks);
        let outcome = stream.outcome();
        let (_, errors) = collect(stream).await;
        assert_eq!(errors.len(), 1);
        assert_matches!(outcome.get(), Some(StreamOutcome::Failed(_)));
        assert_eq!(f.engine.sessions().active_sessions(), 0);
        assert_eq!(f.backend.sessions_stopped(), 1);

        f.backend.clear_fetch_faults();
        let stream = f.engine.stream(descriptor, 0, plan.chunks);
        let outcome = stream.outcome();
        let (bytes, errors) = collect(stream).await;
        assert!(errors.is_empty());
        assert_eq!(bytes, (0..20u8).collect::<Vec<_>>());
        assert_eq!(outcome.get(), Some(StreamOutcome::Completed { parts: 5 }));
        assert_eq!(f.backend.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn test_session_reused_across_streams() {
        let f = fixture((0..20u8).collect());
        let descriptor = f.engine.resolve(1, 2).await.unwrap();
        let plan = plan_range(20, None, CHUNK).unwrap();

        collect(f.engine.stream(descriptor.clone(), 0, plan.chunks)).await;
        collect(f.engine.stream(descriptor, 0, plan.chunks)).await;
        assert_eq!(f.backend.sessions_opened(), 1);
        assert_eq!(f.backend.import_attempts(), 1);
    }
}
