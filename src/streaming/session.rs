//! Per-identity session table.
//!
//! Keeps at most one live [`MediaSession`] per datacenter. Sessions to the
//! identity's home datacenter reuse its credential; sessions elsewhere get a
//! fresh key plus an exported authorization, retried under a [`RetryPolicy`].

use crate::backend::{BackendError, BackendIdentity, MediaSession, SessionAuth};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use streamgate_common::{DcId, Error, Result};
use tokio::sync::Mutex;

/// Bounded retry for the cross-datacenter authorization handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after a connection error, skipped after the last attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure {
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: BackendError },
    /// An attempt failed with an error that is not worth retrying.
    Fatal { attempt: u32, error: BackendError },
}

impl RetryFailure {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryFailure::Exhausted { attempts, .. } => *attempts,
            RetryFailure::Fatal { attempt, .. } => *attempt,
        }
    }
}

enum Decision {
    Retry,
    RetryAfterBackoff,
    GiveUp,
}

impl RetryPolicy {
    fn decide(error: &BackendError) -> Decision {
        match error {
            BackendError::AuthBytesInvalid => Decision::Retry,
            BackendError::Connection(_) => Decision::RetryAfterBackoff,
            _ => Decision::GiveUp,
        }
    }

    /// Run `op` until it succeeds, fails fatally or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> std::result::Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, BackendError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let decision = Self::decide(&error);
            if matches!(decision, Decision::GiveUp) {
                return Err(RetryFailure::Fatal { attempt, error });
            }
            if attempt >= max_attempts {
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            tracing::debug!(attempt, error = %error, "Retrying authorization import");
            if matches!(decision, Decision::RetryAfterBackoff) {
                tokio::time::sleep(self.backoff).await;
            }
            attempt += 1;
        }
    }
}

type SessionSlot = Arc<Mutex<Option<Arc<dyn MediaSession>>>>;

/// Session table of one backend identity.
pub struct SessionManager {
    identity: Arc<dyn BackendIdentity>,
    sessions: DashMap<DcId, SessionSlot>,
    policy: RetryPolicy,
}

impl SessionManager {
    pub fn new(identity: Arc<dyn BackendIdentity>, policy: RetryPolicy) -> Self {
        Self {
            identity,
            sessions: DashMap::new(),
            policy,
        }
    }

    pub fn identity(&self) -> &Arc<dyn BackendIdentity> {
        &self.identity
    }

    /// Ready session for `dc_id`, establishing one if needed.
    ///
    /// Concurrent callers for the same datacenter wait for the session being
    /// established instead of opening their own. Failures are not cached.
    pub async fn session_for(&self, dc_id: DcId) -> Result<Arc<dyn MediaSession>> {
        let slot = Arc::clone(self.sessions.entry(dc_id).or_default().value());
        let mut guard = slot.lock().await;

        if let Some(session) = guard.as_ref() {
            tracing::trace!(identity = self.identity.name(), dc = %dc_id, "Reusing session");
            return Ok(Arc::clone(session));
        }

        let session = self.establish(dc_id).await?;
        *guard = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn establish(&self, dc_id: DcId) -> Result<Arc<dyn MediaSession>> {
        let name = self.identity.name();

        if dc_id == self.identity.home_dc() {
            tracing::debug!(identity = name, dc = %dc_id, "Opening home session");
            return self
                .identity
                .open_session(dc_id, SessionAuth::HomeCredential)
                .await
                .map_err(|e| {
                    tracing::warn!(identity = name, dc = %dc_id, error = %e, "Home session failed");
                    Error::SessionUnavailable { dc_id, attempts: 1 }
                });
        }

        tracing::debug!(identity = name, dc = %dc_id, "Opening session with fresh key");
        let session = self
            .identity
            .open_session(dc_id, SessionAuth::FreshKey)
            .await
            .map_err(|e| {
                tracing::warn!(identity = name, dc = %dc_id, error = %e, "Session open failed");
                Error::SessionUnavailable { dc_id, attempts: 0 }
            })?;

        let identity = &self.identity;
        let pending = &session;
        let handshake = self
            .policy
            .run(|attempt| async move {
                tracing::debug!(identity = name, dc = %dc_id, attempt, "Importing authorization");
                let token = identity.export_authorization(dc_id).await?;
                pending.import_authorization(&token).await
            })
            .await;

        match handshake {
            Ok(()) => {
                tracing::debug!(identity = name, dc = %dc_id, "Session authorized");
                Ok(session)
            }
            Err(failure) => {
                tracing::warn!(
                    identity = name,
                    dc = %dc_id,
                    attempts = failure.attempts(),
                    failure = ?failure,
                    "Authorization handshake failed"
                );
                session.stop().await;
                Err(Error::SessionUnavailable {
                    dc_id,
                    attempts: failure.attempts(),
                })
            }
        }
    }

    /// Stop and forget the cached session for `dc_id` if it is still `failed`.
    ///
    /// A session established by another caller in the meantime is kept.
    pub async fn invalidate(&self, dc_id: DcId, failed: &Arc<dyn MediaSession>) {
        let Some(slot) = self.sessions.get(&dc_id).map(|slot| Arc::clone(slot.value())) else {
            return;
        };
        let mut guard = slot.lock().await;
        if !matches!(guard.as_ref(), Some(cached) if Arc::ptr_eq(cached, failed)) {
            return;
        }
        if let Some(session) = guard.take() {
            tracing::warn!(
                identity = self.identity.name(),
                dc = %dc_id,
                "Dropping session after authorization failure"
            );
            session.stop().await;
        }
    }

    /// Number of datacenters with an established session.
    pub fn active_sessions(&self) -> usize {
        self.sessions
            .iter()
            .filter(|slot| matches!(slot.value().try_lock(), Ok(guard) if guard.is_some()))
            .count()
    }

    /// Stop and forget every cached session.
    pub async fn shutdown(&self) {
        let slots: Vec<SessionSlot> = self
            .sessions
            .iter()
            .map(|slot| Arc::clone(slot.value()))
            .collect();
        for slot in slots {
            if let Some(session) = slot.lock().await.take() {
                tracing::debug!(
                    identity = self.identity.name(),
                    dc = %session.dc_id(),
                    "Stopping session"
                );
                session.stop().await;
            }
        }
        self.sessions.clear();
    }
}
