//! Least-loaded identity selection.

use super::engine::ByteStreamer;
use super::StreamSettings;
use crate::backend::BackendIdentity;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use streamgate_common::{Error, Result};

struct IdentitySlot {
    identity: Arc<dyn BackendIdentity>,
    workload: Arc<AtomicUsize>,
    engine: OnceLock<Arc<ByteStreamer>>,
}

/// Pool of backend identities, each with its own workload and engine.
pub struct Dispatcher {
    slots: Vec<IdentitySlot>,
    settings: StreamSettings,
}

/// Index of the first minimum in `loads`.
pub fn least_loaded(loads: &[usize]) -> Option<usize> {
    loads
        .iter()
        .enumerate()
        .min_by_key(|(_, load)| **load)
        .map(|(index, _)| index)
}

impl Dispatcher {
    pub fn new(identities: Vec<Arc<dyn BackendIdentity>>, settings: StreamSettings) -> Result<Self> {
        if identities.is_empty() {
            return Err(Error::validation("at least one backend identity is required"));
        }
        let slots = identities
            .into_iter()
            .map(|identity| IdentitySlot {
                identity,
                workload: Arc::new(AtomicUsize::new(0)),
                engine: OnceLock::new(),
            })
            .collect();
        Ok(Self { slots, settings })
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Point-in-time workload of every identity, in pool order.
    pub fn workloads(&self) -> Vec<usize> {
        self.slots
            .iter()
            .map(|slot| slot.workload.load(Ordering::SeqCst))
            .collect()
    }

    /// `(name, workload)` of every identity, in pool order.
    pub fn identity_loads(&self) -> Vec<(String, usize)> {
        self.slots
            .iter()
            .map(|slot| {
                (
                    slot.identity.name().to_string(),
                    slot.workload.load(Ordering::SeqCst),
                )
            })
            .collect()
    }

    /// Index of the least-loaded identity; ties go to the lowest index.
    pub fn pick(&self) -> usize {
        least_loaded(&self.workloads()).unwrap_or(0)
    }

    /// Engine of identity `index`, created on first use.
    pub fn engine(&self, index: usize) -> Option<Arc<ByteStreamer>> {
        let slot = self.slots.get(index)?;
        let engine = slot.engine.get_or_init(|| {
            tracing::debug!(
                identity_index = index,
                identity = slot.identity.name(),
                "Creating streaming engine"
            );
            Arc::new(ByteStreamer::new(
                Arc::clone(&slot.identity),
                Arc::clone(&slot.workload),
                &self.settings,
            ))
        });
        Some(Arc::clone(engine))
    }

    /// Number of identities whose engine has been created.
    pub fn connected(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.engine.get().is_some())
            .count()
    }

    /// Stop the sessions of every created engine.
    pub async fn shutdown(&self) {
        for slot in &self.slots {
            if let Some(engine) = slot.engine.get() {
                engine.shutdown().await;
            }
        }
    }
}
