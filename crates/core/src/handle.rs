use crate::error::BuildError;
use crate::index::VectorIndex;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Empty,
    Building,
    Ready,
    Stale,
}

#[derive(Default)]
struct Slot {
    active: Option<Arc<VectorIndex>>,
    building: bool,
    stale: bool,
}

/// Shared pointer to the index that queries are served from.
///
/// Readers clone the `Arc` and search without holding the lock; a finished
/// build replaces the pointer in one write, so a query sees either the old
/// or the new index in full.
#[derive(Default)]
pub struct IndexHandle {
    slot: RwLock<Slot>,
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(index: VectorIndex) -> Self {
        Self {
            slot: RwLock::new(Slot {
                active: Some(Arc::new(index)),
                ..Slot::default()
            }),
        }
    }

    pub fn state(&self) -> IndexState {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        match (&slot.active, slot.building, slot.stale) {
            (_, true, _) => IndexState::Building,
            (Some(_), false, true) => IndexState::Stale,
            (Some(_), false, false) => IndexState::Ready,
            (None, false, _) => IndexState::Empty,
        }
    }

    /// The last complete index, if any. Kept serving while a rebuild runs.
    pub fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .clone()
    }

    /// Flags the active index as built from an outdated source.
    pub fn mark_stale(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.active.is_some() {
            slot.stale = true;
        }
    }

    /// Claims the single build slot. Dropping the guard without completing
    /// it leaves the previous index authoritative.
    pub fn begin_build(self: &Arc<Self>) -> Result<BuildGuard, BuildError> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.building {
            return Err(BuildError::AlreadyBuilding);
        }
        slot.building = true;
        Ok(BuildGuard {
            handle: Arc::clone(self),
            finished: false,
        })
    }
}

pub struct BuildGuard {
    handle: Arc<IndexHandle>,
    finished: bool,
}

impl BuildGuard {
    /// Swaps the new index in and returns it.
    pub fn complete(mut self, index: VectorIndex) -> Arc<VectorIndex> {
        let index = Arc::new(index);
        let mut slot = self
            .handle
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        slot.active = Some(Arc::clone(&index));
        slot.building = false;
        slot.stale = false;
        self.finished = true;
        info!(chunks = index.len(), model = %index.model_id(), "index swapped in");
        index
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut slot = self
            .handle
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        slot.building = false;
        warn!(
            serving_previous = slot.active.is_some(),
            "index build did not complete"
        );
    }
}
