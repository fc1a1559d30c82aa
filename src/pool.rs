//! The model pool: owns every loaded model handle behind one mutex and
//! performs least-busy selection under that same lock so "find minimum"
//! and "claim it" happen atomically.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, RawModelHandle};
use crate::model::{ModelSpec, ModelType};

struct ModelEntry {
    id: u64,
    model_type: ModelType,
    path: String,
    handle: RawModelHandle,
    active_requests: u32,
    total_requests: u64,
}

struct PoolState {
    entries: Vec<ModelEntry>,
    next_auto_id: u64,
}

/// Ordered collection of loaded models with least-busy routing. All state
/// lives behind a single lock; no code path holds it across a `generate`
/// call, only across bookkeeping.
pub struct Pool {
    backend: Arc<dyn Backend>,
    state: Mutex<PoolState>,
}

impl Pool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Mutex::new(PoolState {
                entries: Vec::new(),
                next_auto_id: 1,
            }),
        }
    }

    /// Load one model described by `spec`. On failure the pool is left
    /// unchanged — no partial entry is appended, and a model already loaded
    /// into the backend for a rejected explicit id is unloaded again.
    pub fn load(&self, spec: &ModelSpec) -> Result<u64, BackendError> {
        let handle = self.backend.load_model(&spec.path)?;
        let mut state = self.state.lock();
        let id = match spec.explicit_id {
            Some(id) => {
                if state.entries.iter().any(|e| e.id == id) {
                    drop(state);
                    self.backend.unload_model(handle);
                    return Err(BackendError::DuplicateModelId(id));
                }
                if id >= state.next_auto_id {
                    state.next_auto_id = id + 1;
                }
                id
            }
            None => {
                let id = state.next_auto_id;
                state.next_auto_id += 1;
                id
            }
        };
        state.entries.push(ModelEntry {
            id,
            model_type: spec.model_type,
            path: spec.path.clone(),
            handle,
            active_requests: 0,
            total_requests: 0,
        });
        info!(model_id = id, path = %spec.path, model_type = %spec.model_type, "model loaded");
        Ok(id)
    }

    pub fn count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.state.lock().entries.iter().any(|e| e.id == id)
    }

    /// Acquire the model with the fewest `active_requests`, optionally
    /// filtered by type (`unassigned` entries match any filter). Returns
    /// `None` on an empty pool or when nothing matches the filter.
    pub fn acquire_least_busy(&self, wanted: Option<ModelType>) -> Option<u64> {
        let mut state = self.state.lock();
        let best = state
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.model_type.matches(wanted))
            .min_by_key(|(idx, e)| (e.active_requests, *idx))
            .map(|(idx, _)| idx);
        let idx = best?;
        state.entries[idx].active_requests += 1;
        state.entries[idx].total_requests += 1;
        Some(state.entries[idx].id)
    }

    /// Acquire a specific model by id, regardless of current load. Returns
    /// `None` if no model with that id exists.
    pub fn acquire_by_id(&self, id: u64) -> Option<u64> {
        let mut state = self.state.lock();
        let entry = state.entries.iter_mut().find(|e| e.id == id)?;
        entry.active_requests += 1;
        entry.total_requests += 1;
        Some(id)
    }

    /// Release a previously acquired model, saturating at zero.
    pub fn release(&self, id: u64) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) {
            entry.active_requests = entry.active_requests.saturating_sub(1);
        }
    }

    pub fn active_requests(&self, id: u64) -> Option<u32> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.active_requests)
    }

    /// Run inference on the given model. Does not touch `active_requests` —
    /// callers acquire/release around this call.
    pub fn generate(&self, id: u64, prompt: &str, max_tokens: u32) -> Result<String, BackendError> {
        let handle = {
            let state = self.state.lock();
            state
                .entries
                .iter()
                .find(|e| e.id == id)
                .map(|e| e.handle)
                .ok_or(BackendError::ModelLoadFailed)?
        };
        self.backend.generate(handle, prompt, max_tokens)
    }

    /// Unload every model. Safe to call after partial initialization (an
    /// empty pool unloads nothing).
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        for entry in state.entries.drain(..) {
            debug!(model_id = entry.id, path = %entry.path, "unloading model");
            self.backend.unload_model(entry.handle);
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if !self.state.lock().entries.is_empty() {
            warn!("pool dropped with models still loaded; tearing down");
            self.teardown();
        }
    }
}

/// RAII guard returned by [`Pool::acquire_guarded`]; calls `release` on drop
/// so a worker cannot forget to release on an error path.
pub struct ModelHandle {
    pool: Arc<Pool>,
    pub id: u64,
}

impl Pool {
    pub fn acquire_guarded(self: &Arc<Self>, wanted: Option<ModelType>) -> Option<ModelHandle> {
        let id = self.acquire_least_busy(wanted)?;
        Some(ModelHandle {
            pool: Arc::clone(self),
            id,
        })
    }

    pub fn acquire_guarded_by_id(self: &Arc<Self>, id: u64) -> Option<ModelHandle> {
        let id = self.acquire_by_id(id)?;
        Some(ModelHandle {
            pool: Arc::clone(self),
            id,
        })
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}
