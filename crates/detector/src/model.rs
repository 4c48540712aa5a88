use crate::backend::InferenceBackend;
use crate::error::DetectError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// Load lifecycle of the model resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

enum Slot<B> {
    Unloaded,
    Loading,
    Ready(Arc<B>),
    Failed(String),
}

/// Process-wide owner of the loaded detection model.
///
/// Explicitly constructed and dependency-injected; there is no module-level
/// global. At most one load transition is in flight at a time: concurrent
/// callers of [`ModelHandle::load`] during a cold start coalesce on a single
/// attempt and are all released with its outcome. Once `Ready` the backend is
/// immutable and shared read-only by any number of inference calls.
///
/// A failed load is sticky: requests never trigger an implicit reload, only
/// another explicit `load` call does.
pub struct ModelHandle<B> {
    model_id: String,
    slot: RwLock<Slot<B>>,
    load_lock: Mutex<()>,
    load_epoch: AtomicU64,
}

impl<B: InferenceBackend> ModelHandle<B> {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            slot: RwLock::new(Slot::Unloaded),
            load_lock: Mutex::new(()),
            load_epoch: AtomicU64::new(0),
        }
    }

    /// Construct a handle that is already `Ready`, for embedding a
    /// preloaded backend (used heavily by tests).
    pub fn with_backend(model_id: impl Into<String>, backend: B) -> Self {
        Self {
            model_id: model_id.into(),
            slot: RwLock::new(Slot::Ready(Arc::new(backend))),
            load_lock: Mutex::new(()),
            load_epoch: AtomicU64::new(1),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn state(&self) -> LoadState {
        match &*self.slot.read().unwrap_or_else(PoisonError::into_inner) {
            Slot::Unloaded => LoadState::Unloaded,
            Slot::Loading => LoadState::Loading,
            Slot::Ready(_) => LoadState::Ready,
            Slot::Failed(_) => LoadState::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LoadState::Ready
    }

    /// Shared access to the loaded backend, or `ServiceNotReady` describing
    /// why inference cannot run right now.
    pub fn backend(&self) -> Result<Arc<B>, DetectError> {
        match &*self.slot.read().unwrap_or_else(PoisonError::into_inner) {
            Slot::Ready(backend) => Ok(backend.clone()),
            Slot::Unloaded => Err(DetectError::ServiceNotReady(
                "model not loaded".to_string(),
            )),
            Slot::Loading => Err(DetectError::ServiceNotReady(
                "model load in progress".to_string(),
            )),
            Slot::Failed(msg) => Err(DetectError::ServiceNotReady(format!(
                "model load failed: {msg}"
            ))),
        }
    }

    /// Load (or explicitly reload) the model artifact on the blocking pool.
    ///
    /// Idempotent when already `Ready`. Callers that arrive while a load is
    /// in flight wait for it and receive its outcome rather than starting a
    /// second attempt.
    pub async fn load(&self, path: &str, input_size: (u32, u32)) -> Result<(), DetectError> {
        if self.is_ready() {
            return Ok(());
        }

        let observed_epoch = self.load_epoch.load(Ordering::Acquire);
        let _guard = self.load_lock.lock().await;

        if self.load_epoch.load(Ordering::Acquire) != observed_epoch {
            // Another caller completed a load while we waited; report its
            // outcome instead of starting a fresh attempt
            return match &*self.slot.read().unwrap_or_else(PoisonError::into_inner) {
                Slot::Ready(_) => Ok(()),
                Slot::Failed(msg) => Err(DetectError::ModelUnavailable(msg.clone())),
                _ => Err(DetectError::ModelUnavailable(
                    "model load was interrupted".to_string(),
                )),
            };
        }

        self.set_slot(Slot::Loading);
        tracing::info!(model = %self.model_id, "Loading detection model");

        let path = path.to_string();
        let joined = tokio::task::spawn_blocking(move || B::load_model(&path, input_size)).await;

        let outcome = match joined {
            Ok(Ok(backend)) => {
                self.set_slot(Slot::Ready(Arc::new(backend)));
                tracing::info!(model = %self.model_id, "Model ready");
                Ok(())
            }
            Ok(Err(e)) => {
                let msg = format!("{e:#}");
                tracing::error!(model = %self.model_id, error = %msg, "Model load failed");
                self.set_slot(Slot::Failed(msg.clone()));
                Err(DetectError::ModelUnavailable(msg))
            }
            Err(e) => {
                let msg = format!("model load task failed: {e}");
                tracing::error!(model = %self.model_id, error = %msg, "Model load failed");
                self.set_slot(Slot::Failed(msg.clone()));
                Err(DetectError::ModelUnavailable(msg))
            }
        };

        self.load_epoch.fetch_add(1, Ordering::Release);
        outcome
    }

    fn set_slot(&self, slot: Slot<B>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = slot;
    }
}
