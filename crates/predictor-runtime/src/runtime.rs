//! `PredictorRuntime` — the shared lifecycle wrapper around a concrete
//! predictor capability. Owns the state machine, the `init_lock`/`load_lock`
//! pair, the idle-unload timer, and all metrics emission; the concrete
//! capability only ever sees `download`/`load`/`unload`/`forward`.
//!
//! `PredictorRuntime<C>` is a cheap `Clone` handle around an `Arc<Inner>`
//! (the common "actor handle" shape), so the idle-unload timer can hold
//! its own clone of the runtime without requiring callers to pre-wrap it
//! in an `Arc` themselves.
//!
//! Concurrency discipline: the race between `forward` and `load`/`unload`
//! is resolved with `load_lock` as a genuine reader/writer lock rather
//! than a plain mutex. `load()`/`unload()` take it in write mode; `forward`
//! takes it in read mode for the entire duration of the underlying
//! `capability.forward()` call, so an unload (idle-triggered or manual)
//! can never run concurrently with an in-flight forward on the same
//! capability — the writer blocks until every reader releases. Multiple
//! `forward` calls still run concurrently with each other (the model is
//! assumed thread-safe for inference), since a `RwLock` permits any
//! number of simultaneous readers. A load-generation counter is kept
//! alongside this as a second, independent check: the idle-unload timer
//! only proceeds if the generation it captured at schedule time still
//! matches, so a stale timer from a superseded load-cycle never unloads
//! a model that has since been reloaded.

use crate::capability::PredictorCapability;
use crate::state::RuntimeState;
use predictor_common::{predictor_metrics, Error, Prediction, PredictorId, Result};
use predictor_metrics::{predictor_tags, MetricsSink};
use predictor_registry::Registry;
use predictor_store::Store;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct Inner<C: PredictorCapability> {
    capability: C,
    registry: Registry,
    store: Store,
    metrics: MetricsSink,
    weights_root: PathBuf,
    description: String,
    unload_timeout: Duration,

    state: RwLock<RuntimeState>,
    predictor_id: RwLock<Option<PredictorId>>,
    init_lock: Mutex<()>,
    /// Guards `load`/`unload` (write) against `forward` (read). See the
    /// module-level doc comment for the full discipline.
    load_lock: RwLock<()>,
    generation: AtomicU64,
    idle_unload_handle: Mutex<Option<JoinHandle<()>>>,
}

pub struct PredictorRuntime<C: PredictorCapability> {
    inner: Arc<Inner<C>>,
}

impl<C: PredictorCapability> Clone for PredictorRuntime<C> {
    fn clone(&self) -> Self {
        PredictorRuntime { inner: Arc::clone(&self.inner) }
    }
}

impl<C: PredictorCapability + 'static> PredictorRuntime<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capability: C,
        registry: Registry,
        store: Store,
        metrics: MetricsSink,
        weights_root: PathBuf,
        description: impl Into<String>,
        unload_timeout: Duration,
    ) -> Self {
        PredictorRuntime {
            inner: Arc::new(Inner {
                capability,
                registry,
                store,
                metrics,
                weights_root,
                description: description.into(),
                unload_timeout,
                state: RwLock::new(RuntimeState::Fresh),
                predictor_id: RwLock::new(None),
                init_lock: Mutex::new(()),
                load_lock: RwLock::new(()),
                generation: AtomicU64::new(0),
                idle_unload_handle: Mutex::new(None),
            }),
        }
    }

    pub fn prediction_type(&self) -> &str {
        self.inner.capability.prediction_type()
    }

    pub fn predictor_version(&self) -> u32 {
        self.inner.capability.predictor_version()
    }

    pub async fn state(&self) -> RuntimeState {
        *self.inner.state.read().await
    }

    pub async fn predictor_id(&self) -> Result<PredictorId> {
        self.inner
            .predictor_id
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::NotFound(format!("{}.{} not initialized", self.prediction_type(), self.predictor_version())))
    }

    fn weights_dir(&self, predictor_id: &str) -> PathBuf {
        self.inner.weights_root.join(predictor_id)
    }

    fn tags(&self) -> std::collections::HashMap<String, String> {
        predictor_tags(self.prediction_type(), self.predictor_version())
    }

    /// `setup()` — idempotent, serialised by `init_lock`.
    /// `FRESH -> INITIALIZED`.
    pub async fn setup(&self) -> Result<()> {
        let _guard = self.inner.init_lock.lock().await;
        if *self.inner.state.read().await != RuntimeState::Fresh {
            return Ok(());
        }

        let prediction_type = self.prediction_type().to_string();
        let predictor_version = self.predictor_version();

        let predictor = match self.inner.registry.find(&prediction_type, predictor_version).await? {
            Some(predictor) => {
                let dir = self.weights_dir(&predictor.id);
                if !path_exists(&dir).await {
                    info!(prediction_type = %prediction_type, predictor_version, "predictor found but weights missing, re-downloading");
                    let downloaded = self.inner.capability.download().await?;
                    place_weights(&downloaded, &dir).await?;
                }
                predictor
            }
            None => {
                info!(prediction_type = %prediction_type, predictor_version, "predictor not found, registering new one");
                let downloaded = self.inner.capability.download().await?;
                let registry = &self.inner.registry;
                let description = self.inner.description.clone();
                let pt = prediction_type.clone();
                let predictor = self
                    .inner
                    .store
                    .with_transaction(move |session| {
                        Box::pin(async move { registry.create(&pt, &description, predictor_version, Some(session)).await })
                    })
                    .await?;
                let dir = self.weights_dir(&predictor.id);
                place_weights(&downloaded, &dir).await?;
                predictor
            }
        };

        *self.inner.predictor_id.write().await = Some(predictor.id);
        *self.inner.state.write().await = RuntimeState::Initialized;
        Ok(())
    }

    /// `load()` — takes `load_lock` for write, excluding any concurrent
    /// `forward`. Requires `INITIALIZED`. Idempotent no-op (with a
    /// warning) if already loaded.
    pub async fn load(&self) -> Result<()> {
        let _guard = self.inner.load_lock.write().await;

        let state = *self.inner.state.read().await;
        if state.is_loaded() {
            warn!(prediction_type = %self.prediction_type(), predictor_version = self.predictor_version(), "predictor already loaded");
            return Ok(());
        }
        if state == RuntimeState::Fresh {
            return Err(Error::LoadFailed("runtime not initialized; call setup() first".to_string()));
        }

        let predictor_id = self.predictor_id().await?;
        let dir = self.weights_dir(&predictor_id);
        if !path_exists(&dir).await {
            return Err(Error::LoadFailed(format!("weights path {} does not exist", dir.display())));
        }

        let start = Instant::now();
        match self.inner.capability.load(&dir).await {
            Ok(()) => {
                let latency = start.elapsed().as_secs_f64();
                self.inner
                    .metrics
                    .record(predictor_metrics::PREDICTOR_LOADING_LATENCY, latency, self.tags(), None)
                    .await?;
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
                *self.inner.state.write().await = RuntimeState::Loaded;
                Ok(())
            }
            Err(e) => {
                let _ = self
                    .inner
                    .metrics
                    .record(predictor_metrics::PREDICTOR_LOADING_ERROR, 1.0, self.tags(), None)
                    .await;
                Err(Error::LoadFailed(e.to_string()))
            }
        }
    }

    /// `unload()` — inverse of `load()`, same `load_lock`, also taken
    /// for write so it can never interleave with an in-flight `forward`.
    pub async fn unload(&self) -> Result<()> {
        let _guard = self.inner.load_lock.write().await;

        let state = *self.inner.state.read().await;
        if !state.is_loaded() {
            warn!(prediction_type = %self.prediction_type(), predictor_version = self.predictor_version(), "predictor already unloaded");
            return Ok(());
        }

        let start = Instant::now();
        match self.inner.capability.unload().await {
            Ok(()) => {
                let latency = start.elapsed().as_secs_f64();
                self.inner
                    .metrics
                    .record(predictor_metrics::PREDICTOR_UNLOADING_LATENCY, latency, self.tags(), None)
                    .await?;
                *self.inner.state.write().await = RuntimeState::Initialized;
                Ok(())
            }
            Err(e) => {
                let _ = self
                    .inner
                    .metrics
                    .record(predictor_metrics::PREDICTOR_UNLOADING_ERROR, 1.0, self.tags(), None)
                    .await;
                Err(Error::UnloadFailed(e.to_string()))
            }
        }
    }

    /// `forward(input)` — loads synchronously if not loaded, times the
    /// inference call, emits latency/price or error metrics, then resets
    /// the idle-unload timer on success.
    ///
    /// Holds `load_lock` in read mode for the entire `capability.forward()`
    /// call, so `load()`/`unload()` (which take it for write) can never
    /// run concurrently with it. If the read-locked check finds the
    /// runtime not yet loaded, the guard is dropped and `self.load()` is
    /// called (taking the write lock itself) before looping back.
    pub async fn forward(&self, input: &str) -> Result<Prediction> {
        loop {
            let guard = self.inner.load_lock.read().await;
            if !self.inner.state.read().await.is_loaded() {
                drop(guard);
                self.load().await?;
                continue;
            }
            return self.forward_while_loaded(input, guard).await;
        }
    }

    async fn forward_while_loaded(&self, input: &str, _guard: RwLockReadGuard<'_, ()>) -> Result<Prediction> {
        let start = Instant::now();
        let result = self.inner.capability.forward(input).await;

        match result {
            Ok(prediction) => {
                let latency = start.elapsed().as_secs_f64();
                self.inner
                    .metrics
                    .record(predictor_metrics::PREDICTOR_LATENCY, latency, self.tags(), None)
                    .await?;
                self.inner
                    .metrics
                    .record(predictor_metrics::PREDICTOR_PRICE, prediction.price, self.tags(), None)
                    .await?;
                self.reschedule_idle_unload().await;
                Ok(prediction)
            }
            Err(e) => {
                let _ = self
                    .inner
                    .metrics
                    .record(predictor_metrics::PREDICTOR_ERROR, 1.0, self.tags(), None)
                    .await;
                Err(Error::InferenceFailed(e.to_string()))
            }
        }
    }

    /// Cancels any pending idle-unload task and schedules a new one
    /// `unload_timeout` in the future, capturing the current load
    /// generation so a stale timer from a previous load-cycle never
    /// unloads a fresher one. Safety against a concurrent `forward` comes
    /// from `unload()`'s write-lock acquisition, which blocks until any
    /// in-flight `forward` releases its read guard — this timer does not
    /// need to (and cannot reliably) poll in-flight-call state itself.
    async fn reschedule_idle_unload(&self) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let timeout = self.inner.unload_timeout;

        let mut guard = self.inner.idle_unload_handle.lock().await;
        if let Some(previous) = guard.take() {
            previous.abort();
        }

        let runtime = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if runtime.inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if !runtime.inner.state.read().await.is_loaded() {
                return;
            }
            *runtime.inner.state.write().await = RuntimeState::IdleUnloadScheduled;
            if let Err(error) = runtime.unload().await {
                warn!(prediction_type = %runtime.prediction_type(), predictor_version = runtime.predictor_version(), %error, "idle unload failed");
            }
        });
        *guard = Some(handle);
    }

    /// `manual_unload()` — cancels the idle timer and unloads
    /// synchronously. Terminal state on shutdown.
    pub async fn manual_unload(&self) -> Result<()> {
        if let Some(handle) = self.inner.idle_unload_handle.lock().await.take() {
            handle.abort();
        }
        self.unload().await
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Copies every file under `source` into `dest` (creating `dest` and any
/// subdirectories as needed), then removes `source`. The weights
/// directory is treated as the opaque unit of existence.
fn place_weights<'a>(source: &'a Path, dest: &'a Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dest).await?;
        let mut entries = tokio::fs::read_dir(source).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let dest_path = dest.join(entry.file_name());
            if file_type.is_dir() {
                place_weights(&entry.path(), &dest_path).await?;
            } else {
                tokio::fs::copy(entry.path(), &dest_path).await?;
            }
        }
        let _ = tokio::fs::remove_dir_all(source).await;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_states_report_is_loaded() {
        assert!(RuntimeState::Loaded.is_loaded());
        assert!(RuntimeState::IdleUnloadScheduled.is_loaded());
        assert!(!RuntimeState::Initialized.is_loaded());
        assert!(!RuntimeState::Fresh.is_loaded());
    }
}
