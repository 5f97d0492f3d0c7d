//! Predictor runtime (C5): wraps a concrete predictor's four capabilities
//! (download / load / unload / forward) in a shared lifecycle state
//! machine, locking discipline, idle-unload timer, and metrics
//! instrumentation. Grounded on
//! `original_source/src/predictors/base_predictor.py`.

mod capability;
mod handle;
mod runtime;
mod state;

pub mod predictors;

pub use capability::PredictorCapability;
pub use handle::RuntimeHandle;
pub use runtime::PredictorRuntime;
pub use state::RuntimeState;
