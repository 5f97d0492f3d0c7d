//! The capability set a concrete predictor must implement. `PredictorRuntime`
//! owns the state machine, locks, and idle-unload timer around these four
//! methods — dispatch is via trait object, never inheritance.

use async_trait::async_trait;
use predictor_common::{Prediction, Result};
use std::path::{Path, PathBuf};

/// A concrete predictor: identifies itself by `(prediction_type, version)`
/// and implements download/load/unload/forward. Implementors hold their
/// own in-memory model state (behind interior mutability) since `forward`
/// is called through a shared reference.
#[async_trait]
pub trait PredictorCapability: Send + Sync {
    fn prediction_type(&self) -> &str;
    fn predictor_version(&self) -> u32;

    /// Obtain model artifacts, returning their local path. Called during
    /// `setup()` when no persisted row exists yet, or when the weights
    /// directory has gone missing.
    async fn download(&self) -> Result<PathBuf>;

    /// Bring the model into memory from `path`.
    async fn load(&self, path: &Path) -> Result<()>;

    /// Release the in-memory model.
    async fn unload(&self) -> Result<()>;

    /// Run inference over `input`, returning the labelled prediction,
    /// confidence, and synthetic price.
    async fn forward(&self, input: &str) -> Result<Prediction>;
}
