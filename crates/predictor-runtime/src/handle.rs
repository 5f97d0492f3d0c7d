//! Object-safe view of a [`PredictorRuntime`], so C7 can hold a
//! heterogeneous collection of runtimes over distinct concrete
//! [`PredictorCapability`] types behind one `Arc<dyn RuntimeHandle>` map.

use crate::capability::PredictorCapability;
use crate::runtime::PredictorRuntime;
use async_trait::async_trait;
use predictor_common::{Prediction, Result};

#[async_trait]
pub trait RuntimeHandle: Send + Sync {
    fn prediction_type(&self) -> &str;
    fn predictor_version(&self) -> u32;
    async fn forward(&self, input: &str) -> Result<Prediction>;
}

#[async_trait]
impl<C: PredictorCapability + 'static> RuntimeHandle for PredictorRuntime<C> {
    fn prediction_type(&self) -> &str {
        PredictorRuntime::prediction_type(self)
    }

    fn predictor_version(&self) -> u32 {
        PredictorRuntime::predictor_version(self)
    }

    async fn forward(&self, input: &str) -> Result<Prediction> {
        PredictorRuntime::forward(self, input).await
    }
}
