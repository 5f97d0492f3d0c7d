//! Grounded on
//! `sentiment_analysis_predictor_v2.py` — same model family as v1, loaded
//! with 8-bit quantization. Registered as a distinct `predictor_version`
//! so it can be traffic-split against v1 for shadow comparison.

use super::InferenceBackend;
use crate::capability::PredictorCapability;
use async_trait::async_trait;
use predictor_common::{Prediction, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

const MODEL_NAME: &str = "nlptown/bert-base-multilingual-uncased-sentiment";

pub struct SentimentAnalysisV2 {
    inference: Arc<dyn InferenceBackend>,
    loaded: Mutex<bool>,
}

impl SentimentAnalysisV2 {
    pub fn new(inference: Arc<dyn InferenceBackend>) -> Self {
        SentimentAnalysisV2 {
            inference,
            loaded: Mutex::new(false),
        }
    }
}

#[async_trait]
impl PredictorCapability for SentimentAnalysisV2 {
    fn prediction_type(&self) -> &str {
        "sentiment_analysis"
    }

    fn predictor_version(&self) -> u32 {
        2
    }

    async fn download(&self) -> Result<PathBuf> {
        info!(model = MODEL_NAME, "downloading quantized sentiment analysis model v2");
        let staging = std::env::temp_dir().join(format!("predictor-download-{}", predictor_common::utils::generate_id()));
        tokio::fs::create_dir_all(&staging).await?;
        tokio::fs::write(staging.join("model.q8.bin"), MODEL_NAME.as_bytes()).await?;
        Ok(staging)
    }

    async fn load(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "loading quantized sentiment analysis model v2");
        tokio::fs::metadata(path.join("model.q8.bin")).await?;
        *self.loaded.lock().await = true;
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        info!("unloading quantized sentiment analysis model v2");
        *self.loaded.lock().await = false;
        Ok(())
    }

    async fn forward(&self, input: &str) -> Result<Prediction> {
        if input.is_empty() {
            return Err(predictor_common::Error::InferenceFailed("input text cannot be empty".to_string()));
        }
        let (value, confidence, price) = self.inference.infer(input).await?;
        Ok(Prediction { value, confidence, price })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeInference;

    #[async_trait]
    impl InferenceBackend for FakeInference {
        async fn infer(&self, text: &str) -> Result<(String, f64, f64)> {
            Ok(("neutral".to_string(), 0.6, text.len() as f64 * 0.001))
        }
    }

    #[tokio::test]
    async fn version_is_distinct_from_v1() {
        let predictor = SentimentAnalysisV2::new(Arc::new(FakeInference));
        assert_eq!(predictor.predictor_version(), 2);
        assert_eq!(predictor.prediction_type(), "sentiment_analysis");
    }

    #[tokio::test]
    async fn forward_delegates_to_inference_backend() {
        let predictor = SentimentAnalysisV2::new(Arc::new(FakeInference));
        let prediction = predictor.forward("ok").await.unwrap();
        assert_eq!(prediction.value, "neutral");
        assert_eq!(prediction.confidence, 0.6);
    }
}
