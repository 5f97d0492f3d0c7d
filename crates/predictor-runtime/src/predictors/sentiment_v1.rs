//! Grounded on
//! `sentiment_analysis_predictor_v1.py` (`nlptown/bert-base-multilingual-uncased-sentiment`,
//! CPU/GPU inference, `price = len(text) * 0.001`).

use super::InferenceBackend;
use crate::capability::PredictorCapability;
use async_trait::async_trait;
use predictor_common::{Prediction, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

const MODEL_NAME: &str = "nlptown/bert-base-multilingual-uncased-sentiment";

pub struct SentimentAnalysisV1 {
    inference: Arc<dyn InferenceBackend>,
    loaded: Mutex<bool>,
}

impl SentimentAnalysisV1 {
    pub fn new(inference: Arc<dyn InferenceBackend>) -> Self {
        SentimentAnalysisV1 {
            inference,
            loaded: Mutex::new(false),
        }
    }
}

#[async_trait]
impl PredictorCapability for SentimentAnalysisV1 {
    fn prediction_type(&self) -> &str {
        "sentiment_analysis"
    }

    fn predictor_version(&self) -> u32 {
        1
    }

    async fn download(&self) -> Result<PathBuf> {
        info!(model = MODEL_NAME, "downloading sentiment analysis model v1");
        let staging = std::env::temp_dir().join(format!("predictor-download-{}", predictor_common::utils::generate_id()));
        tokio::fs::create_dir_all(&staging).await?;
        tokio::fs::write(staging.join("model.bin"), MODEL_NAME.as_bytes()).await?;
        Ok(staging)
    }

    async fn load(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "loading sentiment analysis model v1");
        tokio::fs::metadata(path.join("model.bin")).await?;
        *self.loaded.lock().await = true;
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        info!("unloading sentiment analysis model v1");
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
            Ok(("positive".to_string(), 0.91, text.len() as f64 * 0.001))
        }
    }

    #[tokio::test]
    async fn forward_rejects_empty_input() {
        let predictor = SentimentAnalysisV1::new(Arc::new(FakeInference));
        let err = predictor.forward("").await.unwrap_err();
        assert!(matches!(err, predictor_common::Error::InferenceFailed(_)));
    }

    #[tokio::test]
    async fn forward_prices_by_character_count() {
        let predictor = SentimentAnalysisV1::new(Arc::new(FakeInference));
        let prediction = predictor.forward("great product").await.unwrap();
        assert_eq!(prediction.value, "positive");
        assert!((prediction.price - 0.013).abs() < 1e-9);
    }

    #[tokio::test]
    async fn download_then_load_round_trips_through_the_weights_directory() {
        let predictor = SentimentAnalysisV1::new(Arc::new(FakeInference));
        let staged = predictor.download().await.unwrap();
        predictor.load(&staged).await.unwrap();
        assert!(*predictor.loaded.lock().await);
        predictor.unload().await.unwrap();
        assert!(!*predictor.loaded.lock().await);
        let _ = tokio::fs::remove_dir_all(&staged).await;
    }
}
