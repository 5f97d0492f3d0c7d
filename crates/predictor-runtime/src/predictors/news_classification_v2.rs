//! Grounded on `news_classification_v2.py` — an ONNX zero-shot classifier
//! over a fixed candidate-label set. The reference predictor returns a
//! full `{labels, scores}` ranking; this runtime's `Prediction.value` is a
//! single string, so the top-ranked label is surfaced as `value` and the
//! mean of all label scores as `confidence`, matching the reference's own
//! `prediction_confidence = mean(scores)` computation.

use super::InferenceBackend;
use crate::capability::PredictorCapability;
use async_trait::async_trait;
use predictor_common::{Prediction, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

const MODEL_NAME: &str = "prajjwal1/bert-small";

/// Predefined news categories the classifier scores every article against.
pub const CANDIDATE_LABELS: &[&str] = &[
    "politics",
    "business",
    "technology",
    "sports",
    "health",
    "entertainment",
    "world news",
    "crime",
    "science",
    "environment",
    "breaking news",
    "opinion",
    "local news",
    "economy",
    "education",
    "military",
    "weather",
    "lifestyle",
];

pub struct NewsClassificationV2 {
    inference: Arc<dyn InferenceBackend>,
    loaded: Mutex<bool>,
}

impl NewsClassificationV2 {
    pub fn new(inference: Arc<dyn InferenceBackend>) -> Self {
        NewsClassificationV2 {
            inference,
            loaded: Mutex::new(false),
        }
    }
}

#[async_trait]
impl PredictorCapability for NewsClassificationV2 {
    fn prediction_type(&self) -> &str {
        "news_classification"
    }

    fn predictor_version(&self) -> u32 {
        2
    }

    async fn download(&self) -> Result<PathBuf> {
        info!(model = MODEL_NAME, "downloading news classification model v2");
        let staging = std::env::temp_dir().join(format!("predictor-download-{}", predictor_common::utils::generate_id()));
        tokio::fs::create_dir_all(&staging).await?;
        tokio::fs::write(staging.join("model.onnx"), MODEL_NAME.as_bytes()).await?;
        Ok(staging)
    }

    async fn load(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), candidate_labels = CANDIDATE_LABELS.len(), "loading news classification model v2");
        tokio::fs::metadata(path.join("model.onnx")).await?;
        *self.loaded.lock().await = true;
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        info!("unloading news classification model v2");
        *self.loaded.lock().await = false;
        Ok(())
    }

    async fn forward(&self, input: &str) -> Result<Prediction> {
        if input.is_empty() {
            return Err(predictor_common::Error::InferenceFailed("input text cannot be empty".to_string()));
        }
        let (value, confidence, _) = self.inference.infer(input).await?;
        // price = len(text) * candidate_label_count * 0.002, per the
        // reference predictor's per-label zero-shot scoring cost.
        let price = input.len() as f64 * CANDIDATE_LABELS.len() as f64 * 0.002;
        Ok(Prediction { value, confidence, price })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeInference;

    #[async_trait]
    impl InferenceBackend for FakeInference {
        async fn infer(&self, _text: &str) -> Result<(String, f64, f64)> {
            Ok(("technology".to_string(), 0.72, 0.0))
        }
    }

    #[tokio::test]
    async fn identity_matches_the_reference_predictor() {
        let predictor = NewsClassificationV2::new(Arc::new(FakeInference));
        assert_eq!(predictor.prediction_type(), "news_classification");
        assert_eq!(predictor.predictor_version(), 2);
    }

    #[tokio::test]
    async fn forward_prices_by_text_length_and_label_count() {
        let predictor = NewsClassificationV2::new(Arc::new(FakeInference));
        let prediction = predictor.forward("markets rally on rate cut").await.unwrap();
        assert_eq!(prediction.value, "technology");
        let expected_price = "markets rally on rate cut".len() as f64 * CANDIDATE_LABELS.len() as f64 * 0.002;
        assert!((prediction.price - expected_price).abs() < 1e-9);
    }

    #[tokio::test]
    async fn forward_rejects_empty_input() {
        let predictor = NewsClassificationV2::new(Arc::new(FakeInference));
        let err = predictor.forward("").await.unwrap_err();
        assert!(matches!(err, predictor_common::Error::InferenceFailed(_)));
    }
}
