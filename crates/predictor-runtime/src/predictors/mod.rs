//! Concrete predictors grounded on
//! `original_source/src/predictors/predictors/sentiment_analysis_predictor_v{1,2}.py`
//! and `news_classification_v2.py`. The two sentiment predictors share the
//! `sentiment_analysis` prediction type at versions 1 and 2 and differ only
//! in model identity; `NewsClassificationV2` is a distinct prediction type
//! (`news_classification`) matching spec.md's "news categorization" example.
//! The actual inference library is out of scope and is represented by the
//! opaque [`InferenceBackend::infer`] boundary in every case.

mod news_classification_v2;
mod sentiment_v1;
mod sentiment_v2;

pub use news_classification_v2::{NewsClassificationV2, CANDIDATE_LABELS};
pub use sentiment_v1::SentimentAnalysisV1;
pub use sentiment_v2::SentimentAnalysisV2;

use async_trait::async_trait;
use predictor_common::Result;

/// The opaque `infer(text) -> (label, confidence, price)` boundary.
/// Concrete predictors hold one of these rather than
/// embedding a model library call directly.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn infer(&self, text: &str) -> Result<(String, f64, f64)>;
}
