//! Article pipeline (C7): the `ARTICLES_EVENT` handler that fans a batch
//! of articles out across every active predictor per configured
//! prediction type, marks the traffic-split selection, and merges
//! results into the `article_predictions` aggregate. Grounded on
//! `original_source/src/events/handlers/articles_handler.py` and
//! `original_source/src/database/repositories/articles_predictions_repository.py`
//! (dotted-path `predictions.<predictor_id>` upsert-merge).

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::Utc;
use mongodb::Collection;
use predictor_bus::Handler;
use predictor_common::{
    ArticlePayload, ArticlePrediction, Error, Event, EventContent, EventType, PredictionEntry, Result,
};
use predictor_registry::Registry;
use predictor_router::pick_from;
use predictor_runtime::RuntimeHandle;
use predictor_store::{Store, COLLECTION_ARTICLE_PREDICTIONS};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

/// Keys a wired runtime by the `(prediction_type, predictor_version)`
/// pair that identifies it in the registry.
type RuntimeKey = (String, u32);

/// Handler for `ARTICLES_EVENT`, wired with one runtime handle per
/// concrete predictor the process hosts and the list of prediction
/// types it fans out over.
pub struct ArticlesHandler {
    registry: Registry,
    collection: Collection<ArticlePrediction>,
    runtimes: HashMap<RuntimeKey, Arc<dyn RuntimeHandle>>,
    prediction_types: Vec<String>,
    semaphore: Semaphore,
}

impl ArticlesHandler {
    pub fn new(
        store: &Store,
        registry: Registry,
        runtimes: Vec<Arc<dyn RuntimeHandle>>,
        prediction_types: Vec<String>,
        concurrent_predictions: usize,
    ) -> Self {
        let runtimes = runtimes
            .into_iter()
            .map(|r| ((r.prediction_type().to_string(), r.predictor_version()), r))
            .collect();

        ArticlesHandler {
            registry,
            collection: store.collection(COLLECTION_ARTICLE_PREDICTIONS),
            runtimes,
            prediction_types,
            semaphore: Semaphore::new(concurrent_predictions.max(1)),
        }
    }

    /// Fans a batch of articles out across every active predictor for each
    /// configured prediction type, returning the up-to-date aggregates
    /// touched by this batch.
    pub async fn process_batch(&self, articles: &[ArticlePayload]) -> Result<Vec<ArticlePrediction>> {
        let mut aggregates = Vec::new();

        for prediction_type in &self.prediction_types {
            let active = self.registry.list_by_type(prediction_type, true).await?;
            if active.is_empty() {
                warn!(prediction_type, "no active predictors, skipping prediction type for this batch");
                continue;
            }

            for article in articles {
                let text = article_text(article);
                if text.is_empty() {
                    warn!(article_id = %article.id, prediction_type, "empty article text, skipping");
                    continue;
                }

                let selected = match pick_from(&active) {
                    Ok(predictor) => predictor,
                    Err(error) => {
                        warn!(article_id = %article.id, prediction_type, %error, "selection draw failed, skipping article");
                        continue;
                    }
                };

                let dispatches = active.iter().map(|predictor| {
                    let predictor = predictor.clone();
                    let text = text.clone();
                    let selected_id = selected.id.clone();
                    async move {
                        let _permit = match self.semaphore.acquire().await {
                            Ok(permit) => permit,
                            Err(_) => return,
                        };

                        let key = (predictor.prediction_type.clone(), predictor.predictor_version);
                        let runtime = match self.runtimes.get(&key) {
                            Some(runtime) => runtime,
                            None => {
                                warn!(predictor_id = %predictor.id, "no runtime wired for active predictor, skipping");
                                return;
                            }
                        };

                        match runtime.forward(&text).await {
                            Ok(prediction) => {
                                if let Err(error) = self
                                    .upsert(
                                        &article.id,
                                        &predictor.prediction_type,
                                        &predictor.id,
                                        prediction.into(),
                                        predictor.id == selected_id,
                                    )
                                    .await
                                {
                                    warn!(article_id = %article.id, predictor_id = %predictor.id, %error, "failed to persist prediction");
                                }
                            }
                            Err(error) => {
                                warn!(article_id = %article.id, predictor_id = %predictor.id, %error, "forward failed");
                            }
                        }
                    }
                });
                futures::future::join_all(dispatches).await;

                if let Some(aggregate) = self.find_aggregate(&article.id, prediction_type).await? {
                    aggregates.push(aggregate);
                }
            }
        }

        Ok(aggregates)
    }

    /// Atomic per-predictor-key upsert-merge: `$set`s this predictor's
    /// entry (and `selected_predictor_id` if it won the draw) without
    /// touching any other predictor's entry in the same aggregate, and
    /// `$setOnInsert`s the identity fields on first creation.
    async fn upsert(
        &self,
        article_id: &str,
        prediction_type: &str,
        predictor_id: &str,
        entry: PredictionEntry,
        selected: bool,
    ) -> Result<()> {
        let now = Utc::now();
        let entry_bson = bson::to_bson(&entry)
            .map_err(|e| Error::StoreTransactionFailed(format!("serialize prediction entry: {e}")))?;

        let mut set_doc = Document::new();
        set_doc.insert(format!("predictions.{predictor_id}"), entry_bson);
        set_doc.insert("updated_at", bson::DateTime::from_chrono(now));
        if selected {
            set_doc.insert("selected_predictor_id", predictor_id);
        }

        let filter = doc! { "article_id": article_id, "prediction_type": prediction_type };
        let update = doc! {
            "$set": set_doc,
            "$setOnInsert": {
                "id": predictor_common::utils::generate_id(),
                "article_id": article_id,
                "prediction_type": prediction_type,
                "created_at": bson::DateTime::from_chrono(now),
            },
        };

        self.collection
            .update_one(filter, update)
            .upsert(true)
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("article_predictions upsert: {e}")))?;
        Ok(())
    }

    async fn find_aggregate(&self, article_id: &str, prediction_type: &str) -> Result<Option<ArticlePrediction>> {
        self.collection
            .find_one(doc! { "article_id": article_id, "prediction_type": prediction_type })
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("article_predictions read-back: {e}")))
    }
}

#[async_trait]
impl Handler for ArticlesHandler {
    fn event_types(&self) -> Vec<EventType> {
        vec![EventType::ArticlesEvent]
    }

    async fn handle(&self, events: Vec<Event>) -> Result<()> {
        let articles: Vec<ArticlePayload> = events
            .into_iter()
            .filter_map(|event| match event.content {
                EventContent::Article(article) => Some(article),
                EventContent::Metric(_) => None,
            })
            .collect();

        let aggregates = self.process_batch(&articles).await?;
        tracing::info!(articles = articles.len(), aggregates = aggregates.len(), "processed article batch");
        Ok(())
    }
}

fn article_text(article: &ArticlePayload) -> String {
    format!(
        "{} {}",
        article.title.as_deref().unwrap_or(""),
        article.description.as_deref().unwrap_or("")
    )
    .trim()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_text_joins_and_trims() {
        let article = ArticlePayload {
            id: "a1".to_string(),
            title: Some("Hello".to_string()),
            description: Some("world".to_string()),
        };
        assert_eq!(article_text(&article), "Hello world");
    }

    #[test]
    fn article_text_with_missing_fields_trims_to_empty() {
        let article = ArticlePayload {
            id: "a1".to_string(),
            title: None,
            description: None,
        };
        assert_eq!(article_text(&article), "");
    }

    #[test]
    fn article_text_with_only_title_has_no_trailing_space() {
        let article = ArticlePayload {
            id: "a1".to_string(),
            title: Some("Hello".to_string()),
            description: None,
        };
        assert_eq!(article_text(&article), "Hello");
    }
}
