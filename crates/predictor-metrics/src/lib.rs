//! Metrics sink (C8): append-only record of timings, errors, price, and
//! traffic-change audits. Rows are never mutated after insert.

use chrono::Utc;
use mongodb::Collection;
use predictor_common::{Error, Metric, Result};
use predictor_store::{Session, Store, COLLECTION_METRICS};
use std::collections::HashMap;
use tracing::debug;

/// Append-only sink over the `metrics` collection.
#[derive(Clone)]
pub struct MetricsSink {
    collection: Collection<Metric>,
}

impl MetricsSink {
    pub fn new(store: &Store) -> Self {
        MetricsSink {
            collection: store.collection(COLLECTION_METRICS),
        }
    }

    pub async fn record(
        &self,
        metric_name: &str,
        metric_value: f64,
        tags: HashMap<String, String>,
        description: Option<String>,
    ) -> Result<()> {
        self.record_opt(metric_name, metric_value, tags, description, None).await
    }

    /// Session-aware variant so C4's transactional `adjust_traffic` can
    /// write the traffic-change audit row inside the same transaction as
    /// the percentage update.
    pub async fn record_opt(
        &self,
        metric_name: &str,
        metric_value: f64,
        tags: HashMap<String, String>,
        description: Option<String>,
        mut session: Option<&mut Session>,
    ) -> Result<()> {
        let metric = Metric {
            id: predictor_common::utils::generate_id(),
            metric_name: metric_name.to_string(),
            metric_value,
            tags,
            description,
            created_at: Utc::now(),
        };
        debug!(metric_name, metric_value, "recording metric");
        let mut insert = self.collection.insert_one(&metric);
        if let Some(session) = session.as_deref_mut() {
            insert = insert.session(session);
        }
        insert
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("metric insert: {e}")))?;
        Ok(())
    }
}

/// Builds the `{prediction_type, predictor_version}` tag map used by every
/// C5 emission and most C4 traffic-change rows.
pub fn predictor_tags(prediction_type: &str, predictor_version: u32) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    tags.insert("prediction_type".to_string(), prediction_type.to_string());
    tags.insert("predictor_version".to_string(), predictor_version.to_string());
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictor_tags_include_type_and_version() {
        let tags = predictor_tags("sentiment_analysis", 2);
        assert_eq!(tags.get("prediction_type").unwrap(), "sentiment_analysis");
        assert_eq!(tags.get("predictor_version").unwrap(), "2");
    }
}
