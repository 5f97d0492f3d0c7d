//! Core data-model types shared by every crate in the platform.
//!
//! Id representation and `predictions` map keying follow the reference
//! system's repository layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Opaque predictor identifier — the document store's generated id,
/// represented as its hex string so callers never depend on a particular
/// store's id type.
pub type PredictorId = String;

/// A named, versioned model participating in traffic splitting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Predictor {
    pub id: PredictorId,
    pub prediction_type: String,
    pub predictor_version: u32,
    pub predictor_description: String,
    pub traffic_percentage: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Predictor {
    pub fn is_active(&self) -> bool {
        self.traffic_percentage > 0
    }
}

/// The runtime's inference result for a single article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub value: String,
    pub confidence: f64,
    pub price: f64,
}

/// A single predictor's stored contribution to an `ArticlePrediction`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionEntry {
    pub value: String,
    pub confidence: f64,
}

impl From<Prediction> for PredictionEntry {
    fn from(p: Prediction) -> Self {
        PredictionEntry {
            value: p.value,
            confidence: p.confidence,
        }
    }
}

/// Per-`(article_id, prediction_type)` aggregate of shadow + selected
/// predictions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticlePrediction {
    pub id: String,
    pub article_id: String,
    pub prediction_type: String,
    pub selected_predictor_id: Option<PredictorId>,
    pub predictions: HashMap<PredictorId, PredictionEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArticlePrediction {
    /// Invariant: selected_predictor_id, if set, must be a key of
    /// `predictions`.
    pub fn is_consistent(&self) -> bool {
        match &self.selected_predictor_id {
            Some(id) => self.predictions.contains_key(id),
            None => true,
        }
    }
}

/// Append-only telemetry row. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub id: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub tags: HashMap<String, String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Accepts an article id as a plain string or as MongoDB extended JSON
/// (`{"$oid": "..."}`), normalising either shape to a plain string.
fn deserialize_article_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdShape {
        Plain(String),
        Oid { #[serde(rename = "$oid")] oid: String },
    }

    match IdShape::deserialize(deserializer)? {
        IdShape::Plain(s) => Ok(s),
        IdShape::Oid { oid } => Ok(oid),
    }
}

/// An article record as carried by `ARTICLES_EVENT`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ArticlePayload {
    #[serde(deserialize_with = "deserialize_article_id")]
    #[serde(default)]
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A metric record as carried by `METRICS_EVENT`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricPayload {
    pub metric_name: String,
    pub metric_value: f64,
    pub tags: HashMap<String, String>,
}

/// Discriminant for the tagged-union `Event` sum type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    ArticlesEvent,
    MetricsEvent,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ArticlesEvent => "ARTICLES_EVENT",
            EventType::MetricsEvent => "METRICS_EVENT",
        }
    }
}

/// Payload-specific content. Serializes plainly (just the payload's own
/// fields); deserialization is driven by the sibling `event_type` field
/// rather than by trying each variant's shape in turn (see [`Event`]'s
/// manual `Deserialize` impl) — `ArticlePayload`'s fields are all
/// optional/defaulted, so an untagged enum would happily misparse a
/// `METRICS_EVENT` payload as an empty article.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum EventContent {
    Article(ArticlePayload),
    Metric(MetricPayload),
}

/// The wire-level event envelope.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub content: EventContent,
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawEvent {
            event_type: EventType,
            timestamp: DateTime<Utc>,
            content: serde_json::Value,
        }

        let raw = RawEvent::deserialize(deserializer)?;
        let content = match raw.event_type {
            EventType::ArticlesEvent => {
                EventContent::Article(serde_json::from_value(raw.content).map_err(serde::de::Error::custom)?)
            }
            EventType::MetricsEvent => {
                EventContent::Metric(serde_json::from_value(raw.content).map_err(serde::de::Error::custom)?)
            }
        };
        Ok(Event {
            event_type: raw.event_type,
            timestamp: raw.timestamp,
            content,
        })
    }
}

impl Event {
    pub fn article(payload: ArticlePayload) -> Self {
        Event {
            event_type: EventType::ArticlesEvent,
            timestamp: Utc::now(),
            content: EventContent::Article(payload),
        }
    }

    pub fn metric(payload: MetricPayload) -> Self {
        Event {
            event_type: EventType::MetricsEvent,
            timestamp: Utc::now(),
            content: EventContent::Metric(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_event_round_trips() {
        let event = Event::article(ArticlePayload {
            id: "a1".to_string(),
            title: Some("hello".to_string()),
            description: None,
        });
        let json = serde_json::to_vec(&event).unwrap();
        let back: Event = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn metric_event_round_trips_and_is_not_confused_with_article() {
        let mut tags = HashMap::new();
        tags.insert("prediction_type".to_string(), "sentiment_analysis".to_string());
        let event = Event::metric(MetricPayload {
            metric_name: "predictor_latency".to_string(),
            metric_value: 0.42,
            tags,
        });
        let json = serde_json::to_vec(&event).unwrap();
        let back: Event = serde_json::from_slice(&json).unwrap();
        match back.content {
            EventContent::Metric(payload) => {
                assert_eq!(payload.metric_name, "predictor_latency");
                assert_eq!(payload.metric_value, 0.42);
            }
            EventContent::Article(_) => panic!("metric event misparsed as article"),
        }
    }

    #[test]
    fn predictor_is_active_iff_traffic_positive() {
        let now = Utc::now();
        let mut predictor = Predictor {
            id: "p1".to_string(),
            prediction_type: "sentiment_analysis".to_string(),
            predictor_version: 1,
            predictor_description: "x".to_string(),
            traffic_percentage: 0,
            created_at: now,
            updated_at: now,
        };
        assert!(!predictor.is_active());
        predictor.traffic_percentage = 1;
        assert!(predictor.is_active());
    }

    #[test]
    fn article_prediction_consistency_invariant() {
        let now = Utc::now();
        let mut predictions = HashMap::new();
        predictions.insert(
            "p1".to_string(),
            PredictionEntry { value: "positive".to_string(), confidence: 0.9 },
        );
        let mut aggregate = ArticlePrediction {
            id: "ap1".to_string(),
            article_id: "a1".to_string(),
            prediction_type: "sentiment_analysis".to_string(),
            selected_predictor_id: Some("p1".to_string()),
            predictions,
            created_at: now,
            updated_at: now,
        };
        assert!(aggregate.is_consistent());

        aggregate.selected_predictor_id = Some("missing".to_string());
        assert!(!aggregate.is_consistent());
    }

    #[test]
    fn article_id_accepts_extended_json_oid() {
        let json = serde_json::json!({
            "event_type": "ARTICLES_EVENT",
            "timestamp": Utc::now().to_rfc3339(),
            "content": { "id": { "$oid": "507f1f77bcf86cd799439011" }, "title": null, "description": null },
        });
        let event: Event = serde_json::from_value(json).unwrap();
        match event.content {
            EventContent::Article(payload) => assert_eq!(payload.id, "507f1f77bcf86cd799439011"),
            EventContent::Metric(_) => panic!("expected article"),
        }
    }
}
