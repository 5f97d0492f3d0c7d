//! Traffic router (C4): pure traffic-distribution arithmetic, its
//! transactional application over the predictor registry, and weighted
//! random predictor selection.

mod redistribute;

pub use redistribute::redistribute;

use predictor_common::{traffic_metrics, Error, Predictor, PredictorId, Result};
use predictor_metrics::{predictor_tags, MetricsSink};
use predictor_registry::Registry;
use predictor_store::Store;
use rand::rngs::OsRng;
use rand::Rng;
use std::collections::HashMap;
use tracing::warn;

/// A `{predictor_id, traffic_percentage}` pair as returned by the mutating
/// admin endpoints.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrafficEntry {
    pub predictor_id: PredictorId,
    pub traffic_percentage: u32,
}

/// The kind of metric row written alongside a traffic mutation.
#[derive(Debug, Clone, Copy)]
pub enum MetricKind {
    Update,
    Deactivation,
}

impl MetricKind {
    fn name(self) -> &'static str {
        match self {
            MetricKind::Update => traffic_metrics::PREDICTOR_TRAFFIC_UPDATE,
            MetricKind::Deactivation => traffic_metrics::PREDICTOR_TRAFFIC_DEACTIVATION,
        }
    }
}

/// Wraps the registry + metrics sink to provide C4's transactional
/// surface: `adjust_traffic` and the high-level helpers built on it.
pub struct TrafficRouter {
    store: Store,
    registry: Registry,
    metrics: MetricsSink,
    max_traffic_threshold: u32,
}

impl TrafficRouter {
    pub fn new(store: Store, registry: Registry, metrics: MetricsSink, max_traffic_threshold: u32) -> Self {
        TrafficRouter {
            store,
            registry,
            metrics,
            max_traffic_threshold,
        }
    }

    /// `adjust_traffic(target_id, target_value, metric_kind, description?)`
    /// Reads the target and its siblings, computes the new
    /// distribution, then writes every changed percentage plus one metric
    /// row per change, all inside one document-store transaction: any
    /// failure mid-way aborts the transaction and no partial mutation
    /// persists.
    pub async fn adjust_traffic(
        &self,
        target_id: &str,
        target_value: u32,
        metric_kind: MetricKind,
        description: Option<String>,
    ) -> Result<Vec<TrafficEntry>> {
        let target_id = target_id.to_string();
        let registry = self.registry.clone();
        let metrics = self.metrics.clone();

        self.store
            .with_transaction(move |session| {
                Box::pin(async move {
                    let target = registry.find_by_id_opt(&target_id, Some(&mut *session)).await?;
                    let siblings = registry
                        .list_by_type_opt(&target.prediction_type, true, Some(&mut *session))
                        .await?;

                    let mut current: HashMap<PredictorId, u32> = siblings
                        .iter()
                        .map(|p| (p.id.clone(), p.traffic_percentage))
                        .collect();
                    current.entry(target.id.clone()).or_insert(target.traffic_percentage);

                    let new_distribution = redistribute(&current, &target_id, target_value)?;

                    let by_id: HashMap<PredictorId, &Predictor> = siblings
                        .iter()
                        .chain(std::iter::once(&target))
                        .map(|p| (p.id.clone(), p))
                        .collect();

                    for (id, new_value) in &new_distribution {
                        let old_value = current.get(id).copied().unwrap_or(0);
                        if *new_value == old_value {
                            continue;
                        }
                        registry.update_traffic(id, *new_value, Some(&mut *session)).await?;

                        if let Some(predictor) = by_id.get(id) {
                            let tags = predictor_tags(&predictor.prediction_type, predictor.predictor_version);
                            metrics
                                .record_opt(
                                    metric_kind.name(),
                                    *new_value as f64,
                                    tags,
                                    description.clone(),
                                    Some(&mut *session),
                                )
                                .await?;
                        }
                    }

                    let mut entries: Vec<TrafficEntry> = new_distribution
                        .into_iter()
                        .map(|(predictor_id, traffic_percentage)| TrafficEntry {
                            predictor_id,
                            traffic_percentage,
                        })
                        .collect();
                    entries.sort_by(|a, b| a.predictor_id.cmp(&b.predictor_id));
                    Ok(entries)
                })
            })
            .await
    }

    /// `shift_newest(type, description?)`: +5 to the newest predictor,
    /// capped at `max_traffic_threshold`. A no-op (with a warning log) if
    /// already at the threshold.
    pub async fn shift_newest(&self, prediction_type: &str, description: Option<String>) -> Result<Vec<TrafficEntry>> {
        let newest = self
            .registry
            .newest(prediction_type)
            .await?
            .ok_or_else(|| Error::NoActivePredictor(prediction_type.to_string()))?;

        if newest.traffic_percentage >= self.max_traffic_threshold {
            warn!(
                prediction_type,
                predictor_id = %newest.id,
                threshold = self.max_traffic_threshold,
                "shift_newest is a no-op: newest predictor already at threshold"
            );
            return self.current_distribution(prediction_type).await;
        }

        let target = (newest.traffic_percentage + 5).min(self.max_traffic_threshold);
        self.adjust_traffic(&newest.id, target, MetricKind::Update, description).await
    }

    /// `set_traffic(type, version, value, description?)`: explicit set.
    pub async fn set_traffic(
        &self,
        prediction_type: &str,
        predictor_version: u32,
        value: u32,
        description: Option<String>,
    ) -> Result<Vec<TrafficEntry>> {
        let predictor = self
            .registry
            .find(prediction_type, predictor_version)
            .await?
            .ok_or_else(|| Error::UnknownPredictor(format!("{prediction_type}.{predictor_version}")))?;
        self.adjust_traffic(&predictor.id, value, MetricKind::Update, description).await
    }

    /// `deactivate(type, version, description?)`: target = 0.
    pub async fn deactivate(
        &self,
        prediction_type: &str,
        predictor_version: u32,
        description: Option<String>,
    ) -> Result<Vec<TrafficEntry>> {
        let predictor = self
            .registry
            .find(prediction_type, predictor_version)
            .await?
            .ok_or_else(|| Error::UnknownPredictor(format!("{prediction_type}.{predictor_version}")))?;
        self.adjust_traffic(&predictor.id, 0, MetricKind::Deactivation, description).await
    }

    async fn current_distribution(&self, prediction_type: &str) -> Result<Vec<TrafficEntry>> {
        let actives = self.registry.list_by_type(prediction_type, true).await?;
        Ok(actives
            .into_iter()
            .map(|p| TrafficEntry {
                predictor_id: p.id,
                traffic_percentage: p.traffic_percentage,
            })
            .collect())
    }

    /// `pick(type)`: acquire active predictors for `type` and weighted-draw
    /// one of them.
    pub async fn pick(&self, prediction_type: &str) -> Result<Predictor> {
        let actives = self.registry.list_by_type(prediction_type, true).await?;
        pick_from(&actives)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

/// `pick(active_list)` — a single uniform draw in
/// `[0, Σ weights)` on a cryptographic RNG resolves the selection.
pub fn pick_from(active: &[Predictor]) -> Result<Predictor> {
    if active.is_empty() {
        return Err(Error::NoActivePredictor("no active predictors".to_string()));
    }
    let total: u64 = active.iter().map(|p| p.traffic_percentage as u64).sum();
    if total == 0 {
        return Err(Error::NoActivePredictor("all predictors at zero traffic".to_string()));
    }

    let draw: u64 = OsRng.gen_range(0..total);
    let mut cumulative: u64 = 0;
    for predictor in active {
        cumulative += predictor.traffic_percentage as u64;
        if draw < cumulative {
            return Ok(predictor.clone());
        }
    }
    // Unreachable given the invariant draw < total, but guards against
    // float/overflow surprises by falling back to the last entry.
    Ok(active.last().unwrap().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn predictor(id: &str, traffic: u32) -> Predictor {
        let now = Utc::now();
        Predictor {
            id: id.to_string(),
            prediction_type: "sentiment_analysis".to_string(),
            predictor_version: 1,
            predictor_description: "test".to_string(),
            traffic_percentage: traffic,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn pick_from_empty_fails() {
        assert!(matches!(pick_from(&[]).unwrap_err(), Error::NoActivePredictor(_)));
    }

    #[test]
    fn pick_from_all_zero_fails() {
        let actives = vec![predictor("a", 0), predictor("b", 0)];
        assert!(matches!(pick_from(&actives).unwrap_err(), Error::NoActivePredictor(_)));
    }

    #[test]
    fn selection_distribution_converges() {
        let actives = vec![predictor("a", 30), predictor("b", 70)];
        let n = 20_000;
        let mut a_count = 0;
        for _ in 0..n {
            if pick_from(&actives).unwrap().id == "a" {
                a_count += 1;
            }
        }
        let freq = a_count as f64 / n as f64;
        assert!((freq - 0.30).abs() < 0.02, "frequency {freq} not close to 0.30");
    }
}
