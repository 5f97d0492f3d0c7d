//! Metric name constants and component health reporting.
//!
//! The name set mirrors `original_source/src/predictors/base_predictor.py`
//! and `.../services/deployment_service.py`'s metric identifiers exactly,
//! so downstream dashboards built against the reference system's metric
//! names keep working unmodified.

/// Metric names emitted by the predictor runtime (C5).
pub mod predictor_metrics {
    pub const PREDICTOR_LOADING_ERROR: &str = "predictor_loading_error";
    pub const PREDICTOR_LOADING_LATENCY: &str = "predictor_loading_latency";
    pub const PREDICTOR_UNLOADING_ERROR: &str = "predictor_unloading_error";
    pub const PREDICTOR_UNLOADING_LATENCY: &str = "predictor_unloading_latency";
    pub const PREDICTOR_LATENCY: &str = "predictor_latency";
    pub const PREDICTOR_PRICE: &str = "predictor_price";
    pub const PREDICTOR_ERROR: &str = "predictor_error";
}

/// Metric names emitted by the traffic router (C4).
pub mod traffic_metrics {
    pub const PREDICTOR_TRAFFIC_UPDATE: &str = "predictor_traffic_update";
    pub const PREDICTOR_TRAFFIC_DEACTIVATION: &str = "predictor_traffic_deactivation";
}

/// Coarse health level for a platform component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

impl HealthLevel {
    pub fn as_score(&self) -> u8 {
        match self {
            HealthLevel::Healthy => 100,
            HealthLevel::Degraded => 50,
            HealthLevel::Critical => 0,
            HealthLevel::Unknown => 0,
        }
    }
}

/// Health snapshot for a single named component.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub level: HealthLevel,
    pub detail: Option<String>,
}

/// Aggregate health across all registered components.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthStatus {
    pub overall: HealthLevel,
    pub components: Vec<ComponentHealth>,
}

impl HealthStatus {
    pub fn calculate_overall_health(components: Vec<ComponentHealth>) -> Self {
        let critical = components.iter().any(|c| c.level == HealthLevel::Critical);
        let degraded = components.iter().any(|c| c.level == HealthLevel::Degraded);
        let overall = if critical {
            HealthLevel::Critical
        } else if degraded {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };
        HealthStatus { overall, components }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(level: HealthLevel) -> ComponentHealth {
        ComponentHealth { name: "x".to_string(), level, detail: None }
    }

    #[test]
    fn overall_health_is_healthy_when_all_components_are() {
        let status = HealthStatus::calculate_overall_health(vec![component(HealthLevel::Healthy), component(HealthLevel::Healthy)]);
        assert_eq!(status.overall, HealthLevel::Healthy);
    }

    #[test]
    fn overall_health_escalates_to_critical_even_with_one_healthy_component() {
        let status = HealthStatus::calculate_overall_health(vec![component(HealthLevel::Healthy), component(HealthLevel::Critical)]);
        assert_eq!(status.overall, HealthLevel::Critical);
    }

    #[test]
    fn overall_health_is_degraded_when_no_component_is_critical() {
        let status = HealthStatus::calculate_overall_health(vec![component(HealthLevel::Healthy), component(HealthLevel::Degraded)]);
        assert_eq!(status.overall, HealthLevel::Degraded);
    }
}
