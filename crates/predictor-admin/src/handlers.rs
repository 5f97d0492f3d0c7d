//! HTTP handlers for the admin API (C9): the three traffic-mutation
//! endpoints and the two liveness checks — `/health/check`, whose body
//! is the fixed `{"status":"ok"}` wire contract, and `/health/detailed`,
//! an ambient addition carrying the per-component breakdown (the split
//! mirrors the basic/detailed health-check pair other admin APIs expose).

use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use predictor_common::{ComponentHealth, Error, HealthLevel, HealthStatus};
use predictor_router::TrafficEntry;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/traffic/shift", post(shift_traffic))
        .route("/traffic/set", post(set_traffic))
        .route("/traffic/deactivate", post(deactivate_traffic))
        .route("/health/check", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ShiftRequest {
    prediction_type: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRequest {
    prediction_type: String,
    predictor_version: u32,
    traffic: u32,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeactivateRequest {
    prediction_type: String,
    predictor_version: u32,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrafficResponse {
    prediction_type: String,
    traffic_distribution: Vec<TrafficEntry>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: HealthLevel,
    uptime_seconds: i64,
    components: Vec<ComponentHealth>,
}

async fn shift_traffic(State(state): State<AppState>, Json(request): Json<ShiftRequest>) -> Response {
    info!(prediction_type = %request.prediction_type, "shift_newest requested");
    match state.router.shift_newest(&request.prediction_type, request.description).await {
        Ok(traffic_distribution) => Json(TrafficResponse {
            prediction_type: request.prediction_type,
            traffic_distribution,
        })
        .into_response(),
        Err(error) => error_response(error),
    }
}

async fn set_traffic(State(state): State<AppState>, Json(request): Json<SetRequest>) -> Response {
    if request.traffic > 100 {
        return error_response(Error::InvalidTraffic(format!(
            "traffic {} out of range 0..=100",
            request.traffic
        )));
    }

    info!(
        prediction_type = %request.prediction_type,
        predictor_version = request.predictor_version,
        traffic = request.traffic,
        "set_traffic requested"
    );
    match state
        .router
        .set_traffic(&request.prediction_type, request.predictor_version, request.traffic, request.description)
        .await
    {
        Ok(traffic_distribution) => Json(TrafficResponse {
            prediction_type: request.prediction_type,
            traffic_distribution,
        })
        .into_response(),
        Err(error) => error_response(error),
    }
}

async fn deactivate_traffic(State(state): State<AppState>, Json(request): Json<DeactivateRequest>) -> Response {
    info!(
        prediction_type = %request.prediction_type,
        predictor_version = request.predictor_version,
        "deactivate requested"
    );
    match state
        .router
        .deactivate(&request.prediction_type, request.predictor_version, request.description)
        .await
    {
        Ok(traffic_distribution) => Json(TrafficResponse {
            prediction_type: request.prediction_type,
            traffic_distribution,
        })
        .into_response(),
        Err(error) => error_response(error),
    }
}

/// `GET /health/check` — the fixed wire contract: `{"status":"ok"}` when
/// every dependency is reachable, `{"status":"error"}` (503) otherwise.
/// No other fields are ever added to this body; richer detail lives at
/// `/health/detailed`.
async fn health_check(State(state): State<AppState>) -> Response {
    let health = probe_health(&state).await;
    if health.overall == HealthLevel::Healthy {
        Json(serde_json::json!({ "status": "ok" })).into_response()
    } else {
        warn!(status = ?health.overall, "health check found an unreachable dependency");
        (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "error" }))).into_response()
    }
}

/// `GET /health/detailed` — per-component breakdown plus uptime, for
/// operators and dashboards. Not part of the fixed admin-API contract.
async fn detailed_health_check(State(state): State<AppState>) -> Response {
    let health = probe_health(&state).await;
    let uptime_seconds = chrono::Utc::now().signed_duration_since(state.started_at).num_seconds();
    let body = HealthResponse {
        status: health.overall,
        uptime_seconds,
        components: health.components,
    };

    if body.status == HealthLevel::Healthy {
        Json(body).into_response()
    } else {
        warn!(status = ?body.status, "detailed health check found an unreachable dependency");
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

async fn probe_health(state: &AppState) -> HealthStatus {
    let components = vec![
        ComponentHealth {
            name: "document_store".to_string(),
            level: ping_level(state.store.ping().await.is_ok()),
            detail: None,
        },
        ComponentHealth {
            name: "queue_broker".to_string(),
            level: ping_level(state.broker.ping().await.is_ok()),
            detail: None,
        },
    ];
    HealthStatus::calculate_overall_health(components)
}

fn ping_level(reachable: bool) -> HealthLevel {
    if reachable {
        HealthLevel::Healthy
    } else {
        HealthLevel::Critical
    }
}

fn error_response(error: Error) -> Response {
    let status = match &error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidTraffic(_) | Error::UnknownPredictor(_) | Error::NoActivePredictor(_) => StatusCode::BAD_REQUEST,
        Error::VersionRegression(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(%error, category = error.category(), "traffic mutation failed");
    (
        status,
        Json(serde_json::json!({ "error": error.category(), "message": error.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_level_maps_reachability_to_health() {
        assert_eq!(ping_level(true), HealthLevel::Healthy);
        assert_eq!(ping_level(false), HealthLevel::Critical);
    }

    #[test]
    fn health_check_wire_contract_is_literal_ok_or_error() {
        let healthy = serde_json::json!({ "status": "ok" });
        assert_eq!(healthy["status"], "ok");
        assert_eq!(healthy.as_object().unwrap().len(), 1);

        let unhealthy = serde_json::json!({ "status": "error" });
        assert_eq!(unhealthy["status"], "error");
        assert_eq!(unhealthy.as_object().unwrap().len(), 1);
    }

    #[test]
    fn error_response_maps_categories_to_status_codes() {
        assert_eq!(error_response(Error::NotFound("x".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            error_response(Error::InvalidTraffic("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(Error::UnknownPredictor("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(Error::NoActivePredictor("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(Error::VersionRegression("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_response(Error::StoreTransactionFailed("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
