use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;
use crate::admin::AdminState;
use crate::engine::{ConfigReport, StatsReport};
use crate::health::{HealthReport, HealthStatus, ProbeSummary};

#[derive(Serialize)]
pub struct HealthCheckResult {
    pub summary: ProbeSummary,
    pub report: HealthReport,
}

#[derive(Serialize)]
pub struct SessionsCleared {
    pub cleared: usize,
}

#[derive(Serialize)]
pub struct StatsReset {
    pub reset: bool,
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<StatsReport> {
    Json(state.engine.stats())
}

/// 200 unless no backend is eligible.
pub async fn get_health(State(state): State<AdminState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.engine.health();
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(report))
}

pub async fn trigger_health_check(State(state): State<AdminState>) -> Json<HealthCheckResult> {
    let summary = state.engine.check_health().await;
    Json(HealthCheckResult {
        summary,
        report: state.engine.health(),
    })
}

pub async fn get_config(State(state): State<AdminState>) -> Json<ConfigReport> {
    Json(state.engine.config_report())
}

pub async fn clear_sessions(State(state): State<AdminState>) -> Json<SessionsCleared> {
    Json(SessionsCleared {
        cleared: state.engine.clear_sessions(),
    })
}

pub async fn reset_stats(State(state): State<AdminState>) -> Json<StatsReset> {
    state.engine.reset_stats();
    Json(StatsReset { reset: true })
}
