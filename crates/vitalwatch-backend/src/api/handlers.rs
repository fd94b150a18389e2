//! Axum request handlers for the control plane.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;

use vitalwatch_core::{SubjectStatistics, TrendAggregator};

use super::dto::{
    clamp_limit, AlertHistoryQuery, DetectorSelectionDto, HealthResponse, ResetResponse,
    SetDetectorRequest, TrendsResponse,
};
use super::error::ApiResult;
use super::state::AppState;
use crate::storage::{AlertRecord, EventSink};

/// `GET /api/v1/health` — storage probe.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.store().health_check().await?;
    Ok(Json(HealthResponse { status: "ok" }))
}

/// `GET /api/v1/alerts/history` — most recent alerts, newest first.
///
/// Defaults to the actively selected subject; the limit is clamped to
/// 1..=1000.
#[tracing::instrument(skip(state))]
pub async fn alerts_history(
    State(state): State<AppState>,
    Query(query): Query<AlertHistoryQuery>,
) -> ApiResult<Json<Vec<AlertRecord>>> {
    let limit = clamp_limit(query.limit);
    let subject_id = query
        .subject_id
        .unwrap_or_else(|| state.engine().current_selection().subject_id);

    let alerts = state.store().alerts_history(&subject_id, limit).await?;
    Ok(Json(alerts))
}

/// `GET /api/v1/trends` — five fixed windows per parameter.
#[tracing::instrument(skip(state))]
pub async fn trends(State(state): State<AppState>) -> ApiResult<Json<TrendsResponse>> {
    let report = TrendAggregator::analyze(state.store(), Utc::now()).await;
    Ok(Json(TrendsResponse { trends: report }))
}

/// `GET /api/v1/detector` — current detector selection.
#[tracing::instrument(skip(state))]
pub async fn get_detector(State(state): State<AppState>) -> ApiResult<Json<DetectorSelectionDto>> {
    Ok(Json(state.engine().current_selection().into()))
}

/// `POST /api/v1/detector` — change the detector selection.
///
/// Unknown kinds are rejected with 400 and leave the prior selection
/// unchanged. An accepted selection is persisted so it survives
/// restarts.
#[tracing::instrument(skip(state, request))]
pub async fn set_detector(
    State(state): State<AppState>,
    Json(request): Json<SetDetectorRequest>,
) -> ApiResult<Json<DetectorSelectionDto>> {
    let current = state.engine().current_selection();
    let subject_id = request.subject_id.unwrap_or(current.subject_id);

    let selection = state
        .engine()
        .select_detector_named(&request.detector_type, &subject_id)?;
    state.store().store_selection(&selection).await?;

    tracing::info!(
        kind = %selection.kind,
        subject = %selection.subject_id,
        "detector selection updated via control plane"
    );
    Ok(Json(selection.into()))
}

/// `GET /api/v1/subjects/:subject_id/baselines` — learning statistics.
#[tracing::instrument(skip(state))]
pub async fn baseline_statistics(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> ApiResult<Json<SubjectStatistics>> {
    let stats = state.engine().statistics(&subject_id).await?;
    Ok(Json(stats))
}

/// `POST /api/v1/subjects/:subject_id/baselines/reset` — delete all
/// learned baselines for a subject. Idempotent.
#[tracing::instrument(skip(state))]
pub async fn reset_baselines(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> ApiResult<Json<ResetResponse>> {
    let removed = state.engine().reset_baselines(&subject_id).await?;
    Ok(Json(ResetResponse {
        success: true,
        removed,
    }))
}
