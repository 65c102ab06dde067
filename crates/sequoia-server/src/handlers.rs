//! API route handlers.

use axum::extract::{Query, State};
use axum::Json;
use tracing::{debug, info};

use sequoia_bridge::{SavingsReport, ServiceHealth, ServiceStats};
use sequoia_core::WeeklyGoals;

use crate::error::{ApiError, Result};
use crate::models::{
    AckResponse, CompressionEntry, CompressionsQuery, CompressionsResponse, DailyLimitResponse,
    GoalsRequest, PauseResponse, SetDailyLimitRequest, StatusResponse,
};
use crate::state::AppState;

/// GET /api/status - Settings snapshot plus last known service health.
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let settings = state.bridge.settings().await?;
    let service = state.bridge.service_status().await?;

    Ok(Json(StatusResponse {
        is_paused: settings.is_paused,
        welcome_completed: settings.welcome_completed,
        daily_limit: settings.daily_limit,
        daily_message_count: settings.daily_message_count,
        last_reset_date: settings.last_reset_date,
        savings: settings.savings,
        weekly_goals: settings.weekly_goals,
        service,
    }))
}

/// GET /api/stats - Bridge counters.
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<ServiceStats>> {
    Ok(Json(state.bridge.stats().await?))
}

/// GET /api/health - Probe the compression service now.
pub async fn check_health(State(state): State<AppState>) -> Result<Json<ServiceHealth>> {
    Ok(Json(state.bridge.check_service_health().await?))
}

/// GET /api/savings - Totals, last seven days and goal progress.
pub async fn get_savings(State(state): State<AppState>) -> Result<Json<SavingsReport>> {
    Ok(Json(state.bridge.savings().await?))
}

/// POST /api/savings/reset - Zero the savings counters.
pub async fn reset_savings(State(state): State<AppState>) -> Result<Json<AckResponse>> {
    state.bridge.reset_savings().await?;
    info!("Savings reset via API");
    Ok(Json(AckResponse::ok()))
}

/// GET /api/daily-limit - Today's limit status.
pub async fn get_daily_limit(State(state): State<AppState>) -> Result<Json<DailyLimitResponse>> {
    let status = state.bridge.check_daily_limit(state.call_timeout).await?;
    Ok(Json(status.into()))
}

/// PUT /api/daily-limit - Set the daily limit (clamped to 0..=100).
pub async fn set_daily_limit(
    State(state): State<AppState>,
    Json(req): Json<SetDailyLimitRequest>,
) -> Result<Json<DailyLimitResponse>> {
    let stored = state.bridge.set_daily_limit(req.limit).await?;
    debug!(requested = req.limit, stored, "Daily limit updated");

    let status = state.bridge.check_daily_limit(state.call_timeout).await?;
    Ok(Json(status.into()))
}

/// POST /api/pause - Stop compressing; counting continues.
pub async fn pause(State(state): State<AppState>) -> Result<Json<PauseResponse>> {
    let is_paused = state.bridge.set_paused(true).await?;
    Ok(Json(PauseResponse {
        success: true,
        is_paused,
    }))
}

/// POST /api/resume - Resume compressing.
pub async fn resume(State(state): State<AppState>) -> Result<Json<PauseResponse>> {
    let is_paused = state.bridge.set_paused(false).await?;
    Ok(Json(PauseResponse {
        success: true,
        is_paused,
    }))
}

/// GET /api/goals - Weekly goals.
pub async fn get_goals(State(state): State<AppState>) -> Result<Json<WeeklyGoals>> {
    Ok(Json(state.bridge.weekly_goals().await?))
}

/// PUT /api/goals - Set weekly goals; values are clamped into range.
pub async fn set_goals(
    State(state): State<AppState>,
    Json(req): Json<GoalsRequest>,
) -> Result<Json<WeeklyGoals>> {
    if !req.water_liters.is_finite() || !req.co2_kg.is_finite() {
        return Err(ApiError::BadRequest("goals must be finite numbers".into()));
    }

    let goals = state
        .bridge
        .set_weekly_goals(req.water_liters, req.co2_kg)
        .await?;
    Ok(Json(goals))
}

/// POST /api/welcome/complete - Mark the welcome flow as done.
pub async fn complete_welcome(State(state): State<AppState>) -> Result<Json<AckResponse>> {
    state.bridge.complete_welcome().await?;
    Ok(Json(AckResponse::ok()))
}

/// GET /api/compressions - Recent compression log, newest first.
pub async fn get_compressions(
    State(state): State<AppState>,
    Query(query): Query<CompressionsQuery>,
) -> Result<Json<CompressionsResponse>> {
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let records = state.bridge.recent_compressions(limit, offset).await?;
    let compressions = records
        .into_iter()
        .map(|r| CompressionEntry {
            tokens_saved: r.tokens_saved(),
            id: r.id,
            preview: r.preview,
            source: r.source,
            success: r.success,
            method: r.method,
            original_tokens: r.original_tokens,
            compressed_tokens: r.compressed_tokens,
            created_at: r.created_at,
        })
        .collect();

    Ok(Json(CompressionsResponse {
        compressions,
        limit,
        offset,
    }))
}
