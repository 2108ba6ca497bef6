use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::constants::{ERR_INVALID_TIME_OF_DAY, ERR_MISSING_ID};
use crate::error::{AppError, Result};
use crate::models::schedule::validate_time_of_day;
use crate::models::{Schedule, ScheduleFrequency};
use crate::routes::delete::DeleteResponse;
use crate::store::{self, ScheduleDetails};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpsertScheduleRequest {
    #[serde(rename = "settingsId")]
    pub settings_id: String,
    pub enabled: bool,
    pub frequency: String,
    #[serde(rename = "timeOfDay")]
    pub time_of_day: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteScheduleParams {
    pub id: Option<String>,
}

/// List all schedules with their settings profile and backup
///
/// GET /admin/backup/schedule
pub async fn list_schedules(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduleDetails>>> {
    let db = state.db.clone();
    let schedules = tokio::task::spawn_blocking(move || store::list_schedules(&db)).await??;
    Ok(Json(schedules))
}

/// Create or update the schedule for a settings profile
///
/// Upsert is keyed by settingsId: repeating the POST updates the single
/// existing row. Enabling arms the schedule with a next trigger strictly
/// in the future; disabling clears it.
///
/// POST /admin/backup/schedule
pub async fn upsert_schedule(
    State(state): State<AppState>,
    Json(payload): Json<UpsertScheduleRequest>,
) -> Result<Json<Schedule>> {
    let frequency = ScheduleFrequency::parse(&payload.frequency)?;
    validate_time_of_day(&payload.time_of_day)
        .map_err(|_| AppError::Validation(ERR_INVALID_TIME_OF_DAY.to_string()))?;

    let db = state.db.clone();
    let now = Utc::now().timestamp();
    let schedule = tokio::task::spawn_blocking(move || {
        store::upsert_schedule(
            &db,
            &payload.settings_id,
            payload.enabled,
            frequency,
            &payload.time_of_day,
            now,
        )
    })
    .await??;

    Ok(Json(schedule))
}

/// Delete a schedule by settings id
///
/// DELETE /admin/backup/schedule?id=
pub async fn delete_schedule(
    State(state): State<AppState>,
    Query(params): Query<DeleteScheduleParams>,
) -> Result<Json<DeleteResponse>> {
    let id = params
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation(ERR_MISSING_ID.to_string()))?;

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || store::delete_schedule(&db, &id)).await??;

    Ok(Json(DeleteResponse { success: true }))
}
