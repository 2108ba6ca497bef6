use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::constants::ERR_MISSING_ID;
use crate::error::{AppError, Result};
use crate::models::BackupStatus;
use crate::store;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DeleteBackupParams {
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Delete a backup job and everything it owns
///
/// A RUNNING job is asked to stop first; if it does not wind down within
/// the configured wait it is force-marked FAILED and deletion proceeds
/// anyway. The row removal itself is one atomic transaction, so no log,
/// file or settings row can survive its backup.
///
/// DELETE /admin/backup?id=
pub async fn delete_backup(
    State(state): State<AppState>,
    Query(params): Query<DeleteBackupParams>,
) -> Result<Json<DeleteResponse>> {
    let id = params
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation(ERR_MISSING_ID.to_string()))?;

    let db = state.db.clone();
    let lookup_id = id.clone();
    let status = tokio::task::spawn_blocking(move || store::get_status(&db, &lookup_id))
        .await??
        .ok_or(AppError::BackupNotFound)?;

    if status == BackupStatus::Running {
        // Cooperative cancellation handshake with a bounded wait
        state.runner.request_stop(&id);
        let deadline = Instant::now() + Duration::from_secs(state.config.delete_stop_wait_secs);
        while state.runner.is_running(&id) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if state.runner.is_running(&id) {
            tracing::warn!("Backup {} did not stop in time, forcing FAILED", id);
        }
        let db = state.db.clone();
        let fail_id = id.clone();
        let now = Utc::now().timestamp();
        tokio::task::spawn_blocking(move || {
            store::force_fail(&db, &fail_id, "Backup force-failed by delete request", now)
        })
        .await??;
    }

    let db = state.db.clone();
    let delete_id = id.clone();
    tokio::task::spawn_blocking(move || store::delete_job_rows(&db, &delete_id)).await??;

    Ok(Json(DeleteResponse { success: true }))
}
