use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Backup, BackupType, SettingsInput};
use crate::store::{self, JobDetails};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub backup_type: String,
    pub settings: SettingsInput,
}

/// List all backup jobs with settings and recent logs
///
/// GET /admin/backup
pub async fn list_backups(State(state): State<AppState>) -> Result<Json<Vec<JobDetails>>> {
    let db = state.db.clone();
    let jobs = tokio::task::spawn_blocking(move || store::list_jobs(&db)).await??;
    Ok(Json(jobs))
}

/// Create a backup job and start executing it asynchronously
///
/// The response carries the PENDING record; execution outcome is observed
/// later through status and logs, never as an error here.
///
/// POST /admin/backup
pub async fn create_backup(
    State(state): State<AppState>,
    Json(payload): Json<CreateBackupRequest>,
) -> Result<Json<Backup>> {
    let backup_type = BackupType::parse(&payload.backup_type)?;
    let settings = payload.settings.validate()?;

    let name = match payload.name {
        Some(name) => {
            if !Backup::validate_name(&name) {
                return Err(AppError::Validation("Invalid backup name".to_string()));
            }
            name
        }
        None => "Manual backup".to_string(),
    };

    let db = state.db.clone();
    let now = Utc::now().timestamp();
    let backup = tokio::task::spawn_blocking(move || {
        store::create_job(&db, &name, backup_type, "admin", &settings, now)
    })
    .await??;

    tracing::info!("Backup {} created, starting execution", backup.id);
    tokio::spawn(state.runner.clone().execute(backup.id.clone()));

    Ok(Json(backup))
}
