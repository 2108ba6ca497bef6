use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{ERR_INVALID_BACKUP_TYPE, MAX_NAME_LENGTH};
use crate::error::{AppError, Result};

/// Kind of data-protection job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackupType {
    Full,
    Incremental,
}

impl BackupType {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FULL" => Ok(Self::Full),
            "INCREMENTAL" => Ok(Self::Incremental),
            _ => Err(AppError::Validation(ERR_INVALID_BACKUP_TYPE.to_string())),
        }
    }
}

/// Lifecycle state of a backup job
///
/// Transitions: Pending -> Running -> {Completed, Failed}. Terminal states
/// never transition again; a terminal job can only be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackupStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl BackupStatus {
    /// Returns true if the job is done (no further status transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupStatus::Completed | BackupStatus::Failed)
    }
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackupStatus::Pending => "PENDING",
            BackupStatus::Running => "RUNNING",
            BackupStatus::Completed => "COMPLETED",
            BackupStatus::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Backup record stored in redb
/// Uses Unix timestamps for compact storage with bincode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub name: String,
    pub backup_type: BackupType,
    pub status: BackupStatus,
    /// When the job was created (Unix timestamp)
    pub created_at: i64,
    pub owner_id: String,
}

/// Backup model for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub status: BackupStatus,
    /// RFC3339 creation time
    pub created_at: String,
    pub owner_id: String,
}

impl Backup {
    pub fn from_record(id: &str, record: &BackupRecord) -> Self {
        let created_at = DateTime::from_timestamp(record.created_at, 0)
            .unwrap_or_else(Utc::now)
            .to_rfc3339();
        Self {
            id: id.to_string(),
            name: record.name.clone(),
            backup_type: record.backup_type,
            status: record.status,
            created_at,
            owner_id: record.owner_id.clone(),
        }
    }

    /// Validate a backup name supplied by a client
    pub fn validate_name(name: &str) -> bool {
        !name.trim().is_empty() && name.len() <= MAX_NAME_LENGTH
    }
}
