use serde::{Deserialize, Serialize};

use crate::models::schedule::timestamp_to_rfc3339;

/// Severity of a backup log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
}

/// Log record stored in redb under (backup_id, seq)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupLogRecord {
    /// When the entry was written (Unix timestamp)
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
}

/// Log entry for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupLogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl BackupLogEntry {
    pub fn from_record(record: &BackupLogRecord) -> Self {
        Self {
            timestamp: timestamp_to_rfc3339(record.timestamp),
            level: record.level,
            message: record.message.clone(),
        }
    }
}
