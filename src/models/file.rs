use serde::{Deserialize, Serialize};

/// Artifact bookkeeping row, stored under (backup_id, seq) and returned
/// as-is in API responses
///
/// `size` is the artifact's on-disk size; `checksum` is the hex SHA-256 of
/// the source content before compression, so it stays comparable across
/// runs regardless of compression level or encryption nonces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFileRecord {
    pub path: String,
    pub size: u64,
    pub checksum: String,
    pub encrypted: bool,
}
