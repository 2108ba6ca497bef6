use redb::TableDefinition;

/// Backups table: backup_id (UUID) -> BackupRecord (serialized)
pub const BACKUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("backups");

/// Settings table: backup_id -> BackupSettings (serialized)
/// Exactly one row per backup, written in the same transaction as the backup
pub const BACKUP_SETTINGS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("backup_settings");

/// Schedules table: settings_id -> ScheduleRecord (serialized)
/// At most one schedule per settings profile
pub const BACKUP_SCHEDULES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("backup_schedules");

/// Logs table: (backup_id, seq) -> BackupLogRecord (serialized)
/// Append-only; seq is monotonically increasing per backup
pub const BACKUP_LOGS: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("backup_logs");

/// Files table: (backup_id, seq) -> BackupFileRecord (serialized)
/// One row per produced artifact, recorded as the run progresses
pub const BACKUP_FILES: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("backup_files");
