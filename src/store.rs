//! Job Store: durable records for backups, settings, schedules, logs and
//! files, with all multi-row operations inside single redb write
//! transactions so readers never observe partial rows.

use redb::{ReadableDatabase, ReadableTable};
use serde::Serialize;
use uuid::Uuid;

use crate::constants::RECENT_LOG_LIMIT;
use crate::db::{tables, Db};
use crate::error::{AppError, Result};
use crate::models::{
    Backup, BackupFileRecord, BackupLogEntry, BackupLogRecord, BackupRecord, BackupSettings,
    BackupStatus, BackupType, LogLevel, Schedule, ScheduleFrequency, ScheduleRecord,
};

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(value, BINCODE_CONFIG)?)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, BINCODE_CONFIG)?;
    Ok(value)
}

/// Next append sequence for a (backup_id, seq) keyed table
fn next_seq<T: ReadableTable<(&'static str, u64), &'static [u8]>>(
    table: &T,
    id: &str,
) -> Result<u64> {
    let mut range = table.range((id, 0u64)..=(id, u64::MAX))?;
    Ok(match range.next_back() {
        Some(entry) => entry?.0.value().1 + 1,
        None => 0,
    })
}

/// A backup with its settings and most recent log entries, as served by
/// the listing endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    #[serde(flatten)]
    pub backup: Backup,
    pub settings: BackupSettings,
    pub recent_logs: Vec<BackupLogEntry>,
}

/// A schedule joined with the settings profile and backup it references
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDetails {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub settings: BackupSettings,
    pub backup: Backup,
}

/// Create a backup job in PENDING state together with its settings
///
/// Both rows and the creation log entry commit atomically; a failed
/// transaction leaves nothing behind.
pub fn create_job(
    db: &Db,
    name: &str,
    backup_type: BackupType,
    owner_id: &str,
    settings: &BackupSettings,
    now: i64,
) -> Result<Backup> {
    let id = Uuid::new_v4().to_string();
    let record = BackupRecord {
        name: name.to_string(),
        backup_type,
        status: BackupStatus::Pending,
        created_at: now,
        owner_id: owner_id.to_string(),
    };

    let write_txn = db.begin_write()?;
    {
        let mut backups = write_txn.open_table(tables::BACKUPS)?;
        backups.insert(id.as_str(), encode(&record)?.as_slice())?;
        drop(backups);

        let mut settings_table = write_txn.open_table(tables::BACKUP_SETTINGS)?;
        settings_table.insert(id.as_str(), encode(settings)?.as_slice())?;
        drop(settings_table);

        let mut logs = write_txn.open_table(tables::BACKUP_LOGS)?;
        let log = BackupLogRecord {
            timestamp: now,
            level: LogLevel::Info,
            message: format!("Backup job created ({:?})", backup_type),
        };
        logs.insert((id.as_str(), 0u64), encode(&log)?.as_slice())?;
    }
    write_txn.commit()?;

    Ok(Backup::from_record(&id, &record))
}

/// List all jobs with settings and the most recent log entries,
/// ordered by creation time descending
pub fn list_jobs(db: &Db) -> Result<Vec<JobDetails>> {
    let read_txn = db.begin_read()?;
    let backups = read_txn.open_table(tables::BACKUPS)?;
    let settings_table = read_txn.open_table(tables::BACKUP_SETTINGS)?;
    let logs = read_txn.open_table(tables::BACKUP_LOGS)?;

    let mut jobs = Vec::new();
    for entry in backups.iter()? {
        let (key, value) = entry?;
        let id = key.value();
        let record: BackupRecord = decode(value.value())?;

        let settings: BackupSettings = match settings_table.get(id)? {
            Some(bytes) => decode(bytes.value())?,
            None => {
                tracing::warn!("Backup {} has no settings row, skipping", id);
                continue;
            }
        };

        // Walk the log range backwards to pick up the newest entries
        let mut recent_logs = Vec::new();
        let mut range = logs.range((id, 0u64)..=(id, u64::MAX))?;
        while recent_logs.len() < RECENT_LOG_LIMIT {
            match range.next_back() {
                Some(entry) => {
                    let (_, bytes) = entry?;
                    let log: BackupLogRecord = decode(bytes.value())?;
                    recent_logs.push(BackupLogEntry::from_record(&log));
                }
                None => break,
            }
        }
        recent_logs.reverse();

        jobs.push(JobDetails {
            backup: Backup::from_record(id, &record),
            settings,
            recent_logs,
        });
    }

    jobs.sort_by(|a, b| {
        b.backup
            .created_at
            .cmp(&a.backup.created_at)
            .then_with(|| a.backup.id.cmp(&b.backup.id))
    });
    Ok(jobs)
}

/// Current status of a job, if it exists
pub fn get_status(db: &Db, id: &str) -> Result<Option<BackupStatus>> {
    let read_txn = db.begin_read()?;
    let backups = read_txn.open_table(tables::BACKUPS)?;
    match backups.get(id)? {
        Some(bytes) => {
            let record: BackupRecord = decode(bytes.value())?;
            Ok(Some(record.status))
        }
        None => Ok(None),
    }
}

/// Load a job and its settings for execution
pub fn load_job(db: &Db, id: &str) -> Result<Option<(BackupRecord, BackupSettings)>> {
    let read_txn = db.begin_read()?;
    let backups = read_txn.open_table(tables::BACKUPS)?;
    let record: BackupRecord = match backups.get(id)? {
        Some(bytes) => decode(bytes.value())?,
        None => return Ok(None),
    };
    let settings_table = read_txn.open_table(tables::BACKUP_SETTINGS)?;
    let settings: BackupSettings = match settings_table.get(id)? {
        Some(bytes) => decode(bytes.value())?,
        None => return Ok(None),
    };
    Ok(Some((record, settings)))
}

/// Transition a job from PENDING to RUNNING and log the start
///
/// Returns false without touching anything if the job is gone (deleted
/// while queued) or no longer pending.
pub fn mark_running(db: &Db, id: &str, now: i64) -> Result<bool> {
    let write_txn = db.begin_write()?;
    let started = {
        let mut backups = write_txn.open_table(tables::BACKUPS)?;
        let mut record: BackupRecord = match backups.get(id)? {
            Some(bytes) => decode(bytes.value())?,
            None => return Ok(false),
        };
        if record.status != BackupStatus::Pending {
            return Ok(false);
        }
        record.status = BackupStatus::Running;
        backups.insert(id, encode(&record)?.as_slice())?;
        drop(backups);

        let mut logs = write_txn.open_table(tables::BACKUP_LOGS)?;
        let seq = next_seq(&logs, id)?;
        let log = BackupLogRecord {
            timestamp: now,
            level: LogLevel::Info,
            message: "Backup started".to_string(),
        };
        logs.insert((id, seq), encode(&log)?.as_slice())?;
        true
    };
    write_txn.commit()?;
    Ok(started)
}

/// Finalize a RUNNING job to a terminal status with a closing log entry
///
/// A job that is already terminal (or deleted) is left untouched.
pub fn finalize(
    db: &Db,
    id: &str,
    status: BackupStatus,
    level: LogLevel,
    message: &str,
    now: i64,
) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut backups = write_txn.open_table(tables::BACKUPS)?;
        let mut record: BackupRecord = match backups.get(id)? {
            Some(bytes) => decode(bytes.value())?,
            None => return Ok(()),
        };
        if record.status != BackupStatus::Running {
            return Ok(());
        }
        record.status = status;
        backups.insert(id, encode(&record)?.as_slice())?;
        drop(backups);

        let mut logs = write_txn.open_table(tables::BACKUP_LOGS)?;
        let seq = next_seq(&logs, id)?;
        let log = BackupLogRecord {
            timestamp: now,
            level,
            message: message.to_string(),
        };
        logs.insert((id, seq), encode(&log)?.as_slice())?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Force a non-terminal job to FAILED (deletion of an unresponsive run)
pub fn force_fail(db: &Db, id: &str, message: &str, now: i64) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut backups = write_txn.open_table(tables::BACKUPS)?;
        let mut record: BackupRecord = match backups.get(id)? {
            Some(bytes) => decode(bytes.value())?,
            None => return Ok(()),
        };
        if record.status.is_terminal() {
            return Ok(());
        }
        record.status = BackupStatus::Failed;
        backups.insert(id, encode(&record)?.as_slice())?;
        drop(backups);

        let mut logs = write_txn.open_table(tables::BACKUP_LOGS)?;
        let seq = next_seq(&logs, id)?;
        let log = BackupLogRecord {
            timestamp: now,
            level: LogLevel::Error,
            message: message.to_string(),
        };
        logs.insert((id, seq), encode(&log)?.as_slice())?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Append a log entry for a job
pub fn append_log(db: &Db, id: &str, level: LogLevel, message: &str, now: i64) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut logs = write_txn.open_table(tables::BACKUP_LOGS)?;
        let seq = next_seq(&logs, id)?;
        let log = BackupLogRecord {
            timestamp: now,
            level,
            message: message.to_string(),
        };
        logs.insert((id, seq), encode(&log)?.as_slice())?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Record one produced artifact for a RUNNING job
pub fn record_file(db: &Db, id: &str, file: &BackupFileRecord) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut files = write_txn.open_table(tables::BACKUP_FILES)?;
        let seq = next_seq(&files, id)?;
        files.insert((id, seq), encode(file)?.as_slice())?;
    }
    write_txn.commit()?;
    Ok(())
}

/// All file rows recorded for a job
pub fn list_files(db: &Db, id: &str) -> Result<Vec<BackupFileRecord>> {
    let read_txn = db.begin_read()?;
    let files = read_txn.open_table(tables::BACKUP_FILES)?;
    let mut result = Vec::new();
    for entry in files.range((id, 0u64)..=(id, u64::MAX))? {
        let (_, bytes) = entry?;
        result.push(decode(bytes.value())?);
    }
    Ok(result)
}

/// Source checksums of the most recently COMPLETED backup, keyed by path
///
/// Used by incremental runs to skip unchanged units. Empty when no backup
/// has completed yet.
pub fn latest_completed_checksums(
    db: &Db,
) -> Result<std::collections::HashMap<String, String>> {
    let read_txn = db.begin_read()?;
    let backups = read_txn.open_table(tables::BACKUPS)?;

    let mut latest: Option<(String, i64)> = None;
    for entry in backups.iter()? {
        let (key, value) = entry?;
        let record: BackupRecord = decode(value.value())?;
        if record.status != BackupStatus::Completed {
            continue;
        }
        let newer = match &latest {
            Some((_, created_at)) => record.created_at > *created_at,
            None => true,
        };
        if newer {
            latest = Some((key.value().to_string(), record.created_at));
        }
    }

    let mut checksums = std::collections::HashMap::new();
    if let Some((id, _)) = latest {
        let files = read_txn.open_table(tables::BACKUP_FILES)?;
        for entry in files.range((id.as_str(), 0u64)..=(id.as_str(), u64::MAX))? {
            let (_, bytes) = entry?;
            let file: BackupFileRecord = decode(bytes.value())?;
            checksums.insert(file.path, file.checksum);
        }
    }
    Ok(checksums)
}

/// Cascade-delete a backup with everything it owns
///
/// Logs, files, settings, any schedule referencing the settings profile,
/// and the backup itself go in one transaction; a failure rolls the whole
/// deletion back.
pub fn delete_job_rows(db: &Db, id: &str) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut backups = write_txn.open_table(tables::BACKUPS)?;
        if backups.get(id)?.is_none() {
            return Err(AppError::BackupNotFound);
        }

        let mut logs = write_txn.open_table(tables::BACKUP_LOGS)?;
        let mut seqs = Vec::new();
        for entry in logs.range((id, 0u64)..=(id, u64::MAX))? {
            let (key, _) = entry?;
            seqs.push(key.value().1);
        }
        for seq in seqs {
            logs.remove((id, seq))?;
        }
        drop(logs);

        let mut files = write_txn.open_table(tables::BACKUP_FILES)?;
        let mut seqs = Vec::new();
        for entry in files.range((id, 0u64)..=(id, u64::MAX))? {
            let (key, _) = entry?;
            seqs.push(key.value().1);
        }
        for seq in seqs {
            files.remove((id, seq))?;
        }
        drop(files);

        let mut settings_table = write_txn.open_table(tables::BACKUP_SETTINGS)?;
        settings_table.remove(id)?;
        drop(settings_table);

        // A schedule never outlives the settings profile it references
        let mut schedules = write_txn.open_table(tables::BACKUP_SCHEDULES)?;
        schedules.remove(id)?;
        drop(schedules);

        backups.remove(id)?;
    }
    write_txn.commit()?;

    tracing::info!("Backup {} and all associated rows deleted", id);
    Ok(())
}

/// Create or update the schedule for a settings profile
///
/// Keyed uniquely by settings_id: a repeated upsert updates the existing
/// row. Enabling computes a fresh next_run_at strictly after `now`;
/// disabling clears it.
pub fn upsert_schedule(
    db: &Db,
    settings_id: &str,
    enabled: bool,
    frequency: ScheduleFrequency,
    time_of_day: &str,
    now: i64,
) -> Result<Schedule> {
    use chrono::Datelike;

    let now_dt = chrono::DateTime::from_timestamp(now, 0)
        .ok_or_else(|| AppError::Validation("Invalid timestamp".to_string()))?;

    let write_txn = db.begin_write()?;
    let record = {
        let settings_table = write_txn.open_table(tables::BACKUP_SETTINGS)?;
        if settings_table.get(settings_id)?.is_none() {
            return Err(AppError::BackupNotFound);
        }
        drop(settings_table);

        let mut schedules = write_txn.open_table(tables::BACKUP_SCHEDULES)?;
        let created_at = match schedules.get(settings_id)? {
            Some(bytes) => decode::<ScheduleRecord>(bytes.value())?.created_at,
            None => now,
        };

        let mut record = ScheduleRecord {
            enabled,
            frequency,
            time_of_day: time_of_day.to_string(),
            anchor_weekday: now_dt.weekday().num_days_from_monday() as u8,
            anchor_day_of_month: now_dt.day() as u8,
            next_run_at: None,
            created_at,
            updated_at: now,
        };
        if enabled {
            record.next_run_at = Some(record.next_occurrence_after(now)?);
        }
        schedules.insert(settings_id, encode(&record)?.as_slice())?;
        record
    };
    write_txn.commit()?;

    Ok(Schedule::from_record(settings_id, &record))
}

/// List all schedules joined with their settings profile and backup
pub fn list_schedules(db: &Db) -> Result<Vec<ScheduleDetails>> {
    let read_txn = db.begin_read()?;
    let schedules = read_txn.open_table(tables::BACKUP_SCHEDULES)?;
    let settings_table = read_txn.open_table(tables::BACKUP_SETTINGS)?;
    let backups = read_txn.open_table(tables::BACKUPS)?;

    let mut result = Vec::new();
    for entry in schedules.iter()? {
        let (key, value) = entry?;
        let settings_id = key.value();
        let record: ScheduleRecord = decode(value.value())?;

        let settings: BackupSettings = match settings_table.get(settings_id)? {
            Some(bytes) => decode(bytes.value())?,
            None => {
                tracing::warn!("Schedule {} has no settings row, skipping", settings_id);
                continue;
            }
        };
        let backup: BackupRecord = match backups.get(settings_id)? {
            Some(bytes) => decode(bytes.value())?,
            None => {
                tracing::warn!("Schedule {} has no backup row, skipping", settings_id);
                continue;
            }
        };

        result.push(ScheduleDetails {
            schedule: Schedule::from_record(settings_id, &record),
            settings,
            backup: Backup::from_record(settings_id, &backup),
        });
    }

    result.sort_by(|a, b| {
        b.schedule
            .created_at
            .cmp(&a.schedule.created_at)
            .then_with(|| a.schedule.settings_id.cmp(&b.schedule.settings_id))
    });
    Ok(result)
}

/// Delete a schedule by its settings_id
pub fn delete_schedule(db: &Db, settings_id: &str) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut schedules = write_txn.open_table(tables::BACKUP_SCHEDULES)?;
        if schedules.remove(settings_id)?.is_none() {
            return Err(AppError::ScheduleNotFound);
        }
    }
    write_txn.commit()?;
    Ok(())
}

/// Armed schedules whose next_run_at has come due, with the observed
/// trigger value used later as the claim's compare-and-set expectation
pub fn due_schedules(db: &Db, now: i64) -> Result<Vec<(String, i64)>> {
    let read_txn = db.begin_read()?;
    let schedules = read_txn.open_table(tables::BACKUP_SCHEDULES)?;

    let mut due = Vec::new();
    for entry in schedules.iter()? {
        let (key, value) = entry?;
        let record: ScheduleRecord = decode(value.value())?;
        if !record.enabled {
            continue;
        }
        if let Some(next_run_at) = record.next_run_at {
            if next_run_at <= now {
                due.push((key.value().to_string(), next_run_at));
            }
        }
    }
    Ok(due)
}

/// Claim a due schedule and enqueue its job in one transaction
///
/// The claim only succeeds while next_run_at still equals `expected_due`,
/// so overlapping ticks cannot double-fire one schedule. Re-arming and job
/// creation commit together with the claim.
pub fn claim_due_schedule(
    db: &Db,
    settings_id: &str,
    expected_due: i64,
    now: i64,
) -> Result<Option<Backup>> {
    let write_txn = db.begin_write()?;
    let backup = {
        let mut schedules = write_txn.open_table(tables::BACKUP_SCHEDULES)?;
        let mut record: ScheduleRecord = match schedules.get(settings_id)? {
            Some(bytes) => decode(bytes.value())?,
            None => return Ok(None),
        };
        if !record.enabled || record.next_run_at != Some(expected_due) {
            // Another tick got here first
            return Ok(None);
        }

        let settings_table = write_txn.open_table(tables::BACKUP_SETTINGS)?;
        let settings: Option<BackupSettings> = match settings_table.get(settings_id)? {
            Some(bytes) => Some(decode(bytes.value())?),
            None => None,
        };
        drop(settings_table);

        let Some(settings) = settings else {
            // Settings row is gone; disarm instead of firing forever
            tracing::warn!(
                "Schedule {} references missing settings, disabling",
                settings_id
            );
            record.enabled = false;
            record.next_run_at = None;
            record.updated_at = now;
            schedules.insert(settings_id, encode(&record)?.as_slice())?;
            drop(schedules);
            write_txn.commit()?;
            return Ok(None);
        };

        record.next_run_at = Some(record.next_occurrence_after(now)?);
        record.updated_at = now;
        schedules.insert(settings_id, encode(&record)?.as_slice())?;
        drop(schedules);

        let id = Uuid::new_v4().to_string();
        let backup_record = BackupRecord {
            name: "Scheduled backup".to_string(),
            backup_type: BackupType::Full,
            status: BackupStatus::Pending,
            created_at: now,
            owner_id: "scheduler".to_string(),
        };

        let mut backups = write_txn.open_table(tables::BACKUPS)?;
        backups.insert(id.as_str(), encode(&backup_record)?.as_slice())?;
        drop(backups);

        let mut new_settings = write_txn.open_table(tables::BACKUP_SETTINGS)?;
        new_settings.insert(id.as_str(), encode(&settings)?.as_slice())?;
        drop(new_settings);

        let mut logs = write_txn.open_table(tables::BACKUP_LOGS)?;
        let log = BackupLogRecord {
            timestamp: now,
            level: LogLevel::Info,
            message: format!("Backup job created by schedule {}", settings_id),
        };
        logs.insert((id.as_str(), 0u64), encode(&log)?.as_slice())?;

        Backup::from_record(&id, &backup_record)
    };
    write_txn.commit()?;
    Ok(Some(backup))
}
