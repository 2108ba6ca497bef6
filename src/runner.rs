//! Backup Runner: executes one job end to end.
//!
//! A job admitted by the limiter moves PENDING -> RUNNING, archives every
//! unit that survives the exclusion filter, and finalizes to COMPLETED or
//! FAILED. The execution watchdog and the deletion-initiated stop are the
//! only sources of forced termination; both leave bookkeeping consistent
//! and both release the admission slot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::artifact;
use crate::config::Config;
use crate::db::Db;
use crate::error::Result;
use crate::limiter::ConcurrencyLimiter;
use crate::models::{BackupFileRecord, BackupSettings, BackupStatus, BackupType, LogLevel};
use crate::store;

struct RunSummary {
    archived: usize,
    skipped: usize,
}

enum RunFailure {
    /// Deletion requested a stop and the runner honored it between units
    Stopped,
    Unit { path: String, detail: String },
}

enum Outcome {
    Completed(RunSummary),
    Failed(RunFailure),
    TimedOut,
}

pub struct Runner {
    db: Db,
    config: Config,
    limiter: ConcurrencyLimiter,
    key: [u8; 32],
    running: Mutex<HashMap<String, CancellationToken>>,
}

impl Runner {
    pub fn new(db: Db, config: Config) -> Arc<Self> {
        let key = artifact::derive_key(&config.backup_secret_key);
        Arc::new(Self {
            db,
            config,
            limiter: ConcurrencyLimiter::new(),
            key,
            running: Mutex::new(HashMap::new()),
        })
    }

    /// True while the job's execution task holds a slot
    pub fn is_running(&self, id: &str) -> bool {
        self.running
            .lock()
            .expect("runner mutex poisoned")
            .contains_key(id)
    }

    /// Ask a running job to stop cooperatively; returns false if the job
    /// has no live execution task
    pub fn request_stop(&self, id: &str) -> bool {
        let running = self.running.lock().expect("runner mutex poisoned");
        match running.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Execute one job to completion; the entry point for spawned tasks
    ///
    /// Execution failures are recorded on the job itself, never returned
    /// to whoever created it.
    pub async fn execute(self: Arc<Self>, job_id: String) {
        if let Err(e) = self.run(&job_id).await {
            tracing::error!("Backup {} orchestration error: {}", job_id, e);
        }
    }

    async fn run(&self, job_id: &str) -> Result<()> {
        let id = job_id.to_string();
        let loaded = self.with_db(move |db| store::load_job(&db, &id)).await?;
        let Some((record, settings)) = loaded else {
            tracing::info!("Backup {} vanished before execution", job_id);
            return Ok(());
        };

        // Waiting for a slot is not observable as a state change: the job
        // stays PENDING until admitted
        let slot = self
            .limiter
            .admit(&settings.profile_key(), settings.max_concurrent)
            .await;

        let id = job_id.to_string();
        let started = self
            .with_db(move |db| store::mark_running(&db, &id, Utc::now().timestamp()))
            .await?;
        if !started {
            tracing::info!("Backup {} no longer pending, skipping execution", job_id);
            drop(slot);
            return Ok(());
        }

        let token = CancellationToken::new();
        self.running
            .lock()
            .expect("runner mutex poisoned")
            .insert(job_id.to_string(), token.clone());

        let timeout = Duration::from_secs(self.config.execution_timeout_secs);
        let work = self.process_units(job_id, record.backup_type, &settings, &token);
        let outcome = match tokio::time::timeout(timeout, work).await {
            Ok(Ok(summary)) => Outcome::Completed(summary),
            Ok(Err(failure)) => Outcome::Failed(failure),
            Err(_) => Outcome::TimedOut,
        };

        let now = Utc::now().timestamp();
        let id = job_id.to_string();
        let finalize_result = match outcome {
            Outcome::Completed(summary) => {
                let message = format!(
                    "Backup completed: {} file(s) archived, {} skipped",
                    summary.archived, summary.skipped
                );
                self.with_db(move |db| {
                    store::finalize(&db, &id, BackupStatus::Completed, LogLevel::Info, &message, now)
                })
                .await
            }
            Outcome::Failed(RunFailure::Stopped) => {
                self.with_db(move |db| {
                    store::finalize(
                        &db,
                        &id,
                        BackupStatus::Failed,
                        LogLevel::Error,
                        "Backup stopped by delete request",
                        now,
                    )
                })
                .await
            }
            Outcome::Failed(RunFailure::Unit { path, detail }) => {
                let message = format!("Backup failed on {}: {}", path, detail);
                self.with_db(move |db| {
                    store::finalize(&db, &id, BackupStatus::Failed, LogLevel::Error, &message, now)
                })
                .await
            }
            Outcome::TimedOut => {
                let message = format!(
                    "Backup timed out after {}s",
                    self.config.execution_timeout_secs
                );
                self.with_db(move |db| {
                    store::finalize(&db, &id, BackupStatus::Failed, LogLevel::Error, &message, now)
                })
                .await
            }
        };

        // Slot release and registry cleanup happen on every path
        self.running
            .lock()
            .expect("runner mutex poisoned")
            .remove(job_id);
        drop(slot);

        finalize_result
    }

    async fn process_units(
        &self,
        job_id: &str,
        backup_type: BackupType,
        settings: &BackupSettings,
        token: &CancellationToken,
    ) -> std::result::Result<RunSummary, RunFailure> {
        let data_dir = PathBuf::from(&self.config.data_dir);
        let root = data_dir.clone();
        let units = task::spawn_blocking(move || enumerate_units(&root))
            .await
            .map_err(|e| RunFailure::Unit {
                path: data_dir.display().to_string(),
                detail: e.to_string(),
            })?
            .map_err(|e| RunFailure::Unit {
                path: data_dir.display().to_string(),
                detail: e.to_string(),
            })?;

        // Incremental runs skip units unchanged since the last completed
        // backup, keyed by source checksum
        let prior = if backup_type == BackupType::Incremental {
            self.with_db(|db| store::latest_completed_checksums(&db))
                .await
                .map_err(|e| RunFailure::Unit {
                    path: String::new(),
                    detail: e.to_string(),
                })?
        } else {
            HashMap::new()
        };

        let job_dir = PathBuf::from(&self.config.artifact_dir).join(job_id);
        let mut archived = 0;
        let mut skipped = 0;

        for (rel, abs) in units {
            if token.is_cancelled() {
                return Err(RunFailure::Stopped);
            }
            if settings.is_excluded(&rel) {
                skipped += 1;
                continue;
            }

            let db = self.db.clone();
            let job_id = job_id.to_string();
            let settings = settings.clone();
            let key = self.key;
            let prior_checksum = prior.get(&rel).cloned();
            let rel_path = rel.clone();
            let job_dir = job_dir.clone();
            let produced = task::spawn_blocking(move || {
                produce_unit(
                    &db,
                    &job_id,
                    &rel_path,
                    &abs,
                    &job_dir,
                    &settings,
                    &key,
                    prior_checksum.as_deref(),
                )
            })
            .await;

            match produced {
                Ok(Ok(true)) => archived += 1,
                Ok(Ok(false)) => skipped += 1,
                Ok(Err(e)) => {
                    return Err(RunFailure::Unit {
                        path: rel,
                        detail: e.to_string(),
                    })
                }
                Err(e) => {
                    return Err(RunFailure::Unit {
                        path: rel,
                        detail: e.to_string(),
                    })
                }
            }
        }

        Ok(RunSummary { archived, skipped })
    }

    async fn with_db<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Db) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        task::spawn_blocking(move || f(db)).await?
    }
}

/// Walk the data directory and return (relative path, absolute path)
/// pairs in a stable order
fn enumerate_units(root: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut units = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
            } else {
                let rel = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                units.push((rel, path));
            }
        }
    }
    units.sort();
    Ok(units)
}

/// Archive one unit: read, checksum, compress, optionally encrypt, write
/// the artifact, and record its row
///
/// Returns Ok(false) when the unit is skipped as unchanged.
#[allow(clippy::too_many_arguments)]
fn produce_unit(
    db: &Db,
    job_id: &str,
    rel: &str,
    abs: &Path,
    job_dir: &Path,
    settings: &BackupSettings,
    key: &[u8; 32],
    prior_checksum: Option<&str>,
) -> Result<bool> {
    let data = std::fs::read(abs)?;
    let sum = artifact::checksum(&data);
    if prior_checksum == Some(sum.as_str()) {
        return Ok(false);
    }

    let compressed = artifact::compress(&data, settings.compression)?;
    let bytes = if settings.encryption {
        artifact::encrypt(&compressed, key)?
    } else {
        compressed
    };

    let artifact_name = if settings.encryption {
        format!("{}.zst.enc", rel)
    } else {
        format!("{}.zst", rel)
    };
    let out_path = job_dir.join(artifact_name);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&out_path, &bytes)?;

    store::record_file(
        db,
        job_id,
        &BackupFileRecord {
            path: rel.to_string(),
            size: bytes.len() as u64,
            checksum: sum,
            encrypted: settings.encryption,
        },
    )?;
    Ok(true)
}
