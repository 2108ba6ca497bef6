//! Scheduler: periodically fires due schedules into new backup jobs.
//!
//! The scheduler keeps no in-process state; the persisted next_run_at per
//! schedule row is the whole of it, which makes the service restart-safe.
//! `tick` takes "now" as a parameter so tests can drive it with synthetic
//! clocks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task;

use crate::db::Db;
use crate::error::Result;
use crate::runner::Runner;
use crate::store;

/// Drive the tick on a fixed interval until the process exits
///
/// A failing tick is logged and retried on the next interval; armed
/// schedules stay armed because only a successful claim rewrites them.
pub async fn run_loop(db: Db, runner: Arc<Runner>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!("Scheduler running with {}s tick interval", interval_secs);
    loop {
        interval.tick().await;
        match tick(&db, &runner, Utc::now().timestamp()).await {
            Ok(0) => {}
            Ok(started) => tracing::info!("Scheduler tick started {} backup(s)", started),
            Err(e) => tracing::error!("Scheduler tick failed: {}", e),
        }
    }
}

/// One scheduling pass: claim every due schedule and start its job
///
/// Each claim is a compare-and-set on the schedule's observed next_run_at
/// inside its own write transaction, so an overlapping tick loses the race
/// cleanly instead of double-firing. Returns how many jobs were started.
pub async fn tick(db: &Db, runner: &Arc<Runner>, now: i64) -> Result<usize> {
    let db_read = db.clone();
    let due = task::spawn_blocking(move || store::due_schedules(&db_read, now)).await??;

    let mut started = 0;
    for (settings_id, expected_due) in due {
        let db_claim = db.clone();
        let id = settings_id.clone();
        let claimed = task::spawn_blocking(move || {
            store::claim_due_schedule(&db_claim, &id, expected_due, now)
        })
        .await;

        match claimed {
            Ok(Ok(Some(backup))) => {
                tracing::info!(
                    "Schedule {} fired, created backup {}",
                    settings_id,
                    backup.id
                );
                tokio::spawn(runner.clone().execute(backup.id));
                started += 1;
            }
            Ok(Ok(None)) => {
                // Claimed by a concurrent tick, or disarmed meanwhile
            }
            Ok(Err(e)) => {
                tracing::error!("Failed to fire schedule {}: {}", settings_id, e);
            }
            Err(e) => {
                tracing::error!("Schedule {} claim task panicked: {}", settings_id, e);
            }
        }
    }
    Ok(started)
}
