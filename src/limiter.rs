//! Admission control bounding how many jobs of one settings profile run
//! at the same time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// An execution slot held for the lifetime of one job run
///
/// Dropping the slot releases it and wakes the next queued admission, so a
/// slot can never leak past the scope that owns it.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// Per-profile FIFO admission over `tokio::sync::Semaphore`
///
/// The limiter holds no timers and no job state, only permit counts and
/// the semaphores' wait queues; watchdog duties live in the runner.
#[derive(Debug, Default)]
pub struct ConcurrencyLimiter {
    profiles: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ConcurrencyLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a slot for the given settings profile, suspending FIFO
    /// behind earlier admissions when the profile is at capacity
    ///
    /// The semaphore is sized from `max_concurrent` the first time a
    /// profile is seen; all jobs sharing a profile share its settings, so
    /// they agree on the bound.
    pub async fn admit(&self, profile: &str, max_concurrent: u32) -> Slot {
        let semaphore = {
            let mut profiles = self.profiles.lock().expect("limiter mutex poisoned");
            profiles
                .entry(profile.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(max_concurrent.max(1) as usize)))
                .clone()
        };

        let permit = semaphore
            .acquire_owned()
            .await
            .expect("limiter semaphore closed");
        Slot { _permit: permit }
    }
}
