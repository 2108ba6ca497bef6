//! LexVault Backup Orchestration Service Library
//!
//! This module exports the core types and functions for testing and reuse.

pub mod artifact;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod limiter;
pub mod models;
pub mod routes;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use config::Config;
pub use db::{open_database, Db};
pub use error::{AppError, Result};

use std::sync::Arc;

use runner::Runner;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Config,
    pub runner: Arc<Runner>,
}

impl AppState {
    /// Create a new AppState with the given database and configuration
    pub fn new(db: Db, config: Config) -> Self {
        let runner = Runner::new(db.clone(), config.clone());
        Self { db, config, runner }
    }
}
