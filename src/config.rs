use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_path: String,
    pub data_dir: String,
    pub artifact_dir: String,
    pub allowed_origins: Vec<String>,
    pub execution_timeout_secs: u64,
    pub delete_stop_wait_secs: u64,
    pub tick_interval_secs: u64,
    pub environment: String,
    pub backup_secret_key: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/lexvault-backups.db".to_string());

        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "./data/documents".to_string());

        let artifact_dir =
            env::var("ARTIFACT_DIR").unwrap_or_else(|_| "./data/artifacts".to_string());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let execution_timeout_secs = env::var("EXECUTION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .map_err(|_| "Invalid EXECUTION_TIMEOUT_SECS")?;

        let delete_stop_wait_secs = env::var("DELETE_STOP_WAIT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| "Invalid DELETE_STOP_WAIT_SECS")?;

        let tick_interval_secs = env::var("TICK_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| "Invalid TICK_INTERVAL_SECS")?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let backup_secret_key = env::var("BACKUP_SECRET_KEY")
            .map_err(|_| "BACKUP_SECRET_KEY must be set for artifact encryption")?;

        Ok(Config {
            server_host,
            server_port,
            database_path,
            data_dir,
            artifact_dir,
            allowed_origins,
            execution_timeout_secs,
            delete_stop_wait_secs,
            tick_interval_secs,
            environment,
            backup_secret_key,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
