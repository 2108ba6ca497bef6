use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lexvault_backup_server::routes::{
    create_backup, delete_backup, delete_schedule, health_check, list_backups, list_schedules,
    upsert_schedule,
};
use lexvault_backup_server::{open_database, scheduler, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lexvault_backup_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LexVault Backup Server...");

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "Environment: {}, Server: {}",
        config.environment,
        config.server_address()
    );

    // Open the embedded database
    let db = open_database(&config.database_path)?;

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origins
                .iter()
                .map(|s| s.parse().unwrap())
                .collect::<Vec<_>>(),
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    // Create app state
    let state = AppState::new(db.clone(), config.clone());

    // Start the scheduler tick loop
    tokio::spawn(scheduler::run_loop(
        db,
        state.runner.clone(),
        config.tick_interval_secs,
    ));

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/admin/backup",
            get(list_backups).post(create_backup).delete(delete_backup),
        )
        .route(
            "/admin/backup/schedule",
            get(list_schedules)
                .post(upsert_schedule)
                .delete(delete_schedule),
        )
        .layer(cors)
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
