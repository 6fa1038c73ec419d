use dotenv::dotenv;
use lexledger_core::api::{create_router, AppState};
use lexledger_core::audit::PgAuditSink;
use lexledger_core::config::Config;
use lexledger_core::db;
use lexledger_core::ledger::Ledger;
use lexledger_core::telemetry;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();
    telemetry::init_tracing();

    info!("Starting LexLedger Core Server...");

    let config = Config::from_env()?;

    // Initialize database connection pool
    let db_pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    if config.run_migrations {
        db::run_migrations(&db_pool).await?;
    }

    let ledger = Ledger::new(
        db_pool.clone(),
        Arc::new(PgAuditSink::new(db_pool.clone())),
        config.ledger,
    );

    let address = config.bind_address();
    let app_state = AppState {
        db: db_pool,
        ledger,
        config: Arc::new(config),
    };
    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", address, e))?;

    info!("Server listening on {}", address);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
