use dotenv::dotenv;
use lexledger_core::audit::PgAuditSink;
use lexledger_core::config::Config;
use lexledger_core::db;
use lexledger_core::ledger::Ledger;
use lexledger_core::telemetry;
use lexledger_core::worker::{JobExecutor, JobScheduler};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// Worker binary entry point for the billing jobs.
///
/// This binary runs as a background worker that:
/// - Marks sent and viewed invoices past their due date as overdue
/// - Generates last month's billing pack for clients whose billing day is today
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();
    telemetry::init_tracing();

    info!("Starting LexLedger Billing Worker...");

    let config = Config::from_env()?;
    let db_pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    if config.run_migrations {
        db::run_migrations(&db_pool).await?;
    }

    let ledger = Ledger::new(
        db_pool.clone(),
        Arc::new(PgAuditSink::new(db_pool)),
        config.ledger,
    );
    let executor = JobExecutor::new(ledger, config.system_user_id);
    let mut scheduler = JobScheduler::new(executor, Some(config.worker_poll_interval_seconds));
    let running = scheduler.running_flag();

    // Spawn the scheduler in a task
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            tracing::error!("Scheduler error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            *running.write().await = false;
        }
        _ = scheduler_handle => {
            info!("Scheduler task completed");
        }
    }

    info!("LexLedger Billing Worker stopped");
    Ok(())
}
