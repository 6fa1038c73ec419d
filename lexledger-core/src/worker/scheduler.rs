use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::info;

use crate::worker::executor::JobExecutor;

/// Polling scheduler for the billing jobs.
///
/// Runs the executor once per poll interval until stopped.
pub struct JobScheduler {
    executor: JobExecutor,

    /// Polling interval in seconds
    poll_interval_seconds: u64,

    /// Whether the scheduler is running (wrapped in Arc for sharing)
    running: Arc<RwLock<bool>>,
}

impl JobScheduler {
    /// Creates a new job scheduler.
    ///
    /// # Arguments
    ///
    /// * `executor` - Runs the jobs for a given day
    /// * `poll_interval_seconds` - How often to run (default: 60)
    pub fn new(executor: JobExecutor, poll_interval_seconds: Option<u64>) -> Self {
        Self {
            executor,
            poll_interval_seconds: poll_interval_seconds.unwrap_or(60),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Handle that can stop the loop from another task.
    pub fn running_flag(&self) -> Arc<RwLock<bool>> {
        self.running.clone()
    }

    /// Starts the scheduler loop.
    ///
    /// Runs until the flag from [`JobScheduler::running_flag`] is cleared.
    /// Job failures are logged by the executor and never end the loop.
    pub async fn start(&mut self) -> Result<(), anyhow::Error> {
        *self.running.write().await = true;
        info!(
            "JobScheduler started with poll interval: {} seconds",
            self.poll_interval_seconds
        );

        while *self.running.read().await {
            let summary = self.executor.run(Utc::now().date_naive()).await;
            if !summary.is_empty() {
                info!(
                    overdue_marked = summary.overdue_marked,
                    packs_generated = summary.packs_generated,
                    "Billing jobs completed"
                );
            }

            sleep(Duration::from_secs(self.poll_interval_seconds)).await;
        }

        info!("JobScheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TracingAuditSink;
    use crate::ledger::{Ledger, LedgerSettings};
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    fn unreachable_executor() -> JobExecutor {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://lexledger@127.0.0.1:1/lexledger")
            .unwrap();
        let ledger = Ledger::new(pool, Arc::new(TracingAuditSink), LedgerSettings::default());
        JobExecutor::new(ledger, Uuid::nil())
    }

    #[tokio::test]
    async fn test_clearing_running_flag_ends_loop() {
        let mut scheduler = JobScheduler::new(unreachable_executor(), Some(1));
        let running = scheduler.running_flag();

        let handle = tokio::spawn(async move { scheduler.start().await });
        sleep(Duration::from_millis(200)).await;
        *running.write().await = false;

        let finished = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler should stop after the flag is cleared")
            .unwrap();
        assert!(finished.is_ok());
    }
}
