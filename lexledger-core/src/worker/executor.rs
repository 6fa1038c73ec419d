use chrono::NaiveDate;
use tracing::{error, info};
use uuid::Uuid;

use crate::ledger::Ledger;

/// What one worker run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub overdue_marked: usize,
    pub packs_generated: usize,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        self.overdue_marked == 0 && self.packs_generated == 0
    }
}

/// Runs the billing jobs for one day.
#[derive(Clone)]
pub struct JobExecutor {
    ledger: Ledger,

    /// Acting user recorded on generated packs
    system_user_id: Uuid,
}

impl JobExecutor {
    pub fn new(ledger: Ledger, system_user_id: Uuid) -> Self {
        Self {
            ledger,
            system_user_id,
        }
    }

    /// Runs both jobs for `today`. A failing job is logged and does not stop
    /// the other one.
    pub async fn run(&self, today: NaiveDate) -> RunSummary {
        let overdue_marked = match self.ledger.invoices.mark_overdue(today).await {
            Ok(invoices) => {
                for invoice in &invoices {
                    info!(
                        invoice_number = %invoice.invoice_number,
                        due_date = %invoice.due_date,
                        "Invoice marked overdue"
                    );
                }
                invoices.len()
            }
            Err(e) => {
                error!("Overdue sweep failed: {}", e);
                0
            }
        };

        let packs_generated = match self
            .ledger
            .billing_packs
            .auto_generate(today, self.system_user_id)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!("Billing pack auto-generation failed: {}", e);
                0
            }
        };

        RunSummary {
            overdue_marked,
            packs_generated,
        }
    }
}
