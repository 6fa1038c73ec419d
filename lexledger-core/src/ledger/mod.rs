//! Billing ledger engine.
//!
//! Every mutating operation opens one Postgres transaction, takes row locks
//! on the rows it reads before writing, recomputes derived columns in Rust
//! and commits. An early return with an error drops the transaction, which
//! rolls it back.

pub mod billing_packs;
pub mod invoice_number;
pub mod invoices;
pub mod payments;
pub mod state_machine;
pub mod time_entries;
pub mod totals;

#[cfg(test)]
mod tests;

pub use billing_packs::BillingPackGenerator;
pub use invoices::InvoiceService;
pub use payments::PaymentLedger;
pub use time_entries::TimeEntryService;

use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;

use crate::audit::AuditSink;

/// Tunables shared by the ledger services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// VAT rate applied to new invoices that do not name one
    pub default_vat_rate: Decimal,

    /// Days between issue date and default due date
    pub payment_terms_days: i64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            default_vat_rate: Decimal::new(15, 2),
            payment_terms_days: 30,
        }
    }
}

/// All ledger services over one pool and audit sink.
#[derive(Clone)]
pub struct Ledger {
    pub time_entries: TimeEntryService,
    pub invoices: InvoiceService,
    pub payments: PaymentLedger,
    pub billing_packs: BillingPackGenerator,
}

impl Ledger {
    pub fn new(pool: PgPool, audit: Arc<dyn AuditSink>, settings: LedgerSettings) -> Self {
        let invoices = InvoiceService::new(pool.clone(), audit.clone(), settings);
        Self {
            time_entries: TimeEntryService::new(pool.clone(), audit.clone()),
            payments: PaymentLedger::new(pool.clone(), audit.clone()),
            billing_packs: BillingPackGenerator::new(pool, audit, invoices.clone()),
            invoices,
        }
    }
}

const MAX_PAGE_SIZE: i64 = 200;

/// Converts 1-based `page`/`limit` query values into `(LIMIT, OFFSET)`.
///
/// The offset saturates, so a page past the end yields an empty result.
pub(crate) fn page_window(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> (i64, i64) {
    let limit = limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
    let page = page.unwrap_or(1).max(1);
    (limit, (page - 1).saturating_mul(limit))
}
