use thiserror::Error;
use uuid::Uuid;

use crate::models::{BillingPackStatus, InvoiceStatus};

/// A state transition that the billing rules refuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("time entry is already approved")]
    AlreadyApproved,

    #[error("time entry is not approved")]
    NotApproved,

    #[error("billed time entries cannot be unapproved")]
    CannotUnapproveBilled,

    #[error("approved time entries cannot be modified")]
    CannotModifyApproved,

    #[error("billed time entries cannot be modified")]
    CannotModifyBilled,

    #[error("time entry {0} cannot be billed: it is unapproved or already billed")]
    NotBillable(Uuid),

    #[error("invoice is {0}; line items can only change while draft")]
    InvoiceNotEditable(InvoiceStatus),

    #[error("invoice is {0}; payments can only be recorded against issued invoices")]
    InvoiceNotPayable(InvoiceStatus),

    #[error("billing pack is {0} and cannot be deleted")]
    PackNotDeletable(BillingPackStatus),

    #[error("billing pack is {0}; entries can only change while draft")]
    PackNotEditable(BillingPackStatus),

    #[error("billing pack is already approved")]
    PackAlreadyApproved,
}

/// Errors surfaced by ledger operations.
///
/// Any error returned from inside a ledger transaction means the transaction
/// was dropped without commit, so none of its writes are visible.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("invalid state: {0}")]
    InvalidState(#[from] TransitionError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transaction failed: {0}")]
    Transaction(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        LedgerError::NotFound { entity, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
