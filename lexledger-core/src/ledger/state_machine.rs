use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::TransitionError;
use crate::models::{BillingPackStatus, InvoiceStatus};

/// Balance at or below which an invoice counts as settled (rounding slack).
pub const SETTLEMENT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Billing state of a time entry, derived from `approved_by` and `billed`.
///
/// The state machine only moves forward through:
/// - Unapproved: freshly recorded, editable and deletable
/// - Approved: locked against edits, eligible for billing packs
/// - Billed: included in an approved billing pack (terminal)
///
/// Approved can fall back to Unapproved; nothing leaves Billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeEntryState {
    Unapproved,
    Approved,
    Billed,
}

impl fmt::Display for TimeEntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeEntryState::Unapproved => write!(f, "unapproved"),
            TimeEntryState::Approved => write!(f, "approved"),
            TimeEntryState::Billed => write!(f, "billed"),
        }
    }
}

impl TimeEntryState {
    pub fn from_columns(approved: bool, billed: bool) -> Self {
        match (approved, billed) {
            (_, true) => TimeEntryState::Billed,
            (true, false) => TimeEntryState::Approved,
            (false, false) => TimeEntryState::Unapproved,
        }
    }

    /// Every entry starts here.
    pub fn initial_state() -> Self {
        TimeEntryState::Unapproved
    }

    pub fn approve(self) -> Result<Self, TransitionError> {
        match self {
            TimeEntryState::Unapproved => Ok(TimeEntryState::Approved),
            TimeEntryState::Approved | TimeEntryState::Billed => {
                Err(TransitionError::AlreadyApproved)
            }
        }
    }

    pub fn unapprove(self) -> Result<Self, TransitionError> {
        match self {
            TimeEntryState::Approved => Ok(TimeEntryState::Unapproved),
            TimeEntryState::Billed => Err(TransitionError::CannotUnapproveBilled),
            TimeEntryState::Unapproved => Err(TransitionError::NotApproved),
        }
    }

    /// Guard shared by update and delete.
    pub fn ensure_mutable(self) -> Result<(), TransitionError> {
        match self {
            TimeEntryState::Unapproved => Ok(()),
            TimeEntryState::Approved => Err(TransitionError::CannotModifyApproved),
            TimeEntryState::Billed => Err(TransitionError::CannotModifyBilled),
        }
    }

    /// Approved -> Billed. Only reachable through billing pack approval.
    pub(crate) fn bill(self, entry_id: Uuid) -> Result<Self, TransitionError> {
        match self {
            TimeEntryState::Approved => Ok(TimeEntryState::Billed),
            TimeEntryState::Unapproved | TimeEntryState::Billed => {
                Err(TransitionError::NotBillable(entry_id))
            }
        }
    }
}

/// What to do with `paid_date` after re-evaluating an invoice's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidDateAction {
    Set,
    Clear,
    Keep,
}

/// Invoice status after a payment mutation, as a pure function of the status
/// before the mutation and the balance after it.
///
/// - Sent/Viewed/Overdue -> Paid once the balance is within the epsilon
/// - Paid -> Sent when the balance becomes positive again
/// - Draft and Cancelled never move here
pub fn settle_invoice_status(
    previous: InvoiceStatus,
    balance_due: Decimal,
) -> (InvoiceStatus, PaidDateAction) {
    let settled = balance_due <= SETTLEMENT_EPSILON;
    match previous {
        InvoiceStatus::Draft | InvoiceStatus::Cancelled => (previous, PaidDateAction::Keep),
        InvoiceStatus::Paid if settled => (InvoiceStatus::Paid, PaidDateAction::Keep),
        InvoiceStatus::Paid => (InvoiceStatus::Sent, PaidDateAction::Clear),
        InvoiceStatus::Sent | InvoiceStatus::Viewed | InvoiceStatus::Overdue if settled => {
            (InvoiceStatus::Paid, PaidDateAction::Set)
        }
        InvoiceStatus::Sent | InvoiceStatus::Viewed | InvoiceStatus::Overdue => {
            (previous, PaidDateAction::Keep)
        }
    }
}

/// `Some(Sent)` for a draft invoice; `None` means the send is a no-op.
///
/// Sending an invoice that is already past draft succeeds without touching
/// it, so a retried send is harmless.
pub fn send_invoice_transition(current: InvoiceStatus) -> Option<InvoiceStatus> {
    match current {
        InvoiceStatus::Draft => Some(InvoiceStatus::Sent),
        _ => None,
    }
}

/// `Some(Viewed)` for a sent invoice; `None` otherwise (no-op).
pub fn view_invoice_transition(current: InvoiceStatus) -> Option<InvoiceStatus> {
    match current {
        InvoiceStatus::Sent => Some(InvoiceStatus::Viewed),
        _ => None,
    }
}

pub fn ensure_invoice_editable(current: InvoiceStatus) -> Result<(), TransitionError> {
    match current {
        InvoiceStatus::Draft => Ok(()),
        other => Err(TransitionError::InvoiceNotEditable(other)),
    }
}

/// Payments need an issued invoice. Paid invoices pass this guard and are
/// then rejected by the balance check.
pub fn ensure_invoice_payable(current: InvoiceStatus) -> Result<(), TransitionError> {
    match current {
        InvoiceStatus::Sent
        | InvoiceStatus::Viewed
        | InvoiceStatus::Overdue
        | InvoiceStatus::Paid => Ok(()),
        other => Err(TransitionError::InvoiceNotPayable(other)),
    }
}

pub fn ensure_pack_deletable(current: BillingPackStatus) -> Result<(), TransitionError> {
    match current {
        BillingPackStatus::Draft | BillingPackStatus::Generated => Ok(()),
        other => Err(TransitionError::PackNotDeletable(other)),
    }
}

pub fn ensure_pack_editable(current: BillingPackStatus) -> Result<(), TransitionError> {
    match current {
        BillingPackStatus::Draft | BillingPackStatus::Generated => Ok(()),
        other => Err(TransitionError::PackNotEditable(other)),
    }
}

/// `Ok(None)` when the pack is already sent.
pub fn send_pack_transition(
    current: BillingPackStatus,
) -> Result<Option<BillingPackStatus>, TransitionError> {
    match current {
        BillingPackStatus::Draft | BillingPackStatus::Generated => {
            Ok(Some(BillingPackStatus::Sent))
        }
        BillingPackStatus::Sent => Ok(None),
        BillingPackStatus::Approved => Err(TransitionError::PackAlreadyApproved),
    }
}

/// `None` when the pack is already approved; approval is never repeated.
pub fn approve_pack_transition(current: BillingPackStatus) -> Option<BillingPackStatus> {
    match current {
        BillingPackStatus::Approved => None,
        _ => Some(BillingPackStatus::Approved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_time_entry_happy_path() {
        let state = TimeEntryState::initial_state();
        let state = state.approve().unwrap();
        assert_eq!(state, TimeEntryState::Approved);
        let state = state.bill(Uuid::nil()).unwrap();
        assert_eq!(state, TimeEntryState::Billed);
    }

    #[test]
    fn test_time_entry_double_approve() {
        assert_eq!(
            TimeEntryState::Approved.approve(),
            Err(TransitionError::AlreadyApproved)
        );
        assert_eq!(
            TimeEntryState::Billed.approve(),
            Err(TransitionError::AlreadyApproved)
        );
    }

    #[test]
    fn test_billed_entry_cannot_be_unapproved() {
        assert_eq!(
            TimeEntryState::Billed.unapprove(),
            Err(TransitionError::CannotUnapproveBilled)
        );
        assert_eq!(
            TimeEntryState::Approved.unapprove(),
            Ok(TimeEntryState::Unapproved)
        );
        assert_eq!(
            TimeEntryState::Unapproved.unapprove(),
            Err(TransitionError::NotApproved)
        );
    }

    #[test]
    fn test_only_unapproved_entries_are_mutable() {
        assert!(TimeEntryState::Unapproved.ensure_mutable().is_ok());
        assert_eq!(
            TimeEntryState::Approved.ensure_mutable(),
            Err(TransitionError::CannotModifyApproved)
        );
        assert_eq!(
            TimeEntryState::Billed.ensure_mutable(),
            Err(TransitionError::CannotModifyBilled)
        );
    }

    #[test]
    fn test_unapproved_entry_cannot_be_billed() {
        let id = Uuid::new_v4();
        assert_eq!(
            TimeEntryState::Unapproved.bill(id),
            Err(TransitionError::NotBillable(id))
        );
        assert_eq!(
            TimeEntryState::Billed.bill(id),
            Err(TransitionError::NotBillable(id))
        );
    }

    #[test]
    fn test_billed_column_wins_over_approval() {
        assert_eq!(TimeEntryState::from_columns(false, false), TimeEntryState::Unapproved);
        assert_eq!(TimeEntryState::from_columns(true, false), TimeEntryState::Approved);
        assert_eq!(TimeEntryState::from_columns(true, true), TimeEntryState::Billed);
    }

    #[test]
    fn test_full_payment_settles_sent_invoice() {
        let (status, paid_date) = settle_invoice_status(InvoiceStatus::Sent, Decimal::ZERO);
        assert_eq!(status, InvoiceStatus::Paid);
        assert_eq!(paid_date, PaidDateAction::Set);
    }

    #[test]
    fn test_rounding_slack_counts_as_settled() {
        let (status, _) = settle_invoice_status(InvoiceStatus::Overdue, dec!(0.01));
        assert_eq!(status, InvoiceStatus::Paid);

        let (status, _) = settle_invoice_status(InvoiceStatus::Viewed, dec!(0.02));
        assert_eq!(status, InvoiceStatus::Viewed);
    }

    #[test]
    fn test_reversed_payment_reopens_paid_invoice() {
        let (status, paid_date) = settle_invoice_status(InvoiceStatus::Paid, dec!(1667.50));
        assert_eq!(status, InvoiceStatus::Sent);
        assert_eq!(paid_date, PaidDateAction::Clear);
    }

    #[test]
    fn test_paid_invoice_stays_paid_when_still_settled() {
        let (status, paid_date) = settle_invoice_status(InvoiceStatus::Paid, Decimal::ZERO);
        assert_eq!(status, InvoiceStatus::Paid);
        assert_eq!(paid_date, PaidDateAction::Keep);
    }

    #[test]
    fn test_cancelled_and_draft_never_settle() {
        for status in [InvoiceStatus::Draft, InvoiceStatus::Cancelled] {
            assert_eq!(
                settle_invoice_status(status, Decimal::ZERO),
                (status, PaidDateAction::Keep)
            );
        }
    }

    #[test]
    fn test_send_is_noop_outside_draft() {
        assert_eq!(
            send_invoice_transition(InvoiceStatus::Draft),
            Some(InvoiceStatus::Sent)
        );
        assert_eq!(send_invoice_transition(InvoiceStatus::Sent), None);
        assert_eq!(send_invoice_transition(InvoiceStatus::Paid), None);
        assert_eq!(view_invoice_transition(InvoiceStatus::Sent), Some(InvoiceStatus::Viewed));
        assert_eq!(view_invoice_transition(InvoiceStatus::Draft), None);
    }

    #[test]
    fn test_draft_invoice_is_not_payable() {
        assert_eq!(
            ensure_invoice_payable(InvoiceStatus::Draft),
            Err(TransitionError::InvoiceNotPayable(InvoiceStatus::Draft))
        );
        assert!(ensure_invoice_payable(InvoiceStatus::Sent).is_ok());
    }

    #[test]
    fn test_line_items_locked_after_send() {
        assert!(ensure_invoice_editable(InvoiceStatus::Draft).is_ok());
        assert_eq!(
            ensure_invoice_editable(InvoiceStatus::Sent),
            Err(TransitionError::InvoiceNotEditable(InvoiceStatus::Sent))
        );
    }

    #[test]
    fn test_pack_delete_guard() {
        assert!(ensure_pack_deletable(BillingPackStatus::Draft).is_ok());
        assert!(ensure_pack_deletable(BillingPackStatus::Generated).is_ok());
        assert_eq!(
            ensure_pack_deletable(BillingPackStatus::Sent),
            Err(TransitionError::PackNotDeletable(BillingPackStatus::Sent))
        );
        assert_eq!(
            ensure_pack_deletable(BillingPackStatus::Approved),
            Err(TransitionError::PackNotDeletable(BillingPackStatus::Approved))
        );
    }

    #[test]
    fn test_pack_send_and_approve_transitions() {
        assert_eq!(
            send_pack_transition(BillingPackStatus::Generated),
            Ok(Some(BillingPackStatus::Sent))
        );
        assert_eq!(send_pack_transition(BillingPackStatus::Sent), Ok(None));
        assert_eq!(
            send_pack_transition(BillingPackStatus::Approved),
            Err(TransitionError::PackAlreadyApproved)
        );
        assert_eq!(
            approve_pack_transition(BillingPackStatus::Sent),
            Some(BillingPackStatus::Approved)
        );
        assert_eq!(approve_pack_transition(BillingPackStatus::Approved), None);
    }
}
