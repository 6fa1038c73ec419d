use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment applied against a single invoice.
///
/// Maps to the `invoice_payments` table. Every insert, amount change and
/// delete of a payment is mirrored onto the parent invoice's `amount_paid`
/// inside the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    /// Unique identifier for the payment
    pub id: Uuid,

    /// Invoice this payment settles (immutable)
    pub invoice_id: Uuid,

    /// Amount received, always positive
    pub amount: Decimal,

    /// Date the money was received
    pub payment_date: NaiveDate,

    /// EFT, card, cash, ...
    pub payment_method: Option<String>,

    /// Bank or remittance reference
    pub reference: Option<String>,

    pub notes: Option<String>,

    /// User who captured the payment
    pub recorded_by: Uuid,

    pub created_at: DateTime<Utc>,
}

/// Payment creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPayment {
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Partial payment update. The invoice a payment belongs to cannot change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePayment {
    pub amount: Option<Decimal>,
    pub payment_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl UpdatePayment {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.payment_date.is_none()
            && self.payment_method.is_none()
            && self.reference.is_none()
            && self.notes.is_none()
    }
}

/// Firm-wide payment figures over an optional date range.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentStats {
    pub total_payments: i64,
    pub total_amount: Decimal,
    pub invoices_with_payments: i64,
    pub payment_days: i64,
}
