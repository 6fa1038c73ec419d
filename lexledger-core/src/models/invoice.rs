use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Invoice status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[sqlx(rename = "draft")]
    Draft,
    #[sqlx(rename = "sent")]
    Sent,
    #[sqlx(rename = "viewed")]
    Viewed,
    #[sqlx(rename = "paid")]
    Paid,
    #[sqlx(rename = "overdue")]
    Overdue,
    #[sqlx(rename = "cancelled")]
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoice header row.
///
/// Maps to the `invoices` table. `subtotal`, `vat_amount`, `total` and
/// `balance_due` are derived columns: they are only ever written by
/// [`crate::ledger::invoices::recalculate_invoice_totals`] or by the payment
/// ledger, never copied from a request body.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    /// Unique identifier for the invoice
    pub id: Uuid,

    /// Owning firm (tenant)
    pub firm_id: Uuid,

    /// `INV-YYYY-NNNN`, unique per firm
    pub invoice_number: String,

    pub client_id: Uuid,
    pub matter_id: Option<Uuid>,

    /// Lifecycle status
    pub status: InvoiceStatus,

    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,

    /// Sum of all line-item amounts
    pub subtotal: Decimal,

    /// Flat VAT rate as a fraction (0.15 = 15%)
    pub vat_rate: Decimal,

    pub vat_amount: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,

    /// `total - amount_paid`
    pub balance_due: Decimal,

    pub notes: Option<String>,
    pub terms: Option<String>,
    pub created_by: Option<Uuid>,

    /// Set when the invoice leaves `draft`
    pub sent_date: Option<DateTime<Utc>>,

    /// Set when the invoice becomes `paid`, cleared when it reopens
    pub paid_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One billable row on an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,

    /// `round2(quantity * unit_price)`
    pub amount: Decimal,

    /// 1-based display position within the invoice
    pub line_order: i32,

    /// Source time entry when the line was seeded from a billing pack
    pub time_entry_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

/// Invoice creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub client_id: Uuid,
    pub matter_id: Option<Uuid>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub vat_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

/// Invoice header update request. Status is not editable here; it only moves
/// through the ledger transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInvoice {
    pub client_id: Option<Uuid>,
    pub matter_id: Option<Uuid>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub vat_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

/// Line item creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Partial line item update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLineItem {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
}

/// Filters accepted by the invoice listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Invoice together with its line items, as returned to API callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub line_items: Vec<LineItem>,
}

/// Firm-wide invoice figures.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceStats {
    pub total_invoices: i64,
    pub draft_count: i64,
    pub sent_count: i64,
    pub paid_count: i64,
    pub overdue_count: i64,
    pub total_value: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
}
