use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Billing pack status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum BillingPackStatus {
    #[sqlx(rename = "draft")]
    Draft,
    #[sqlx(rename = "generated")]
    Generated,
    #[sqlx(rename = "sent")]
    Sent,
    #[sqlx(rename = "approved")]
    Approved,
}

impl fmt::Display for BillingPackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingPackStatus::Draft => write!(f, "draft"),
            BillingPackStatus::Generated => write!(f, "generated"),
            BillingPackStatus::Sent => write!(f, "sent"),
            BillingPackStatus::Approved => write!(f, "approved"),
        }
    }
}

/// A batch of approved, unbilled time entries for one client and period.
///
/// Maps to the `billing_packs` table; the entries themselves are referenced
/// through `billing_pack_entries`. The three totals are recomputed from the
/// joined entries whenever join rows change.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingPack {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub client_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: BillingPackStatus,
    pub total_time_entries: i32,
    pub total_hours: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub generated_by: Option<Uuid>,
    pub generated_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create or generate a pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBillingPack {
    pub client_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub notes: Option<String>,
}

/// Result of approving a pack. `invoice_id` is set when a draft invoice was
/// seeded from the pack in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackApproval {
    pub pack: BillingPack,
    pub billed_entries: u64,
    pub invoice_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingPackFilter {
    pub client_id: Option<Uuid>,
    pub status: Option<BillingPackStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingPackStats {
    pub total_packs: i64,
    pub draft_packs: i64,
    pub generated_packs: i64,
    pub sent_packs: i64,
    pub approved_packs: i64,
    pub total_amount: Decimal,
    pub approved_amount: Decimal,
    pub total_hours: Decimal,
}
