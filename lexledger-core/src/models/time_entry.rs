use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::ledger::state_machine::TimeEntryState;

/// A recorded unit of work.
///
/// Maps to the `time_entries` table. `amount` is derived from
/// `duration_minutes` and `hourly_rate` on every write.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TimeEntry {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub matter_id: Option<Uuid>,

    /// Fee earner who did the work
    pub user_id: Uuid,

    pub entry_date: NaiveDate,
    pub duration_minutes: i32,
    pub hourly_rate: Decimal,

    /// `round2(duration_minutes / 60 * hourly_rate)`
    pub amount: Decimal,

    pub description: String,
    pub billable: bool,

    /// Only ever set by billing pack approval
    pub billed: bool,

    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeEntry {
    /// Billing state derived from the approval and billed columns.
    pub fn state(&self) -> TimeEntryState {
        TimeEntryState::from_columns(self.approved_by.is_some(), self.billed)
    }
}

/// Time entry creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTimeEntry {
    pub matter_id: Option<Uuid>,
    pub entry_date: NaiveDate,
    pub duration_minutes: i32,
    pub hourly_rate: Decimal,
    pub description: String,
    pub billable: Option<bool>,
}

/// Time entry update request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTimeEntry {
    pub matter_id: Option<Uuid>,
    pub entry_date: Option<NaiveDate>,
    pub duration_minutes: Option<i32>,
    pub hourly_rate: Option<Decimal>,
    pub description: Option<String>,
    pub billable: Option<bool>,
}

/// Filters accepted by the time entry listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeEntryFilter {
    pub matter_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub billable: Option<bool>,
    pub billed: Option<bool>,
    pub approved: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TimeEntryStats {
    pub total_entries: i64,
    pub approved_entries: i64,
    pub billed_entries: i64,
    pub unbilled_entries: i64,
    pub total_minutes: i64,
    pub unbilled_minutes: i64,
    pub total_amount: Decimal,
    pub billed_amount: Decimal,
    pub unbilled_amount: Decimal,
}
