pub mod billing_pack;
pub mod invoice;
pub mod payment;
pub mod time_entry;

pub use billing_pack::{BillingPack, BillingPackStatus};
pub use invoice::{Invoice, InvoiceStatus, LineItem};
pub use payment::Payment;
pub use time_entry::TimeEntry;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated caller on whose behalf a ledger operation runs.
///
/// Tenant scoping and ownership checks happen before the ledger is called;
/// every query filters on `firm_id` so an id from another firm reads as
/// not found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub firm_id: Uuid,
    pub user_id: Uuid,
}

impl Actor {
    pub fn new(firm_id: Uuid, user_id: Uuid) -> Self {
        Self { firm_id, user_id }
    }
}
