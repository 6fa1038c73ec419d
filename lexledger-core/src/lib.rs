//! LexLedger core: the billing ledger of a multi-tenant legal practice
//! backend, with its HTTP adapter and background worker.

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod telemetry;
pub mod worker;

pub use error::{LedgerError, LedgerResult, TransitionError};
pub use ledger::{Ledger, LedgerSettings};
