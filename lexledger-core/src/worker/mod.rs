//! Background billing jobs: the overdue sweep and scheduled pack generation.

pub mod executor;
pub mod scheduler;

pub use executor::{JobExecutor, RunSummary};
pub use scheduler::JobScheduler;
