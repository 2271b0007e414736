//! Services module for reconciliation-service.

pub mod analyzer;
pub mod database;
pub mod inference;
pub mod matching;
pub mod metrics;
pub mod recon;

pub use database::{Database, RecordStore};
pub use metrics::{get_metrics, init_metrics};
