//! Tag-reconciliation core for the Rust RFID reader platform.
//!
//! The modules cover identifier normalization, the persisted name table,
//! the assignment workflow, and the polling loop that turns raw radio
//! detections into unassigned-tag and present/missing views.

pub mod prelude;
pub mod processing;
pub mod store;
pub mod tag_interface;
pub mod telemetry;

pub use prelude::{ReconError, ReconResult, ReconciliationView, ScanConfig};
