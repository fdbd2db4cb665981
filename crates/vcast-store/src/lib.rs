//! Durable JSON snapshot store for job records.
//!
//! This crate provides:
//! - Write-through persistence of the full job set
//! - Load-on-init with restart recovery (processing jobs reset to pending)
//! - Corrupt-snapshot tolerance (loads empty, never fatal)

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{JobStore, StatusCounts};
