//! Taxi ETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the taxi ETL workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Logging**: Centralised `tracing` subscriber setup
//! - **Types**: The normalized trip record and its deduplication key
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use taxi_common::types::TripRecord;
//!
//! let pickup = NaiveDate::from_ymd_opt(2020, 1, 1)
//!     .and_then(|d| d.and_hms_opt(0, 28, 15))
//!     .unwrap();
//! let trip = TripRecord::builder(pickup, pickup).passenger_count(1).build();
//! assert_eq!(trip.dedup_key(), trip.dedup_key());
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{EtlError, Result};
pub use types::{DedupKey, TripField, TripRecord};
