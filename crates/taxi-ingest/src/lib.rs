//! Taxi Ingest Library
//!
//! Streaming ingestion of delimited taxi trip files into PostgreSQL.
//!
//! # Components
//!
//! - **Reader**: validates the header, then streams normalized [`TripRecord`]s
//! - **Duplicate sink**: audit file for records repeated within a run
//! - **Bulk loader**: `COPY`-based batch commits
//! - **Pipeline**: dedup, batching and per-batch failure policy
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use taxi_ingest::{create_pool, CsvDuplicateSink, IngestConfig, IngestPipeline, PgBulkLoader, TripReader};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let path = Path::new("./data/yellow_tripdata.csv");
//!
//!     let reader = TripReader::new(config.reference_tz()?);
//!     reader.validate(path).await?;
//!
//!     let loader = PgBulkLoader::new(create_pool(&config.database).await?, &config.table);
//!     let sink = CsvDuplicateSink::create(&config.duplicates_path).await?;
//!
//!     let summary = IngestPipeline::new(reader, loader, sink)
//!         .run(path, config.batch_size, config.convert_to_utc, CancellationToken::new())
//!         .await?;
//!     println!("committed {} rows", summary.rows_committed);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

mod codec;

pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod reader;
pub mod sink;

pub use config::{DatabaseConfig, IngestConfig};
pub use error::IngestError;
pub use loader::{create_pool, BulkLoader, LoadError, PgBulkLoader};
pub use pipeline::{IngestPipeline, RunSummary};
pub use reader::{FormatError, TripReader, TripStream};
pub use sink::{CsvDuplicateSink, DuplicateSink, SinkError};
pub use taxi_common::{DedupKey, TripRecord};
