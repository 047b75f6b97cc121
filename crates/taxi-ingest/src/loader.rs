//! Bulk loading into PostgreSQL
//!
//! Batches are streamed with `COPY ... FROM STDIN` rather than row inserts,
//! so round trips scale with the number of chunks, not the number of rows.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use taxi_common::{TripField, TripRecord};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::codec::{record_fields, RowEncoder, FRACTIONAL_FORMAT};
use crate::config::DatabaseConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Destination column for each field, in canonical order
pub const COLUMN_MAPPING: [(TripField, &str); 9] = [
    (TripField::PickupDatetime, "tpep_pickup_datetime"),
    (TripField::DropoffDatetime, "tpep_dropoff_datetime"),
    (TripField::PassengerCount, "passenger_count"),
    (TripField::TripDistance, "trip_distance"),
    (TripField::StoreAndFwdFlag, "store_and_fwd_flag"),
    (TripField::PuLocationId, "pu_location_id"),
    (TripField::DoLocationId, "do_location_id"),
    (TripField::FareAmount, "fare_amount"),
    (TripField::TipAmount, "tip_amount"),
];

const FLAG_COLUMN: &str = "store_and_fwd_flag";

/// Storage-agnostic failure kinds of a bulk load
#[derive(Error, Debug)]
pub enum LoadError {
    /// The store rejected the batch on a uniqueness constraint
    #[error("Unique constraint violation: {0}")]
    Conflict(#[source] BoxError),

    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Transient(#[source] BoxError),

    #[error("Bulk load failed: {0}")]
    Fatal(#[source] BoxError),

    #[error("Bulk load cancelled")]
    Cancelled,
}

impl LoadError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(boxed(message))
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(boxed(message))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(boxed(message))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LoadError::Conflict(_))
    }
}

fn boxed(message: impl Into<String>) -> BoxError {
    let message: String = message.into();
    message.into()
}

impl From<sqlx::Error> for LoadError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Conflict(Box::new(err))
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Transient(Box::new(err)),
            _ => Self::Fatal(Box::new(err)),
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Fatal(Box::new(err))
    }
}

/// Commits batches of records to the destination store
#[async_trait]
pub trait BulkLoader: Send + Sync {
    /// Insert `records`, splitting them into chunks of at most `batch_size`.
    ///
    /// Returns the number of rows the store reports as inserted. Empty input
    /// returns zero without touching the store.
    async fn bulk_insert(
        &self,
        records: &[TripRecord],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<u64, LoadError>;
}

/// [`BulkLoader`] backed by PostgreSQL `COPY`
#[derive(Debug, Clone)]
pub struct PgBulkLoader {
    pool: PgPool,
    table: String,
}

impl PgBulkLoader {
    /// `table` must already be a validated identifier, optionally schema-qualified
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Empty flags would otherwise load as NULL under `FORMAT csv`
    pub fn copy_statement(&self) -> String {
        let columns: Vec<&str> = COLUMN_MAPPING.iter().map(|(_, column)| *column).collect();
        format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT csv, FORCE_NOT_NULL ({}))",
            self.table,
            columns.join(", "),
            FLAG_COLUMN
        )
    }
}

fn encode_chunk(encoder: &mut RowEncoder, chunk: &[TripRecord]) -> std::io::Result<Vec<u8>> {
    for record in chunk {
        encoder.push(record_fields(record, FRACTIONAL_FORMAT))?;
    }
    encoder.take()
}

#[async_trait]
impl BulkLoader for PgBulkLoader {
    async fn bulk_insert(
        &self,
        records: &[TripRecord],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<u64, LoadError> {
        if records.is_empty() {
            return Ok(0);
        }

        let statement = self.copy_statement();
        let mut encoder = RowEncoder::new();
        let mut conn = self.pool.acquire().await?;
        let mut inserted = 0u64;

        for (chunk_no, chunk) in records.chunks(batch_size.max(1)).enumerate() {
            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }

            let payload = encode_chunk(&mut encoder, chunk)?;
            let mut copy = conn.copy_in_raw(&statement).await?;
            let sent = copy.send(payload).await.map(|_| ());
            if let Err(err) = sent {
                let _ = copy.abort(err.to_string()).await;
                return Err(err.into());
            }
            let rows = copy.finish().await?;
            inserted += rows;

            debug!(
                table = %self.table,
                chunk = chunk_no,
                rows,
                "Copied chunk"
            );
        }

        Ok(inserted)
    }
}

/// Open a connection pool for the loader
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    info!(
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    Ok(pool)
}
