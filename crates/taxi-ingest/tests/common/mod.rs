//! Shared test utilities

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taxi_ingest::{BulkLoader, LoadError, TripRecord};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

pub const HEADER: &str = "VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,RatecodeID,store_and_fwd_flag,PULocationID,DOLocationID,payment_type,fare_amount,tip_amount";

pub const SINK_HEADER: &str = "pickup_datetime,dropoff_datetime,passenger_count,trip_distance,store_and_fwd_flag,pu_location_id,do_location_id,fare_amount,tip_amount";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,taxi_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// One input row. `minute` picks the pickup minute on 2020-01-01 so rows with
/// different minutes never share a dedup key.
pub fn trip_line(minute: u32, passengers: u32, fare: &str) -> String {
    let hour = minute / 60;
    let minute = minute % 60;
    format!(
        "1,2020-01-01 {hour:02}:{minute:02}:00,2020-01-01 {hour:02}:{minute:02}:30,{passengers},1.5,1,N,238,239,1,{fare},0.5"
    )
}

/// Input file with the canonical header and `lines` as data rows
pub fn input_file(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

/// `count` rows with distinct dedup keys
pub fn unique_lines(count: u32) -> Vec<String> {
    (0..count).map(|minute| trip_line(minute, 1, "6.00")).collect()
}

/// What a [`RecordingLoader`] does on a given call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Commit,
    /// Commit, then cancel the run's token
    CommitAndCancel,
    Conflict,
    Transient,
    Fatal,
}

#[derive(Default)]
struct Recorded {
    batches: Vec<Vec<TripRecord>>,
    script: VecDeque<Outcome>,
}

/// In-memory [`BulkLoader`] that records every batch.
///
/// Calls follow the script in order and commit once it runs out.
#[derive(Clone, Default)]
pub struct RecordingLoader {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingLoader {
    pub fn scripted(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let loader = Self::default();
        loader.inner.lock().unwrap().script = outcomes.into_iter().collect();
        loader
    }

    pub fn batches(&self) -> Vec<Vec<TripRecord>> {
        self.inner.lock().unwrap().batches.clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl BulkLoader for RecordingLoader {
    async fn bulk_insert(
        &self,
        records: &[TripRecord],
        _batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<u64, LoadError> {
        let mut inner = self.inner.lock().unwrap();
        inner.batches.push(records.to_vec());

        match inner.script.pop_front().unwrap_or(Outcome::Commit) {
            Outcome::Commit => Ok(records.len() as u64),
            Outcome::CommitAndCancel => {
                cancel.cancel();
                Ok(records.len() as u64)
            }
            Outcome::Conflict => Err(LoadError::conflict(
                "duplicate key value violates unique constraint",
            )),
            Outcome::Transient => Err(LoadError::transient("connection reset")),
            Outcome::Fatal => Err(LoadError::fatal("relation does not exist")),
        }
    }
}
