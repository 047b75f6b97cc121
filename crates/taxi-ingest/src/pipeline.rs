//! Ingestion pipeline
//!
//! Drives reader → in-run dedup → batch buffer → bulk loader, diverting
//! repeated records to the duplicate sink. A batch the store rejects on a
//! uniqueness conflict is dropped whole and the run continues. Any other
//! load failure aborts the run. The sink is closed on every exit path.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use futures::StreamExt;
use taxi_common::{DedupKey, TripRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::IngestError;
use crate::loader::BulkLoader;
use crate::reader::TripReader;
use crate::sink::{DuplicateSink, SinkError};

/// Outcome of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records emitted by the reader
    pub rows_read: u64,
    /// Records diverted to the duplicate sink
    pub duplicates: u64,
    /// Rows the store reported as inserted
    pub rows_committed: u64,
    pub batches_committed: u64,
    /// Batches dropped after a uniqueness conflict
    pub batches_dropped: u64,
    pub rows_dropped: u64,
    pub elapsed: Duration,
}

/// State owned by a single run
struct RunState {
    batch_size: usize,
    seen: HashSet<DedupKey>,
    pending: Vec<TripRecord>,
    summary: RunSummary,
}

impl RunState {
    fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            seen: HashSet::new(),
            pending: Vec::with_capacity(batch_size),
            summary: RunSummary::default(),
        }
    }
}

/// One ingestion run over one file
pub struct IngestPipeline<L, S> {
    reader: TripReader,
    loader: L,
    sink: S,
}

impl<L, S> IngestPipeline<L, S>
where
    L: BulkLoader,
    S: DuplicateSink,
{
    pub fn new(reader: TripReader, loader: L, sink: S) -> Self {
        Self {
            reader,
            loader,
            sink,
        }
    }

    /// Ingest `path`, which should already have passed [`TripReader::validate`].
    ///
    /// On success the summary counts only rows from committed batches. On
    /// failure after the run started the error is [`IngestError::Aborted`]
    /// carrying the rows committed before it stopped.
    pub async fn run(
        mut self,
        path: &Path,
        batch_size: usize,
        convert_to_utc: bool,
        cancel: CancellationToken,
    ) -> Result<RunSummary, IngestError> {
        if batch_size == 0 {
            self.sink.close().await?;
            return Err(IngestError::InvalidBatchSize(batch_size));
        }

        let started = Instant::now();
        let mut state = RunState::new(batch_size);

        info!(
            path = %path.display(),
            batch_size,
            convert_to_utc,
            "Starting ingestion run"
        );

        let outcome = self
            .drive(path, convert_to_utc, &cancel, &mut state)
            .await;
        let closed = self.sink.close().await;

        let committed = state.summary.rows_committed;
        let abort = |source: IngestError| IngestError::Aborted {
            committed,
            source: Box::new(source),
        };

        match (outcome, closed) {
            (Ok(()), Ok(())) => {
                let mut summary = state.summary;
                summary.elapsed = started.elapsed();
                info!(
                    rows_read = summary.rows_read,
                    rows_committed = summary.rows_committed,
                    duplicates = summary.duplicates,
                    batches_dropped = summary.batches_dropped,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "Ingestion run finished"
                );
                Ok(summary)
            }
            (Ok(()), Err(close_err)) => Err(abort(close_err.into())),
            (Err(err), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "Failed to close duplicate sink after abort");
                }
                Err(abort(err))
            }
        }
    }

    async fn drive(
        &mut self,
        path: &Path,
        convert_to_utc: bool,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<(), IngestError> {
        self.sink
            .write_header(cancel)
            .await
            .map_err(sink_error)?;

        let mut trips = self.reader.read(path, convert_to_utc, cancel.clone());

        while let Some(trip) = trips.next().await {
            let trip = trip?;
            state.summary.rows_read += 1;

            if state.seen.insert(trip.dedup_key()) {
                state.pending.push(trip);
                if state.pending.len() >= state.batch_size {
                    self.flush(cancel, state).await?;
                }
            } else {
                state.summary.duplicates += 1;
                self.sink
                    .write(&trip, cancel)
                    .await
                    .map_err(sink_error)?;
            }
        }

        self.flush(cancel, state).await
    }

    async fn flush(
        &self,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<(), IngestError> {
        if state.pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::replace(&mut state.pending, Vec::with_capacity(state.batch_size));

        match self
            .loader
            .bulk_insert(&batch, state.batch_size, cancel)
            .await
        {
            Ok(rows) => {
                state.summary.rows_committed += rows;
                state.summary.batches_committed += 1;
                debug!(
                    rows,
                    total = state.summary.rows_committed,
                    "Batch committed"
                );
                Ok(())
            }
            Err(err) if err.is_conflict() => {
                state.summary.batches_dropped += 1;
                state.summary.rows_dropped += batch.len() as u64;
                warn!(
                    error = %err,
                    rows = batch.len(),
                    "Batch skipped due to unique constraint violation"
                );
                Ok(())
            }
            Err(err) => {
                error!(error = %err, rows = batch.len(), "Bulk insert failed");
                Err(err.into())
            }
        }
    }
}

fn sink_error(err: SinkError) -> IngestError {
    match err {
        SinkError::Cancelled => IngestError::Cancelled,
        other => IngestError::Sink(other),
    }
}
