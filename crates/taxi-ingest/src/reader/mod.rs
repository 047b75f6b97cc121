//! Streaming trip file reader
//!
//! [`TripReader::validate`] checks the header without touching data rows.
//! [`TripReader::read`] then yields one [`TripRecord`] per parseable row as a
//! lazy, forward-only stream. Rows whose pickup or dropoff timestamp cannot
//! be parsed are dropped. Malformed numeric cells degrade to zero.
//!
//! The delimiter is detected from the header line (`,` `;` tab or `|`).

mod columns;
mod fields;
mod timestamp;

pub use columns::{ColumnIndex, HEADER_ALIASES};
pub use timestamp::{civil_to_utc, parse_timestamp, ParsedTimestamp};

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord, Trim};
use futures::stream::{self, BoxStream, StreamExt};
use taxi_common::{TripField, TripRecord};
use thiserror::Error;
use tokio::fs::File;
use std::io::SeekFrom;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::IngestError;

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Structural problems with an input file, detected before any write
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Cannot read '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse header of '{path}': {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: csv_async::Error,
    },

    #[error("'{0}' is empty or has no header row")]
    Empty(PathBuf),

    #[error("Invalid file format, missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
}

/// Stream of records produced by [`TripReader::read`]
pub type TripStream = BoxStream<'static, Result<TripRecord, IngestError>>;

/// Reader for delimited trip files
#[derive(Debug, Clone, Copy)]
pub struct TripReader {
    reference_tz: Tz,
}

impl Default for TripReader {
    fn default() -> Self {
        Self::new(chrono_tz::America::New_York)
    }
}

impl TripReader {
    /// `reference_tz` is the civil zone zone-less timestamps are assumed to be in
    pub fn new(reference_tz: Tz) -> Self {
        Self { reference_tz }
    }

    pub fn reference_tz(&self) -> Tz {
        self.reference_tz
    }

    /// Check that `path` is readable and its header names every required column
    pub async fn validate(&self, path: &Path) -> Result<(), FormatError> {
        let mut reader = open_csv(path).await?;
        resolve_columns(path, &mut reader).await?;
        debug!(path = %path.display(), "Input file header validated");
        Ok(())
    }

    /// Stream the records of a validated file.
    ///
    /// The file is opened on first poll. Cancellation is checked before each
    /// row; once observed the stream yields [`IngestError::Cancelled`] and ends.
    pub fn read(
        &self,
        path: impl Into<PathBuf>,
        convert_to_utc: bool,
        cancel: CancellationToken,
    ) -> TripStream {
        let context = RowContext {
            convert_to_utc,
            reference_tz: self.reference_tz,
        };
        let state = ReadState::Pending {
            path: path.into(),
            context,
            cancel,
        };

        stream::unfold(state, |state| async move {
            match state {
                ReadState::Finished => None,
                ReadState::Pending {
                    path,
                    context,
                    cancel,
                } => match OpenFile::open(path, context, cancel).await {
                    Ok(open) => next_record(Box::new(open)).await,
                    Err(err) => Some((Err(err.into()), ReadState::Finished)),
                },
                ReadState::Streaming(open) => next_record(open).await,
            }
        })
        .boxed()
    }
}

#[derive(Debug, Clone, Copy)]
struct RowContext {
    convert_to_utc: bool,
    reference_tz: Tz,
}

enum ReadState {
    Pending {
        path: PathBuf,
        context: RowContext,
        cancel: CancellationToken,
    },
    Streaming(Box<OpenFile>),
    Finished,
}

struct OpenFile {
    path: PathBuf,
    csv: AsyncReader<File>,
    columns: ColumnIndex,
    row: StringRecord,
    context: RowContext,
    cancel: CancellationToken,
    emitted: u64,
    skipped: u64,
}

impl OpenFile {
    async fn open(
        path: PathBuf,
        context: RowContext,
        cancel: CancellationToken,
    ) -> Result<Self, FormatError> {
        let mut csv = open_csv(&path).await?;
        let columns = resolve_columns(&path, &mut csv).await?;

        Ok(Self {
            path,
            csv,
            columns,
            row: StringRecord::new(),
            context,
            cancel,
            emitted: 0,
            skipped: 0,
        })
    }
}

async fn next_record(
    mut open: Box<OpenFile>,
) -> Option<(Result<TripRecord, IngestError>, ReadState)> {
    loop {
        if open.cancel.is_cancelled() {
            debug!(rows = open.emitted, "Read cancelled");
            return Some((Err(IngestError::Cancelled), ReadState::Finished));
        }

        let OpenFile { csv, row, .. } = &mut *open;
        match csv.read_record(row).await {
            Ok(false) => {
                debug!(
                    path = %open.path.display(),
                    rows = open.emitted,
                    skipped = open.skipped,
                    "Finished reading input file"
                );
                return None;
            }
            Ok(true) => match parse_row(&open.row, &open.columns, open.context) {
                Some(trip) => {
                    open.emitted += 1;
                    return Some((Ok(trip), ReadState::Streaming(open)));
                }
                None => open.skipped += 1,
            },
            Err(err) if matches!(err.kind(), csv_async::ErrorKind::Io(_)) => {
                return Some((Err(IngestError::Read(err)), ReadState::Finished));
            }
            Err(err) => {
                trace!(error = %err, "Skipping undecodable row");
                open.skipped += 1;
            }
        }
    }
}

fn parse_row(row: &StringRecord, columns: &ColumnIndex, context: RowContext) -> Option<TripRecord> {
    let timestamp = |field| {
        parse_timestamp(columns.cell(row, field))
            .map(|parsed| parsed.resolve(context.convert_to_utc, context.reference_tz))
    };
    let pickup = timestamp(TripField::PickupDatetime)?;
    let dropoff = timestamp(TripField::DropoffDatetime)?;

    let cell = |field| columns.cell(row, field);
    Some(
        TripRecord::builder(pickup, dropoff)
            .passenger_count(fields::parse_int(cell(TripField::PassengerCount)))
            .trip_distance(fields::parse_float(cell(TripField::TripDistance)))
            .store_and_fwd_flag(fields::normalize_flag(cell(TripField::StoreAndFwdFlag)))
            .pu_location_id(fields::parse_int(cell(TripField::PuLocationId)))
            .do_location_id(fields::parse_int(cell(TripField::DoLocationId)))
            .fare_amount(fields::parse_decimal(cell(TripField::FareAmount)))
            .tip_amount(fields::parse_decimal(cell(TripField::TipAmount)))
            .build(),
    )
}

async fn open_csv(path: &Path) -> Result<AsyncReader<File>, FormatError> {
    let unreadable = |source| FormatError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let header = sniff_header(path)
        .await
        .map_err(unreadable)?
        .ok_or_else(|| FormatError::Empty(path.to_path_buf()))?;

    // leading blank lines would otherwise be taken as the header row
    let mut file = File::open(path).await.map_err(unreadable)?;
    file.seek(SeekFrom::Start(header.offset))
        .await
        .map_err(unreadable)?;
    Ok(AsyncReaderBuilder::new()
        .delimiter(header.delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .create_reader(file))
}

async fn resolve_columns(
    path: &Path,
    reader: &mut AsyncReader<File>,
) -> Result<ColumnIndex, FormatError> {
    let headers = reader
        .headers()
        .await
        .map_err(|source| FormatError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    if headers.iter().all(|header| header.trim().is_empty()) {
        return Err(FormatError::Empty(path.to_path_buf()));
    }

    ColumnIndex::resolve(headers)
}

/// Where the header row starts and which delimiter it uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeaderLine {
    offset: u64,
    delimiter: u8,
}

/// Locate the first non-blank line and pick its most frequent candidate
/// delimiter.
///
/// Returns `None` for a file with no non-blank line.
async fn sniff_header(path: &Path) -> std::io::Result<Option<HeaderLine>> {
    let mut reader = BufReader::new(File::open(path).await?);
    let mut line = Vec::new();
    let mut offset = 0u64;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        if line.iter().any(|b| !b.is_ascii_whitespace()) {
            break;
        }
        offset += read as u64;
    }

    let delimiter = DELIMITER_CANDIDATES
        .iter()
        .map(|candidate| (*candidate, line.iter().filter(|b| *b == candidate).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map_or(b',', |(candidate, _)| candidate);

    Ok(Some(HeaderLine { offset, delimiter }))
}
