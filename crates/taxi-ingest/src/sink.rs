//! Duplicate sink
//!
//! Rows rejected by in-run deduplication are appended to an audit file so
//! nothing read from the input is silently lost.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use taxi_common::{TripField, TripRecord};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::{record_fields, RowEncoder, SECONDS_FORMAT};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Duplicate sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Duplicate sink is closed")]
    Closed,

    #[error("Duplicate sink write cancelled")]
    Cancelled,
}

/// Append-only destination for duplicate records.
///
/// Every write accepted before [`DuplicateSink::close`] returns must be
/// durable once `close` succeeds. Writes after `close` fail.
#[async_trait]
pub trait DuplicateSink: Send {
    async fn write_header(&mut self, cancel: &CancellationToken) -> Result<(), SinkError>;

    async fn write(
        &mut self,
        record: &TripRecord,
        cancel: &CancellationToken,
    ) -> Result<(), SinkError>;

    /// Flush and release the destination. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), SinkError>;
}

/// [`DuplicateSink`] writing comma-delimited rows to a local file
pub struct CsvDuplicateSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    encoder: RowEncoder,
    rows: u64,
}

impl CsvDuplicateSink {
    /// Create (or truncate) the file at `path`
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        debug!(path = %path.display(), "Opened duplicate sink");

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            encoder: RowEncoder::new(),
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows accepted so far, header excluded
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    async fn write_fields<I, T>(
        &mut self,
        fields: I,
        cancel: &CancellationToken,
    ) -> Result<(), SinkError>
    where
        I: IntoIterator<Item = T> + Send,
        T: AsRef<[u8]> + Send,
    {
        if cancel.is_cancelled() {
            return Err(SinkError::Cancelled);
        }
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;

        self.encoder.push(fields)?;
        let line = self.encoder.take()?;
        writer.write_all(&line).await?;
        Ok(())
    }
}

#[async_trait]
impl DuplicateSink for CsvDuplicateSink {
    async fn write_header(&mut self, cancel: &CancellationToken) -> Result<(), SinkError> {
        self.write_fields(TripField::ALL.map(TripField::field_name), cancel)
            .await
    }

    async fn write(
        &mut self,
        record: &TripRecord,
        cancel: &CancellationToken,
    ) -> Result<(), SinkError> {
        self.write_fields(record_fields(record, SECONDS_FORMAT), cancel)
            .await?;
        self.rows += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.get_ref().sync_all().await?;
            debug!(path = %self.path.display(), rows = self.rows, "Closed duplicate sink");
        }
        Ok(())
    }
}
