//! Delimited row encoding shared by the duplicate sink and the COPY payload

use std::io;

use chrono::NaiveDateTime;
use taxi_common::{TripField, TripRecord};

/// Second precision, used for the human-facing duplicates file
pub const SECONDS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Keeps sub-second digits when present, used for bulk loading
pub const FRACTIONAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Render every field of `record` in canonical [`TripField::ALL`] order.
pub fn record_fields(record: &TripRecord, timestamp_format: &str) -> [String; 9] {
    TripField::ALL.map(|field| field_value(record, field, timestamp_format))
}

fn field_value(record: &TripRecord, field: TripField, timestamp_format: &str) -> String {
    match field {
        TripField::PickupDatetime => format_timestamp(record.pickup_datetime(), timestamp_format),
        TripField::DropoffDatetime => format_timestamp(record.dropoff_datetime(), timestamp_format),
        TripField::PassengerCount => record.passenger_count().to_string(),
        TripField::TripDistance => record.trip_distance().to_string(),
        TripField::StoreAndFwdFlag => record.store_and_fwd_flag().to_string(),
        TripField::PuLocationId => record.pu_location_id().to_string(),
        TripField::DoLocationId => record.do_location_id().to_string(),
        TripField::FareAmount => record.fare_amount().to_string(),
        TripField::TipAmount => record.tip_amount().to_string(),
    }
}

fn format_timestamp(value: NaiveDateTime, format: &str) -> String {
    value.format(format).to_string()
}

/// Reusable comma-delimited encoder.
///
/// Fields containing the delimiter, a quote or a line break are quoted and
/// embedded quotes are doubled.
pub struct RowEncoder {
    writer: csv::Writer<Vec<u8>>,
}

impl RowEncoder {
    pub fn new() -> Self {
        Self {
            writer: new_writer(),
        }
    }

    /// Append one row to the internal buffer
    pub fn push<I, T>(&mut self, fields: I) -> io::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(fields)?;
        Ok(())
    }

    /// Take every byte encoded since the last call
    pub fn take(&mut self) -> io::Result<Vec<u8>> {
        let filled = std::mem::replace(&mut self.writer, new_writer());
        filled.into_inner().map_err(|err| err.into_error())
    }
}

fn new_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .delimiter(b',')
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new())
}

impl Default for RowEncoder {
    fn default() -> Self {
        Self::new()
    }
}
