//! Header alias table and column resolution

use csv_async::StringRecord;
use taxi_common::TripField;

use super::FormatError;

/// Accepted input header for each field, in canonical order.
///
/// Matching is case-insensitive after trimming whitespace.
pub const HEADER_ALIASES: [(TripField, &str); 9] = [
    (TripField::PickupDatetime, "tpep_pickup_datetime"),
    (TripField::DropoffDatetime, "tpep_dropoff_datetime"),
    (TripField::PassengerCount, "passenger_count"),
    (TripField::TripDistance, "trip_distance"),
    (TripField::StoreAndFwdFlag, "store_and_fwd_flag"),
    (TripField::PuLocationId, "pulocationid"),
    (TripField::DoLocationId, "dolocationid"),
    (TripField::FareAmount, "fare_amount"),
    (TripField::TipAmount, "tip_amount"),
];

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Input column position of every canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    positions: [usize; 9],
}

impl ColumnIndex {
    /// Resolve every alias against a header row.
    ///
    /// Fails with [`FormatError::MissingColumns`] naming each absent alias.
    pub fn resolve(headers: &StringRecord) -> Result<Self, FormatError> {
        let normalized: Vec<String> = headers.iter().map(normalize_header).collect();

        let mut positions = [0usize; 9];
        let mut missing = Vec::new();

        for (slot, (_, alias)) in HEADER_ALIASES.iter().enumerate() {
            match normalized.iter().position(|header| header == alias) {
                Some(position) => positions[slot] = position,
                None => missing.push(*alias),
            }
        }

        if missing.is_empty() {
            Ok(Self { positions })
        } else {
            Err(FormatError::MissingColumns(missing))
        }
    }

    /// Raw cell for `field`, empty when the row is short
    pub fn cell<'r>(&self, record: &'r StringRecord, field: TripField) -> &'r str {
        record.get(self.positions[field as usize]).unwrap_or("")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn canonical_header() -> Vec<&'static str> {
        HEADER_ALIASES.iter().map(|(_, alias)| *alias).collect()
    }

    #[test]
    fn test_aliases_follow_field_order() {
        for (slot, (field, _)) in HEADER_ALIASES.iter().enumerate() {
            assert_eq!(*field as usize, slot);
            assert_eq!(TripField::ALL[slot], *field);
        }
    }

    #[test]
    fn test_resolve_in_any_order_and_case() {
        let mut names = canonical_header();
        names.reverse();
        let mut upper: Vec<String> = names.iter().map(|n| format!("  {}  ", n.to_uppercase())).collect();
        upper.insert(0, "VendorID".to_string());

        let headers = StringRecord::from(upper);
        let index = ColumnIndex::resolve(&headers).unwrap();

        let mut row: Vec<String> = vec!["1".to_string()];
        row.extend(names.iter().map(|n| format!("value-of-{n}")));
        let row = StringRecord::from(row);

        assert_eq!(
            index.cell(&row, TripField::PickupDatetime),
            "value-of-tpep_pickup_datetime"
        );
        assert_eq!(index.cell(&row, TripField::TipAmount), "value-of-tip_amount");
    }

    #[test]
    fn test_resolve_strips_byte_order_mark() {
        let mut names: Vec<String> = canonical_header().iter().map(|n| n.to_string()).collect();
        names[0] = format!("\u{feff}{}", names[0]);

        assert!(ColumnIndex::resolve(&StringRecord::from(names)).is_ok());
    }

    #[test]
    fn test_resolve_lists_every_missing_column() {
        let headers = StringRecord::from(vec![
            "tpep_pickup_datetime",
            "passenger_count",
            "trip_distance",
            "store_and_fwd_flag",
            "PULocationID",
            "DOLocationID",
            "fare_amount",
        ]);

        match ColumnIndex::resolve(&headers) {
            Err(FormatError::MissingColumns(missing)) => {
                assert_eq!(missing, vec!["tpep_dropoff_datetime", "tip_amount"]);
            }
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn test_cell_on_short_row_is_empty() {
        let index = ColumnIndex::resolve(&StringRecord::from(canonical_header())).unwrap();
        let row = StringRecord::from(vec!["2020-01-01 00:00:00"]);

        assert_eq!(index.cell(&row, TripField::PickupDatetime), "2020-01-01 00:00:00");
        assert_eq!(index.cell(&row, TripField::FareAmount), "");
    }
}
