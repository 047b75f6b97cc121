//! Common types used across the taxi ETL workspace

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Flag value stored for a normalized `Y` store-and-forward marker
pub const FLAG_YES: &str = "Yes";

/// Flag value stored for a normalized `N` store-and-forward marker
pub const FLAG_NO: &str = "No";

/// The fields of a [`TripRecord`], in canonical order.
///
/// The order is shared by the duplicate file header, the input column
/// lookup and the bulk-load column list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripField {
    PickupDatetime,
    DropoffDatetime,
    PassengerCount,
    TripDistance,
    StoreAndFwdFlag,
    PuLocationId,
    DoLocationId,
    FareAmount,
    TipAmount,
}

impl TripField {
    /// All fields in canonical order
    pub const ALL: [TripField; 9] = [
        TripField::PickupDatetime,
        TripField::DropoffDatetime,
        TripField::PassengerCount,
        TripField::TripDistance,
        TripField::StoreAndFwdFlag,
        TripField::PuLocationId,
        TripField::DoLocationId,
        TripField::FareAmount,
        TripField::TipAmount,
    ];

    /// Name of the field on [`TripRecord`]
    pub fn field_name(self) -> &'static str {
        match self {
            TripField::PickupDatetime => "pickup_datetime",
            TripField::DropoffDatetime => "dropoff_datetime",
            TripField::PassengerCount => "passenger_count",
            TripField::TripDistance => "trip_distance",
            TripField::StoreAndFwdFlag => "store_and_fwd_flag",
            TripField::PuLocationId => "pu_location_id",
            TripField::DoLocationId => "do_location_id",
            TripField::FareAmount => "fare_amount",
            TripField::TipAmount => "tip_amount",
        }
    }
}

impl std::fmt::Display for TripField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.field_name())
    }
}

/// One normalized input row.
///
/// Every field always carries a value. Records are immutable once built and
/// move by value through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pickup_datetime: NaiveDateTime,
    dropoff_datetime: NaiveDateTime,
    passenger_count: i32,
    trip_distance: f64,
    store_and_fwd_flag: String,
    pu_location_id: i32,
    do_location_id: i32,
    fare_amount: BigDecimal,
    tip_amount: BigDecimal,
}

impl TripRecord {
    /// Start building a record from its two timestamps.
    ///
    /// Every other field defaults to its zero value.
    pub fn builder(pickup: NaiveDateTime, dropoff: NaiveDateTime) -> TripRecordBuilder {
        TripRecordBuilder {
            record: TripRecord {
                pickup_datetime: pickup,
                dropoff_datetime: dropoff,
                passenger_count: 0,
                trip_distance: 0.0,
                store_and_fwd_flag: String::new(),
                pu_location_id: 0,
                do_location_id: 0,
                fare_amount: BigDecimal::from(0),
                tip_amount: BigDecimal::from(0),
            },
        }
    }

    pub fn pickup_datetime(&self) -> NaiveDateTime {
        self.pickup_datetime
    }

    pub fn dropoff_datetime(&self) -> NaiveDateTime {
        self.dropoff_datetime
    }

    pub fn passenger_count(&self) -> i32 {
        self.passenger_count
    }

    pub fn trip_distance(&self) -> f64 {
        self.trip_distance
    }

    pub fn store_and_fwd_flag(&self) -> &str {
        &self.store_and_fwd_flag
    }

    pub fn pu_location_id(&self) -> i32 {
        self.pu_location_id
    }

    pub fn do_location_id(&self) -> i32 {
        self.do_location_id
    }

    pub fn fare_amount(&self) -> &BigDecimal {
        &self.fare_amount
    }

    pub fn tip_amount(&self) -> &BigDecimal {
        &self.tip_amount
    }

    /// Key used to detect duplicates within one run
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            pickup: self.pickup_datetime,
            dropoff: self.dropoff_datetime,
            passenger_count: self.passenger_count,
        }
    }
}

/// Builder for [`TripRecord`]
#[derive(Debug, Clone)]
pub struct TripRecordBuilder {
    record: TripRecord,
}

impl TripRecordBuilder {
    pub fn passenger_count(mut self, count: i32) -> Self {
        self.record.passenger_count = count;
        self
    }

    pub fn trip_distance(mut self, distance: f64) -> Self {
        self.record.trip_distance = distance;
        self
    }

    pub fn store_and_fwd_flag(mut self, flag: impl Into<String>) -> Self {
        self.record.store_and_fwd_flag = flag.into();
        self
    }

    pub fn pu_location_id(mut self, id: i32) -> Self {
        self.record.pu_location_id = id;
        self
    }

    pub fn do_location_id(mut self, id: i32) -> Self {
        self.record.do_location_id = id;
        self
    }

    pub fn fare_amount(mut self, amount: BigDecimal) -> Self {
        self.record.fare_amount = amount;
        self
    }

    pub fn tip_amount(mut self, amount: BigDecimal) -> Self {
        self.record.tip_amount = amount;
        self
    }

    pub fn build(self) -> TripRecord {
        self.record
    }
}

/// Exact (pickup, dropoff, passenger count) triple identifying a duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub pickup: NaiveDateTime,
    pub dropoff: NaiveDateTime,
    pub passenger_count: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_builder_defaults_to_zero_values() {
        let trip = TripRecord::builder(ts(1, 0), ts(1, 30)).build();

        assert_eq!(trip.passenger_count(), 0);
        assert_eq!(trip.trip_distance(), 0.0);
        assert_eq!(trip.store_and_fwd_flag(), "");
        assert_eq!(trip.fare_amount(), &BigDecimal::from(0));
        assert_eq!(trip.tip_amount(), &BigDecimal::from(0));
    }

    #[test]
    fn test_dedup_key_ignores_non_key_fields() {
        let a = TripRecord::builder(ts(1, 0), ts(1, 30))
            .passenger_count(2)
            .fare_amount(BigDecimal::from_str("12.50").unwrap())
            .build();
        let b = TripRecord::builder(ts(1, 0), ts(1, 30))
            .passenger_count(2)
            .trip_distance(9.1)
            .store_and_fwd_flag(FLAG_YES)
            .build();

        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key(), a.dedup_key());
    }

    #[test]
    fn test_dedup_key_distinguishes_passenger_count() {
        let a = TripRecord::builder(ts(1, 0), ts(1, 30)).passenger_count(1).build();
        let b = TripRecord::builder(ts(1, 0), ts(1, 30)).passenger_count(2).build();

        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_field_names_follow_canonical_order() {
        let names: Vec<&str> = TripField::ALL.iter().map(|f| f.field_name()).collect();
        assert_eq!(names.first(), Some(&"pickup_datetime"));
        assert_eq!(names.last(), Some(&"tip_amount"));
        assert_eq!(TripField::StoreAndFwdFlag.to_string(), "store_and_fwd_flag");
    }
}
