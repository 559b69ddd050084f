//! Trip records and the derived fields attached before loading.

use crate::constants::{MEDIUM_TRIP_MAX_MILES, SHORT_TRIP_MAX_MILES};
use crate::error::{EtlError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The eight base columns kept after projection. Required fields are non-null
/// because the filters already dropped rows where they were missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    #[serde(rename = "VendorID")]
    pub vendor_id: Option<i64>,
    #[serde(rename = "tpep_pickup_datetime")]
    pub pickup: NaiveDateTime,
    #[serde(rename = "tpep_dropoff_datetime")]
    pub dropoff: NaiveDateTime,
    pub trip_distance: f64,
    #[serde(rename = "PULocationID")]
    pub pu_location_id: Option<i64>,
    #[serde(rename = "DOLocationID")]
    pub do_location_id: Option<i64>,
    pub tip_amount: Option<f64>,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceSegment {
    Short,
    Medium,
    Long,
}

impl DistanceSegment {
    pub fn classify(trip_distance: f64) -> Self {
        if trip_distance <= SHORT_TRIP_MAX_MILES {
            DistanceSegment::Short
        } else if trip_distance <= MEDIUM_TRIP_MAX_MILES {
            DistanceSegment::Medium
        } else {
            DistanceSegment::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceSegment::Short => "short",
            DistanceSegment::Medium => "medium",
            DistanceSegment::Long => "long",
        }
    }
}

impl fmt::Display for DistanceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trip with its derived fields, stored as one self-contained document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripDocument {
    #[serde(flatten)]
    pub trip: TripRecord,
    pub trip_duration_minutes: f64,
    pub tip_ratio: Option<f64>,
    pub distance_segment: DistanceSegment,
}

/// Whole-second difference, matching unix-timestamp arithmetic.
pub fn trip_duration_minutes(pickup: NaiveDateTime, dropoff: NaiveDateTime) -> Result<f64> {
    let secs = dropoff.and_utc().timestamp() - pickup.and_utc().timestamp();
    if secs <= 0 {
        return Err(EtlError::Transform(format!(
            "non-positive trip duration ({secs}s) between {pickup} and {dropoff}"
        )));
    }
    Ok(secs as f64 / 60.0)
}

pub fn tip_ratio(tip_amount: f64, total_amount: f64) -> Result<f64> {
    // An infinite total gives a ratio of 0.
    if total_amount.is_nan() || total_amount <= 0.0 {
        return Err(EtlError::Transform(format!(
            "tip_ratio undefined for total_amount {total_amount}"
        )));
    }
    Ok(tip_amount / total_amount)
}

impl TripRecord {
    /// Attach derived fields. Errors only if the filters were bypassed.
    pub fn enrich(self) -> Result<TripDocument> {
        let trip_duration_minutes = trip_duration_minutes(self.pickup, self.dropoff)?;
        let tip_ratio = match self.tip_amount {
            Some(tip) => Some(tip_ratio(tip, self.total_amount)?),
            None => None,
        };
        let distance_segment = DistanceSegment::classify(self.trip_distance);
        Ok(TripDocument {
            trip: self,
            trip_duration_minutes,
            tip_ratio,
            distance_segment,
        })
    }
}
