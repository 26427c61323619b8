//! Series assembly
//!
//! Slice values arrive in catalog scan order, possibly with several
//! acquisitions on the same calendar day (adjacent tiles, reprocessed
//! products). They are stable-sorted by date and the first occurrence of
//! each date is kept.

use saag_core::{Error, Provenance, Result, TimeSeries, TimeSeriesPoint, NDVI};

use crate::statistics::SliceValue;

/// Build the NDVI series from reduced slice values.
pub fn assemble(values: &[SliceValue], provenance: Provenance) -> Result<TimeSeries> {
    let mut points: Vec<TimeSeriesPoint> = values
        .iter()
        .map(|v| TimeSeriesPoint::new(v.acquired.date_naive(), v.value))
        .collect();

    // sort_by_key is stable: equal dates keep scan order
    points.sort_by_key(|p| p.date);
    let before = points.len();
    points.dedup_by_key(|p| p.date);

    if points.len() < before {
        tracing::debug!(dropped = before - points.len(), "Duplicate acquisition dates dropped");
    }
    if points.is_empty() {
        return Err(Error::EmptySeries {
            scenes: values.len(),
        });
    }

    TimeSeries::new(NDVI, points, provenance)
}
