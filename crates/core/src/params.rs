//! Run parameters and their validation.
//!
//! The presentation layer hands the core four raw values (bbox string, start,
//! end, resolution). Everything is checked here, before any network access.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vector::BBox;

/// Collection searched when the caller does not name one.
pub const DEFAULT_COLLECTION: &str = "sentinel-2-l2a";

/// Validated, immutable parameters of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    bbox: BBox,
    start: NaiveDate,
    end: NaiveDate,
    resolution_m: u32,
    collection: String,
}

impl RunParams {
    /// Build parameters from typed values, enforcing every invariant.
    pub fn new(
        bbox: BBox,
        start: NaiveDate,
        end: NaiveDate,
        resolution_m: u32,
        collection: impl Into<String>,
    ) -> Result<Self> {
        check_bbox(&bbox)?;
        if end < start {
            return Err(Error::config(
                "date range",
                format!("{start}/{end}"),
                "end date is before start date",
            ));
        }
        if resolution_m == 0 {
            return Err(Error::config("resolution", "0", "must be a positive integer"));
        }
        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(Error::config("collection", collection, "must not be empty"));
        }

        Ok(Self {
            bbox,
            start,
            end,
            resolution_m,
            collection,
        })
    }

    /// Parse the raw boundary values handed over by the presentation layer.
    pub fn from_raw(bbox: &str, start: &str, end: &str, resolution: &str) -> Result<Self> {
        Self::new(
            parse_bbox(bbox)?,
            parse_date("start date", start)?,
            parse_date("end date", end)?,
            parse_resolution(resolution)?,
            DEFAULT_COLLECTION,
        )
    }

    /// Same parameters, different collection.
    pub fn with_collection(self, collection: impl Into<String>) -> Result<Self> {
        Self::new(self.bbox, self.start, self.end, self.resolution_m, collection)
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn resolution_m(&self) -> u32 {
        self.resolution_m
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Inclusive ISO-8601 interval covering whole days, e.g.
    /// `2024-06-01T00:00:00Z/2024-06-30T23:59:59Z`.
    pub fn datetime_interval(&self) -> String {
        format!("{}T00:00:00Z/{}T23:59:59Z", self.start, self.end)
    }
}

/// Parse `"minx,miny,maxx,maxy"` into a WGS84 bbox.
pub fn parse_bbox(raw: &str) -> Result<BBox> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(Error::config(
            "bbox",
            raw,
            format!("expected 4 comma-separated numbers (minx,miny,maxx,maxy), got {}", parts.len()),
        ));
    }

    let mut values = [0.0f64; 4];
    for (slot, token) in values.iter_mut().zip(&parts) {
        let v: f64 = token
            .parse()
            .map_err(|_| Error::config("bbox", raw, format!("'{token}' is not a number")))?;
        if !v.is_finite() {
            return Err(Error::config("bbox", raw, format!("'{token}' is not finite")));
        }
        *slot = v;
    }

    let bbox = BBox::new(values[0], values[1], values[2], values[3]);
    check_bbox(&bbox)?;
    Ok(bbox)
}

/// Coerce a calendar date (`2024-06-01`) or an RFC 3339 timestamp
/// (`2024-06-01T10:30:00Z`, date part kept).
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.date_naive())
        .map_err(|_| Error::config(field, raw, "expected YYYY-MM-DD or an RFC 3339 timestamp"))
}

/// Parse a positive integer resolution in metres.
pub fn parse_resolution(raw: &str) -> Result<u32> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::config("resolution", raw, "not an integer"))?;
    if value <= 0 {
        return Err(Error::config("resolution", raw, "must be a positive integer"));
    }
    u32::try_from(value).map_err(|_| Error::config("resolution", raw, "out of range"))
}

fn check_bbox(bbox: &BBox) -> Result<()> {
    if bbox.min_x >= bbox.max_x {
        return Err(Error::config("bbox", bbox.to_string(), "minx must be less than maxx"));
    }
    if bbox.min_y >= bbox.max_y {
        return Err(Error::config("bbox", bbox.to_string(), "miny must be less than maxy"));
    }
    Ok(())
}
