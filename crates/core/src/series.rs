//! The vegetation-index time series handed to exporters and charts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the only index the pipeline computes.
pub const NDVI: &str = "NDVI";

/// One date of the series. `value` is `None` for a date whose slice had no
/// valid pixel: a gap, not a measured zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl TimeSeriesPoint {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self { date, value }
    }

    pub fn is_gap(&self) -> bool {
        self.value.is_none()
    }
}

/// Where a series came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Provenance {
    /// Computed from real scenes.
    Measured {
        scenes_used: usize,
        scenes_skipped: usize,
    },
    /// Generated by the demo fallback; never real measurement.
    Synthetic { reason: String },
}

impl Provenance {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Provenance::Synthetic { .. })
    }

    /// Marker written next to synthetic data in exports.
    pub fn marker(&self) -> Option<String> {
        match self {
            Provenance::Synthetic { reason } => Some(format!("fallback_demo: {reason}")),
            Provenance::Measured { .. } => None,
        }
    }
}

/// Summary statistics over the valid points of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    pub n_obs: usize,
    pub n_valid: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Chronological series: strictly increasing dates, one point per date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    index_name: String,
    points: Vec<TimeSeriesPoint>,
    provenance: Provenance,
}

impl TimeSeries {
    /// Wrap already-ordered points. Fails if dates are not strictly increasing.
    pub fn new(
        index_name: impl Into<String>,
        points: Vec<TimeSeriesPoint>,
        provenance: Provenance,
    ) -> Result<Self> {
        if let Some(w) = points.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(Error::InvalidSeries(format!(
                "dates must be strictly increasing, found {} followed by {}",
                w[0].date, w[1].date
            )));
        }
        Ok(Self {
            index_name: index_name.into(),
            points,
            provenance,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn points(&self) -> &[TimeSeriesPoint] {
        &self.points
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn is_synthetic(&self) -> bool {
        self.provenance.is_synthetic()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn summary(&self) -> SeriesSummary {
        let valid: Vec<f64> = self.points.iter().filter_map(|p| p.value).collect();
        let n_valid = valid.len();
        let (mean, min, max) = if valid.is_empty() {
            (None, None, None)
        } else {
            let sum: f64 = valid.iter().sum();
            let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
            let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (Some(sum / n_valid as f64), Some(min), Some(max))
        };
        SeriesSummary {
            n_obs: self.points.len(),
            n_valid,
            mean,
            min,
            max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn measured() -> Provenance {
        Provenance::Measured {
            scenes_used: 2,
            scenes_skipped: 0,
        }
    }

    #[test]
    fn rejects_unordered_or_duplicate_dates() {
        let dup = vec![
            TimeSeriesPoint::new(d(3), Some(0.5)),
            TimeSeriesPoint::new(d(3), Some(0.6)),
        ];
        assert!(TimeSeries::new(NDVI, dup, measured()).is_err());

        let backwards = vec![
            TimeSeriesPoint::new(d(8), Some(0.5)),
            TimeSeriesPoint::new(d(3), Some(0.6)),
        ];
        assert!(TimeSeries::new(NDVI, backwards, measured()).is_err());
    }

    #[test]
    fn summary_ignores_gaps() {
        let ts = TimeSeries::new(
            NDVI,
            vec![
                TimeSeriesPoint::new(d(3), Some(0.4)),
                TimeSeriesPoint::new(d(8), None),
                TimeSeriesPoint::new(d(18), Some(0.8)),
            ],
            measured(),
        )
        .unwrap();

        let s = ts.summary();
        assert_eq!(s.n_obs, 3);
        assert_eq!(s.n_valid, 2);
        assert_relative_eq!(s.mean.unwrap(), 0.6, epsilon = 1e-12);
        assert_relative_eq!(s.min.unwrap(), 0.4);
        assert_relative_eq!(s.max.unwrap(), 0.8);
    }

    #[test]
    fn synthetic_marker() {
        let p = Provenance::Synthetic {
            reason: "no scenes".into(),
        };
        assert!(p.is_synthetic());
        assert_eq!(p.marker().as_deref(), Some("fallback_demo: no scenes"));
        assert_eq!(measured().marker(), None);
    }
}
