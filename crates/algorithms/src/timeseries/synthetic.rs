//! Demo series
//!
//! A smooth seasonal-looking curve over the requested range, used when real
//! imagery cannot be obtained. The output is a pure function of the dates and
//! is always tagged synthetic.

use chrono::{Duration, NaiveDate};
use saag_core::{Provenance, Result, TimeSeries, TimeSeriesPoint, NDVI};

/// Spacing of demo points.
pub const DEMO_STEP_DAYS: i64 = 7;

/// `start, start + 7d, ...` up to and including `end`.
pub fn demo_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut d = start;
    while d <= end {
        dates.push(d);
        d += Duration::days(DEMO_STEP_DAYS);
    }
    dates
}

/// Synthetic NDVI: `clamp(0.6 + 0.3 sin θ, 0, 1)` with θ evenly spaced over `[0, 3]`.
pub fn demo_series(start: NaiveDate, end: NaiveDate, reason: impl Into<String>) -> Result<TimeSeries> {
    let dates = demo_dates(start, end);
    let n = dates.len();
    let points = dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let theta = if n > 1 { 3.0 * i as f64 / (n - 1) as f64 } else { 0.0 };
            let value = (0.6 + 0.3 * theta.sin()).clamp(0.0, 1.0);
            TimeSeriesPoint::new(date, Some(value))
        })
        .collect();

    TimeSeries::new(
        NDVI,
        points,
        Provenance::Synthetic {
            reason: reason.into(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn weekly_steps_cover_range() {
        let dates = demo_dates(d(6, 1), d(6, 30));
        assert_eq!(dates, vec![d(6, 1), d(6, 8), d(6, 15), d(6, 22), d(6, 29)]);
    }

    #[test]
    fn curve_shape() {
        let ts = demo_series(d(6, 1), d(6, 30), "no scenes").unwrap();
        let values: Vec<f64> = ts.points().iter().filter_map(|p| p.value).collect();
        assert_eq!(values.len(), 5);
        assert_relative_eq!(values[0], 0.6);
        // θ = 3.0 at the last point
        assert_relative_eq!(values[4], 0.6 + 0.3 * 3.0f64.sin(), epsilon = 1e-12);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(ts.is_synthetic());
    }

    #[test]
    fn single_day_range() {
        let ts = demo_series(d(6, 1), d(6, 1), "x").unwrap();
        assert_eq!(ts.len(), 1);
        assert_relative_eq!(ts.points()[0].value.unwrap(), 0.6);
    }

    #[test]
    fn deterministic() {
        let a = demo_series(d(1, 1), d(12, 31), "a").unwrap();
        let b = demo_series(d(1, 1), d(12, 31), "a").unwrap();
        assert_eq!(a, b);
    }
}
