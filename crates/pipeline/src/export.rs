//! Series export.
//!
//! - **CSV**: `date,<INDEX>` rows in ascending date order, gaps as empty
//!   fields; synthetic series add a `note` column with the fallback marker.
//! - **Parquet**: the same columns as the CSV, with gaps as nulls.
//! - **GeoJSON**: the AOI rectangle as a single-feature collection carrying
//!   the run parameters and summary statistics.
//!
//! Every write truncates its target file.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use polars::prelude::{Column, DataFrame, ParquetReader, ParquetWriter, PolarsError, SerReader};
use saag_core::{Error, Provenance, Result, RunParams, TimeSeries, TimeSeriesPoint};
use serde::Serialize;
use serde_json::{json, Value};

pub const CSV_FILE_NAME: &str = "ts_ndvi.csv";
pub const GEOJSON_FILE_NAME: &str = "ts_ndvi.geojson";
pub const PARQUET_FILE_NAME: &str = "ts_ndvi.parquet";

/// Name of the exported AOI layer.
pub const LAYER_NAME: &str = "ndvi_bbox";

const NOTE_COLUMN: &str = "note";
const MARKER_PREFIX: &str = "fallback_demo: ";
const CRS84: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

/// Paths written by [`export_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFiles {
    pub csv: PathBuf,
    pub parquet: PathBuf,
    pub geojson: PathBuf,
}

/// Write both exports into `dir`, creating it if needed.
pub fn export_all(series: &TimeSeries, params: &RunParams, dir: &Path) -> Result<ExportedFiles> {
    fs::create_dir_all(dir)?;
    let files = ExportedFiles {
        csv: dir.join(CSV_FILE_NAME),
        parquet: dir.join(PARQUET_FILE_NAME),
        geojson: dir.join(GEOJSON_FILE_NAME),
    };
    write_csv(series, &files.csv)?;
    write_parquet(series, &files.parquet)?;
    write_geojson(series, params, &files.geojson)?;
    tracing::info!(csv = %files.csv.display(), parquet = %files.parquet.display(), geojson = %files.geojson.display(), "Series exported");
    Ok(files)
}

fn csv_error(path: &Path, e: csv::Error) -> Error {
    Error::Export(format!("{}: {e}", path.display()))
}

pub fn write_csv(series: &TimeSeries, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    let marker = series.provenance().marker();

    let mut header = vec!["date", series.index_name()];
    if marker.is_some() {
        header.push(NOTE_COLUMN);
    }
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    for point in series.points() {
        let date = point.date.format("%Y-%m-%d").to_string();
        let value = point.value.map(|v| v.to_string()).unwrap_or_default();
        let result = match &marker {
            Some(note) => writer.write_record([date.as_str(), value.as_str(), note.as_str()]),
            None => writer.write_record([date.as_str(), value.as_str()]),
        };
        result.map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a series written by [`write_csv`].
///
/// Empty and `NaN` values come back as gaps. A `note` column restores
/// synthetic provenance; otherwise the series is measured, with every row
/// counted as a used scene.
pub fn read_csv(path: &Path) -> Result<TimeSeries> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();

    if headers.get(0) != Some("date") || headers.len() < 2 {
        return Err(Error::Export(format!(
            "{}: expected a 'date,<INDEX>' header, found {:?}",
            path.display(),
            headers.iter().collect::<Vec<_>>()
        )));
    }
    let index_name = headers.get(1).unwrap_or_default().to_string();
    let note_col = headers.iter().position(|h| h == NOTE_COLUMN);

    let mut points = Vec::new();
    let mut note: Option<String> = None;
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .map_err(|e| Error::Export(format!("{}: bad date '{raw_date}': {e}", path.display())))?;
        let value = parse_value(record.get(1).unwrap_or_default())
            .map_err(|raw| Error::Export(format!("{}: bad value '{raw}' on {date}", path.display())))?;
        if note.is_none() {
            note = note_col.and_then(|i| record.get(i)).filter(|n| !n.is_empty()).map(str::to_string);
        }
        points.push(TimeSeriesPoint::new(date, value));
    }

    let provenance = provenance_from_note(note.as_deref(), points.len());
    TimeSeries::new(index_name, points, provenance)
}

/// Synthetic when a marker note is present, measured otherwise with every
/// row counted as a used scene.
fn provenance_from_note(note: Option<&str>, rows: usize) -> Provenance {
    match note {
        Some(note) => Provenance::Synthetic {
            reason: note.strip_prefix(MARKER_PREFIX).unwrap_or(note).to_string(),
        },
        None => Provenance::Measured {
            scenes_used: rows,
            scenes_skipped: 0,
        },
    }
}

fn parquet_error(path: &Path, e: PolarsError) -> Error {
    Error::Export(format!("{}: {e}", path.display()))
}

/// Series as a `date`, `<INDEX>` [, `note`] frame. Dates are ISO strings.
pub fn series_frame(series: &TimeSeries) -> std::result::Result<DataFrame, PolarsError> {
    let dates: Vec<String> = series.dates().map(|d| d.format("%Y-%m-%d").to_string()).collect();
    let values: Vec<Option<f64>> = series.points().iter().map(|p| p.value).collect();

    let mut columns = vec![
        Column::new("date".into(), dates),
        Column::new(series.index_name().into(), values),
    ];
    if let Some(marker) = series.provenance().marker() {
        columns.push(Column::new(NOTE_COLUMN.into(), vec![marker; series.len()]));
    }
    DataFrame::new(columns)
}

pub fn write_parquet(series: &TimeSeries, path: &Path) -> Result<()> {
    let mut frame = series_frame(series).map_err(|e| parquet_error(path, e))?;
    let file = File::create(path)?;
    ParquetWriter::new(file)
        .finish(&mut frame)
        .map_err(|e| parquet_error(path, e))?;
    Ok(())
}

/// Read a series written by [`write_parquet`]. Nulls and `NaN` are gaps.
pub fn read_parquet(path: &Path) -> Result<TimeSeries> {
    let frame = ParquetReader::new(File::open(path)?)
        .finish()
        .map_err(|e| parquet_error(path, e))?;

    let columns = frame.get_columns();
    if columns.len() < 2 || columns[0].name().as_str() != "date" {
        return Err(Error::Export(format!(
            "{}: expected 'date' and an index column, found {:?}",
            path.display(),
            frame.get_column_names()
        )));
    }
    let index_name = columns[1].name().to_string();

    let dates = columns[0].as_materialized_series().str().map_err(|e| parquet_error(path, e))?;
    let values = columns[1].as_materialized_series().f64().map_err(|e| parquet_error(path, e))?;

    let mut points = Vec::with_capacity(frame.height());
    for (raw_date, value) in dates.into_iter().zip(values.into_iter()) {
        let raw_date = raw_date.unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .map_err(|e| Error::Export(format!("{}: bad date '{raw_date}': {e}", path.display())))?;
        points.push(TimeSeriesPoint::new(date, value.filter(|v| v.is_finite())));
    }

    let note = match frame.column(NOTE_COLUMN) {
        Ok(column) => column
            .as_materialized_series()
            .str()
            .map_err(|e| parquet_error(path, e))?
            .into_iter()
            .flatten()
            .find(|n| !n.is_empty())
            .map(str::to_string),
        Err(_) => None,
    };
    let provenance = provenance_from_note(note.as_deref(), points.len());
    TimeSeries::new(index_name, points, provenance)
}

fn parse_value(raw: &str) -> std::result::Result<Option<f64>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Ok(None),
        Err(_) => Err(raw.to_string()),
    }
}

/// The AOI feature collection for a series.
pub fn feature_collection(series: &TimeSeries, params: &RunParams) -> FeatureCollection {
    let summary = series.summary();
    let prefix = series.index_name().to_lowercase();

    let mut properties = JsonObject::new();
    properties.insert("resolution_m".into(), json!(params.resolution_m()));
    properties.insert("start_date".into(), json!(params.start().to_string()));
    properties.insert("end_date".into(), json!(params.end().to_string()));
    properties.insert("n_obs".into(), json!(summary.n_obs));
    properties.insert(format!("{prefix}_mean"), json!(summary.mean));
    properties.insert(format!("{prefix}_min"), json!(summary.min));
    properties.insert(format!("{prefix}_max"), json!(summary.max));
    properties.insert("synthetic".into(), json!(series.is_synthetic()));

    let polygon = params.bbox().to_polygon();
    let feature = Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::from(&polygon))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    };

    let mut members = JsonObject::new();
    members.insert("name".into(), Value::from(LAYER_NAME));
    members.insert("crs".into(), json!({"type": "name", "properties": {"name": CRS84}}));

    FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: Some(members),
    }
}

pub fn write_geojson(series: &TimeSeries, params: &RunParams, path: &Path) -> Result<()> {
    let collection = feature_collection(series, params);
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &collection)
        .map_err(|e| Error::Export(format!("{}: {e}", path.display())))
}
