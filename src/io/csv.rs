use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DgError, Result};
use crate::events::{EdgeEvent, Event};
use crate::types::NodeId;

/// Column layout of an edge-list CSV file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Column holding the source node id.
    pub src_col: String,
    /// Column holding the destination node id.
    pub dst_col: String,
    /// Column holding the event timestamp.
    pub time_col: String,
    /// Columns holding one feature dimension each, in order.
    pub edge_feature_cols: Option<Vec<String>>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            src_col: "src".into(),
            dst_col: "dst".into(),
            time_col: "t".into(),
            edge_feature_cols: None,
        }
    }
}

impl CsvOptions {
    /// Sets the feature columns.
    pub fn edge_feature_cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edge_feature_cols = Some(cols.into_iter().map(Into::into).collect());
        self
    }
}

/// Reads one edge event per row.
///
/// Header lookup is case-insensitive. A row whose feature cells are all
/// blank reads as a featureless edge. Other missing or unparsable values
/// fail with the offending column and row number.
pub fn read_csv(path: impl AsRef<Path>, opts: &CsvOptions) -> Result<Vec<Event>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let src_index = find_column(&headers, &opts.src_col)?;
    let dst_index = find_column(&headers, &opts.dst_col)?;
    let time_index = find_column(&headers, &opts.time_col)?;
    let feature_indices = opts
        .edge_feature_cols
        .iter()
        .flatten()
        .map(|col| Ok((find_column(&headers, col)?, col.as_str())))
        .collect::<Result<Vec<_>>>()?;

    let mut events = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let row = row + 1;
        let src: u64 = parse_field(&record, src_index, &opts.src_col, row)?;
        let dst: u64 = parse_field(&record, dst_index, &opts.dst_col, row)?;
        let time: i64 = parse_field(&record, time_index, &opts.time_col, row)?;
        let featureless = !feature_indices.is_empty()
            && feature_indices
                .iter()
                .all(|(idx, _)| record.get(*idx).map_or(true, |v| v.trim().is_empty()));
        let features = if opts.edge_feature_cols.is_some() && !featureless {
            let values = feature_indices
                .iter()
                .map(|(idx, col)| parse_field::<f32>(&record, *idx, col, row))
                .collect::<Result<Vec<_>>>()?;
            Some(Array1::from(values).into_dyn())
        } else {
            None
        };
        events.push(Event::Edge(EdgeEvent {
            time,
            src: NodeId(src),
            dst: NodeId(dst),
            features,
        }));
    }
    debug!(path = %path.display(), events = events.len(), "io.csv.read");
    Ok(events)
}

/// Writes edge events as one row each.
///
/// Featureless edges leave their feature cells blank. Fails on node events,
/// on features of rank above one, and when a feature vector does not match
/// the configured feature columns.
pub fn write_csv(events: &[Event], path: impl AsRef<Path>, opts: &CsvOptions) -> Result<()> {
    let path = path.as_ref();
    let feature_cols = opts.edge_feature_cols.as_deref().unwrap_or(&[]);
    let mut writer = WriterBuilder::new().from_path(path)?;
    let mut header = Vec::with_capacity(3 + feature_cols.len());
    header.push(opts.src_col.as_str());
    header.push(opts.dst_col.as_str());
    header.push(opts.time_col.as_str());
    header.extend(feature_cols.iter().map(String::as_str));
    writer.write_record(&header)?;

    for event in events {
        let Event::Edge(edge) = event else {
            return Err(DgError::Unsupported("writing node events to an edge-list csv"));
        };
        let mut row = Vec::with_capacity(header.len());
        row.push(edge.src.to_string());
        row.push(edge.dst.to_string());
        row.push(edge.time.to_string());
        if let Some(features) = &edge.features {
            if opts.edge_feature_cols.is_none() {
                return Err(DgError::invalid(
                    "no feature columns configured but events carry features",
                ));
            }
            if features.ndim() > 1 {
                return Err(DgError::Unsupported("multi-dimensional features in csv"));
            }
            if features.len() != feature_cols.len() {
                return Err(DgError::invalid(format!(
                    "got {}-dimensional features but {} feature columns",
                    features.len(),
                    feature_cols.len()
                )));
            }
            row.extend(features.iter().map(f32::to_string));
        } else {
            row.extend(std::iter::repeat(String::new()).take(feature_cols.len()));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), events = events.len(), "io.csv.written");
    Ok(())
}

fn find_column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| DgError::invalid(format!("column '{name}' not found")))
}

fn parse_field<T: std::str::FromStr>(
    record: &StringRecord,
    idx: usize,
    name: &str,
    row: usize,
) -> Result<T> {
    let raw = record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DgError::invalid(format!("missing value for column '{name}' in row {row}")))?;
    raw.parse().map_err(|_| {
        DgError::invalid(format!("cannot parse '{raw}' in column '{name}' at row {row}"))
    })
}
