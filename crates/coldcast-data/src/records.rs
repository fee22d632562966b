//! Target time series and item metadata records.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use coldcast_core::schema::parse_timestamp;
use coldcast_core::{Error, Result, Schema};
use serde::{Deserialize, Serialize};

/// One observation of the target time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub timestamp: String,
    /// Empty in the CSV when the observation is missing.
    pub target_value: Option<f64>,
    pub item_id: String,
}

/// Static attributes of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub item_id: String,
    pub category: String,
}

/// Item/record counts and time range of a target time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub items: usize,
    pub records: usize,
    pub missing_values: usize,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl SeriesSummary {
    pub fn of(series: &[TargetRecord]) -> Self {
        let items: BTreeSet<&str> = series.iter().map(|r| r.item_id.as_str()).collect();
        let mut timestamps: Vec<&str> = series.iter().map(|r| r.timestamp.as_str()).collect();
        // Timestamps are validated on read and share one format, so lexical order is time order.
        timestamps.sort_unstable();
        Self {
            items: items.len(),
            records: series.len(),
            missing_values: series.iter().filter(|r| r.target_value.is_none()).count(),
            start: timestamps.first().map(|s| s.to_string()),
            end: timestamps.last().map(|s| s.to_string()),
        }
    }
}

/// Rows of a CSV with the column positions resolved against `schema`.
///
/// Files may come with a header row (any column order) or without one, in
/// which case the schema's column order is assumed.
fn read_rows(data: &[u8], schema: &Schema) -> Result<Vec<(usize, Vec<String>)>> {
    let columns = schema.column_names();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut rows = Vec::new();
    let mut positions: Vec<usize> = (0..columns.len()).collect();

    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| Error::Csv(e.to_string()))?;
        let line = idx + 1;

        if idx == 0 && record.iter().any(|f| f == columns[0]) {
            let header: HashMap<&str, usize> =
                record.iter().enumerate().map(|(i, f)| (f, i)).collect();
            positions = columns
                .iter()
                .map(|c| {
                    header
                        .get(c)
                        .copied()
                        .ok_or_else(|| Error::Csv(format!("missing column '{}' in header", c)))
                })
                .collect::<Result<_>>()?;
            continue;
        }

        let fields = positions
            .iter()
            .map(|&p| {
                record.get(p).map(str::to_string).ok_or_else(|| {
                    Error::Csv(format!(
                        "line {}: expected {} columns, found {}",
                        line,
                        columns.len(),
                        record.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push((line, fields));
    }

    Ok(rows)
}

pub fn parse_target_series(data: &[u8]) -> Result<Vec<TargetRecord>> {
    read_rows(data, &Schema::target_time_series())?
        .into_iter()
        .map(|(line, f)| {
            parse_timestamp(&f[0])
                .map_err(|e| Error::InvalidData(format!("line {}: {}", line, e)))?;
            let target_value = if f[1].is_empty() {
                None
            } else {
                Some(f[1].parse::<f64>().map_err(|_| {
                    Error::InvalidData(format!("line {}: bad target_value '{}'", line, f[1]))
                })?)
            };
            if f[2].is_empty() {
                return Err(Error::InvalidData(format!("line {}: empty item_id", line)));
            }
            Ok(TargetRecord {
                timestamp: f[0].clone(),
                target_value,
                item_id: f[2].clone(),
            })
        })
        .collect()
}

pub fn parse_item_metadata(data: &[u8]) -> Result<Vec<ItemMetadata>> {
    read_rows(data, &Schema::item_metadata())?
        .into_iter()
        .map(|(line, mut f)| {
            if f[0].is_empty() {
                return Err(Error::InvalidData(format!("line {}: empty item_id", line)));
            }
            let category = f.pop().unwrap_or_default();
            let item_id = f.pop().unwrap_or_default();
            Ok(ItemMetadata { item_id, category })
        })
        .collect()
}

pub fn read_target_series(path: &Path) -> Result<Vec<TargetRecord>> {
    let data = std::fs::read(path)?;
    parse_target_series(&data)
}

pub fn read_item_metadata(path: &Path) -> Result<Vec<ItemMetadata>> {
    let data = std::fs::read(path)?;
    parse_item_metadata(&data)
}

fn encode<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).map_err(|e| Error::Csv(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Csv(e.to_string()))
}

/// Header-less CSV in schema column order, as import jobs expect.
pub fn encode_target_series(series: &[TargetRecord]) -> Result<Vec<u8>> {
    encode(series)
}

pub fn encode_item_metadata(metadata: &[ItemMetadata]) -> Result<Vec<u8>> {
    encode(metadata)
}
