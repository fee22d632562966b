//! Parsing of forecast export files.
//!
//! Export jobs write one or more CSV parts with a header such as
//! `item_id,date,p10,p50,p90`. Every column other than `item_id` and `date`
//! is a forecast type.

use std::collections::BTreeMap;

use coldcast_core::{Error, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub item_id: String,
    pub date: String,
    pub values: BTreeMap<String, f64>,
}

/// All rows from every export part.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportedForecast {
    pub forecast_types: Vec<String>,
    pub rows: Vec<ExportRow>,
}

impl ExportedForecast {
    /// Append another export part; its forecast types must match.
    pub fn merge(&mut self, part: ExportedForecast) -> Result<()> {
        if self.rows.is_empty() && self.forecast_types.is_empty() {
            *self = part;
            return Ok(());
        }
        if part.forecast_types != self.forecast_types {
            return Err(Error::InvalidData(format!(
                "export parts disagree on forecast types: {:?} vs {:?}",
                self.forecast_types, part.forecast_types
            )));
        }
        self.rows.extend(part.rows);
        Ok(())
    }

    pub fn for_item<'a>(&'a self, item_id: &'a str) -> impl Iterator<Item = &'a ExportRow> + 'a {
        self.rows.iter().filter(move |r| r.item_id == item_id)
    }

    pub fn item_count(&self) -> usize {
        let mut items: Vec<&str> = self.rows.iter().map(|r| r.item_id.as_str()).collect();
        items.sort_unstable();
        items.dedup();
        items.len()
    }
}

pub fn parse_export(data: &[u8]) -> Result<ExportedForecast> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);
    let headers = reader
        .headers()
        .map_err(|e| Error::Csv(e.to_string()))?
        .clone();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::Csv(format!("export is missing '{}' column", name)))
    };
    let item_col = position("item_id")?;
    let date_col = position("date")?;
    let value_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != item_col && *i != date_col)
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| Error::Csv(e.to_string()))?;
        let mut values = BTreeMap::new();
        for (col, name) in &value_cols {
            let raw = record.get(*col).unwrap_or_default();
            if raw.is_empty() {
                continue;
            }
            let value = raw.parse::<f64>().map_err(|_| {
                Error::InvalidData(format!("row {}: bad {} value '{}'", idx + 1, name, raw))
            })?;
            values.insert(name.clone(), value);
        }
        rows.push(ExportRow {
            item_id: record.get(item_col).unwrap_or_default().to_string(),
            date: record.get(date_col).unwrap_or_default().to_string(),
            values,
        });
    }

    Ok(ExportedForecast {
        forecast_types: value_cols.into_iter().map(|(_, name)| name).collect(),
        rows,
    })
}
