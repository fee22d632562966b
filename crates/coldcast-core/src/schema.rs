//! Dataset schemas and time-series frequency.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Attribute data type understood by the forecasting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
    Float,
    Timestamp,
    Geolocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaAttribute {
    pub attribute_name: String,
    pub attribute_type: AttributeType,
}

impl SchemaAttribute {
    pub fn new(name: &str, attribute_type: AttributeType) -> Self {
        Self {
            attribute_name: name.to_string(),
            attribute_type,
        }
    }
}

/// Ordered attribute list. Order must match the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Schema {
    pub attributes: Vec<SchemaAttribute>,
}

impl Schema {
    /// `timestamp, target_value, item_id`
    pub fn target_time_series() -> Self {
        Self {
            attributes: vec![
                SchemaAttribute::new("timestamp", AttributeType::Timestamp),
                SchemaAttribute::new("target_value", AttributeType::Float),
                SchemaAttribute::new("item_id", AttributeType::String),
            ],
        }
    }

    /// `item_id, category`
    pub fn item_metadata() -> Self {
        Self {
            attributes: vec![
                SchemaAttribute::new("item_id", AttributeType::String),
                SchemaAttribute::new("category", AttributeType::String),
            ],
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .map(|a| a.attribute_name.as_str())
            .collect()
    }
}

/// Sampling frequency of a target time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFrequency {
    #[serde(rename = "Y")]
    Yearly,
    #[serde(rename = "M")]
    Monthly,
    #[serde(rename = "W")]
    Weekly,
    #[serde(rename = "D")]
    Daily,
    #[serde(rename = "H")]
    Hourly,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "10min")]
    TenMinutes,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "1min")]
    OneMinute,
}

impl DataFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yearly => "Y",
            Self::Monthly => "M",
            Self::Weekly => "W",
            Self::Daily => "D",
            Self::Hourly => "H",
            Self::ThirtyMinutes => "30min",
            Self::FifteenMinutes => "15min",
            Self::TenMinutes => "10min",
            Self::FiveMinutes => "5min",
            Self::OneMinute => "1min",
        }
    }

    fn is_sub_daily(&self) -> bool {
        !matches!(
            self,
            Self::Yearly | Self::Monthly | Self::Weekly | Self::Daily
        )
    }

    /// Timestamp format passed to dataset import jobs.
    pub fn timestamp_format(&self) -> &'static str {
        if self.is_sub_daily() {
            "yyyy-MM-dd HH:mm:ss"
        } else {
            "yyyy-MM-dd"
        }
    }

    /// Render a timestamp the way import jobs expect for this frequency.
    pub fn render(&self, ts: &NaiveDateTime) -> String {
        if self.is_sub_daily() {
            ts.format("%Y-%m-%d %H:%M:%S").to_string()
        } else {
            ts.format("%Y-%m-%d").to_string()
        }
    }

    /// Advance `ts` by `periods` steps of this frequency.
    pub fn advance(&self, ts: NaiveDateTime, periods: u32) -> Option<NaiveDateTime> {
        let n = periods as i64;
        match self {
            Self::Yearly => ts.checked_add_months(Months::new(periods.checked_mul(12)?)),
            Self::Monthly => ts.checked_add_months(Months::new(periods)),
            Self::Weekly => ts.checked_add_signed(Duration::weeks(n)),
            Self::Daily => ts.checked_add_signed(Duration::days(n)),
            Self::Hourly => ts.checked_add_signed(Duration::hours(n)),
            Self::ThirtyMinutes => ts.checked_add_signed(Duration::minutes(30 * n)),
            Self::FifteenMinutes => ts.checked_add_signed(Duration::minutes(15 * n)),
            Self::TenMinutes => ts.checked_add_signed(Duration::minutes(10 * n)),
            Self::FiveMinutes => ts.checked_add_signed(Duration::minutes(5 * n)),
            Self::OneMinute => ts.checked_add_signed(Duration::minutes(n)),
        }
    }
}

impl FromStr for DataFrequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Y" => Ok(Self::Yearly),
            "M" => Ok(Self::Monthly),
            "W" => Ok(Self::Weekly),
            "D" => Ok(Self::Daily),
            "H" => Ok(Self::Hourly),
            "30min" => Ok(Self::ThirtyMinutes),
            "15min" => Ok(Self::FifteenMinutes),
            "10min" => Ok(Self::TenMinutes),
            "5min" => Ok(Self::FiveMinutes),
            "1min" => Ok(Self::OneMinute),
            other => Err(Error::Config(format!("unsupported data frequency: {}", other))),
        }
    }
}

impl fmt::Display for DataFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a CSV timestamp (`yyyy-MM-dd`, `yyyy-MM-dd HH:mm:ss` or ISO `T` form).
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Error::InvalidData(format!("unparseable timestamp: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_wire_format() {
        let json = serde_json::to_value(Schema::item_metadata()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Attributes": [
                    {"AttributeName": "item_id", "AttributeType": "string"},
                    {"AttributeName": "category", "AttributeType": "string"},
                ]
            })
        );
        assert_eq!(
            Schema::target_time_series().column_names(),
            vec!["timestamp", "target_value", "item_id"]
        );
    }

    #[test]
    fn test_frequency_parse_and_format() {
        let freq: DataFrequency = "H".parse().unwrap();
        assert_eq!(freq, DataFrequency::Hourly);
        assert_eq!(freq.timestamp_format(), "yyyy-MM-dd HH:mm:ss");
        assert_eq!(DataFrequency::Daily.timestamp_format(), "yyyy-MM-dd");
        assert!("2H".parse::<DataFrequency>().is_err());
        assert_eq!(
            serde_json::to_string(&DataFrequency::FifteenMinutes).unwrap(),
            "\"15min\""
        );
    }

    #[test]
    fn test_frequency_advance() {
        let ts = parse_timestamp("2020-01-31").unwrap();
        assert_eq!(
            DataFrequency::Daily.render(&DataFrequency::Daily.advance(ts, 2).unwrap()),
            "2020-02-02"
        );
        assert_eq!(
            DataFrequency::Monthly.render(&DataFrequency::Monthly.advance(ts, 1).unwrap()),
            "2020-02-29"
        );
        let hourly = parse_timestamp("2020-01-01 23:00:00").unwrap();
        assert_eq!(
            DataFrequency::Hourly.render(&DataFrequency::Hourly.advance(hourly, 2).unwrap()),
            "2020-01-02 01:00:00"
        );
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert!(parse_timestamp("2020-01-01").is_ok());
        assert!(parse_timestamp("2020-01-01 10:00:00").is_ok());
        assert!(parse_timestamp("2020-01-01T10:00:00").is_ok());
        assert!(parse_timestamp("01/01/2020").is_err());
    }
}
