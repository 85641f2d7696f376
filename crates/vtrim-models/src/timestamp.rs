//! Timestamp parsing for trim bounds.
//!
//! Clients may send bounds either as plain seconds or as `HH:MM:SS`,
//! `HH:MM:SS.mmm`, `MM:SS` and `SS` strings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A trim bound as sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TimeValue {
    Seconds(f64),
    Timestamp(String),
}

impl TimeValue {
    pub fn to_seconds(&self) -> Result<f64, TimestampError> {
        match self {
            TimeValue::Seconds(secs) => Ok(*secs),
            TimeValue::Timestamp(ts) => parse_timestamp(ts),
        }
    }
}

impl From<f64> for TimeValue {
    fn from(secs: f64) -> Self {
        TimeValue::Seconds(secs)
    }
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use vtrim_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    if parts.len() > 3 {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    const COMPONENTS: [&str; 3] = ["seconds", "minutes", "hours"];
    let mut total = 0.0;
    for (idx, part) in parts.iter().rev().enumerate() {
        let value: f64 = part
            .parse()
            .map_err(|_| TimestampError::InvalidValue(COMPONENTS[idx], part.to_string()))?;
        if value < 0.0 {
            return Err(TimestampError::Negative);
        }
        if !value.is_finite() {
            return Err(TimestampError::InvalidValue(COMPONENTS[idx], part.to_string()));
        }
        total += value * 60f64.powi(idx as i32);
    }
    Ok(total)
}

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm string.
pub fn format_seconds(total_secs: f64) -> String {
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("timestamp cannot be empty")]
    Empty,

    #[error("timestamp cannot be negative")]
    Negative,

    #[error("invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("invalid timestamp format '{0}', use HH:MM:SS, MM:SS or seconds")]
    InvalidFormat(String),
}
