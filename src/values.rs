//! Typed checks for reading rows: timestamps, numeric values and status labels.
//!
//! Only the reading tables (`data` and `alarm`) carry typed columns the
//! dashboard relies on; other tables pass through untouched. Values are rewritten to their canonical
//! text form so stored timestamps sort chronologically.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    error::{MonitorError, Result},
    frame::Frame,
    io_utils::format_number,
    tables::Table,
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Excellent,
    Acceptable,
    RequiresEvaluation,
    Unacceptable,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Excellent => "excellent",
            Status::Acceptable => "acceptable",
            Status::RequiresEvaluation => "requires_evaluation",
            Status::Unacceptable => "unacceptable",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ();

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let token = value
            .trim()
            .to_lowercase()
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_");
        match token.as_str() {
            "excellent" => Ok(Status::Excellent),
            "acceptable" => Ok(Status::Acceptable),
            "requires_evaluation" => Ok(Status::RequiresEvaluation),
            "unacceptable" => Ok(Status::Unacceptable),
            _ => Err(()),
        }
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];

    let value = value.trim();
    // Offsets are dropped: readings keep the wall-clock time written in the file.
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Parses a reading value, accepting a decimal comma when no point is present.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let parsed = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replacen(',', ".", 1).parse::<f64>()
    } else {
        trimmed.parse::<f64>()
    };
    parsed.ok().filter(|n| n.is_finite())
}

#[derive(Debug, Clone, Copy)]
enum Check {
    Timestamp,
    Number,
    Status,
}

impl Check {
    fn expected(&self) -> &'static str {
        match self {
            Check::Timestamp => "a timestamp",
            Check::Number => "a number",
            Check::Status => "excellent, acceptable, requires_evaluation or unacceptable",
        }
    }

    fn canonical(&self, value: &str) -> Option<String> {
        match self {
            Check::Timestamp => {
                parse_timestamp(value).map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
            }
            Check::Number => parse_number(value).map(format_number),
            Check::Status => value.parse::<Status>().ok().map(|s| s.as_str().to_string()),
        }
    }
}

fn checks_for(table: Table) -> &'static [(&'static str, Check)] {
    match table {
        Table::Data => &[
            ("date", Check::Timestamp),
            ("value", Check::Number),
            ("status", Check::Status),
        ],
        Table::Alarm => &[("date", Check::Timestamp), ("status", Check::Status)],
        Table::AlarmStandards | Table::Equipment | Table::Component => &[],
    }
}

/// Rewrites typed columns of `frame` to canonical text, failing on the first
/// cell that cannot be read with that cell's source line. Blank cells stay null.
pub fn validate_values(frame: &mut Frame, table: Table) -> Result<()> {
    for (column, check) in checks_for(table) {
        let Some(idx) = frame.column_index(column) else {
            continue;
        };
        let lines = &frame.lines;
        for (row_idx, row) in frame.rows.iter_mut().enumerate() {
            let Some(raw) = row[idx].as_deref() else {
                continue;
            };
            let canonical = check.canonical(raw).ok_or_else(|| MonitorError::InvalidValue {
                row: lines.get(row_idx).copied().unwrap_or(row_idx + 2),
                column: column.to_string(),
                value: raw.to_string(),
                expected: check.expected(),
            })?;
            row[idx] = Some(canonical);
        }
    }
    Ok(())
}
