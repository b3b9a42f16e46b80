//! Registry of destination tables and their uniqueness keys.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Data,
    AlarmStandards,
    Equipment,
    Alarm,
    Component,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Data,
        Table::AlarmStandards,
        Table::Equipment,
        Table::Alarm,
        Table::Component,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Data => "data",
            Table::AlarmStandards => "alarm_standards",
            Table::Equipment => "equipment",
            Table::Alarm => "alarm",
            Table::Component => "component",
        }
    }

    /// Column whose values must be unique across stored and incoming rows.
    pub fn unique_key(&self) -> Option<&'static str> {
        match self {
            Table::Data => Some("identifier"),
            Table::AlarmStandards => Some("standard"),
            Table::Component => Some("point"),
            Table::Equipment | Table::Alarm => None,
        }
    }

    /// Whether a missing key column may be filled with generated identifiers.
    pub fn synthesizes_key(&self) -> bool {
        matches!(self, Table::Data)
    }

    /// Canonical column names as the dashboard knows them. The live schema is
    /// always read from the database; this list only feeds header recognition.
    pub fn known_columns(&self) -> &'static [&'static str] {
        match self {
            Table::Data => &[
                "identifier",
                "equipment_tag_id",
                "equipment_name",
                "component",
                "point_measurement",
                "date",
                "value",
                "unit",
                "status",
                "note",
                "alarm_standard",
            ],
            Table::AlarmStandards => &[
                "standard",
                "excellent",
                "acceptable",
                "requires_evaluation",
                "unacceptable",
            ],
            Table::Equipment => &["equipment_tag_id", "equipment_name", "area", "description"],
            Table::Alarm => &[
                "equipment_tag_id",
                "component",
                "point_measurement",
                "date",
                "status",
                "note",
            ],
            Table::Component => &[
                "point",
                "equipment_tag_id",
                "equipment_name",
                "component",
                "point_measurement",
                "alarm_standard",
            ],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = MonitorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        Table::ALL
            .into_iter()
            .find(|table| table.as_str() == lowered)
            .ok_or_else(|| MonitorError::UnknownTable(value.to_string()))
    }
}
