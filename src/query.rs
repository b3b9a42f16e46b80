//! Dashboard read path: the readings feed and the cascading filter options.
//!
//! Filters narrow from equipment to component to measurement point. Each
//! option list is scoped by the coarser choices already made, and the feed
//! only returns rows matching the whole selection. A selection with nothing
//! chosen is capped by a row limit so the unscoped view stays bounded.
//!
//! All reads are memoized through [`QueryCache`]. Query failures can be
//! isolated with [`or_empty`]; connection failures always propagate.

use chrono::NaiveDateTime;
use log::{debug, warn};
use rusqlite::{Row, types::Value};
use serde::Serialize;

use crate::{
    cache::{CacheKey, QueryCache, memoize},
    error::{MonitorError, Result},
    store::{Database, value_text},
    values::{TIMESTAMP_FORMAT, parse_number, parse_timestamp},
};

pub const DEFAULT_ROW_LIMIT: usize = 1000;

pub const READING_COLUMNS: [&str; 14] = [
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
    "excellent",
    "acceptable",
    "requires_evaluation",
    "unacceptable",
];

const READINGS_SQL: &str = "SELECT \
    d.equipment_tag_id, d.equipment_name, d.component, d.point_measurement, \
    d.date, d.value, d.unit, d.status, d.note, d.alarm_standard, \
    s.excellent, s.acceptable, s.requires_evaluation, s.unacceptable \
    FROM data d \
    LEFT JOIN alarm_standards s ON d.alarm_standard = s.standard \
    WHERE d.value IS NOT NULL";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub equipment_tag_id: Option<String>,
    pub equipment_name: Option<String>,
    pub component: Option<String>,
    pub point_measurement: Option<String>,
    pub date: NaiveDateTime,
    pub value: f64,
    pub unit: Option<String>,
    pub status: Option<String>,
    pub note: Option<String>,
    pub alarm_standard: Option<String>,
    pub excellent: Option<String>,
    pub acceptable: Option<String>,
    pub requires_evaluation: Option<String>,
    pub unacceptable: Option<String>,
}

impl Reading {
    /// Cells in [`READING_COLUMNS`] order, for table and CSV output.
    pub fn cells(&self) -> Vec<String> {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        vec![
            text(&self.equipment_tag_id),
            text(&self.equipment_name),
            text(&self.component),
            text(&self.point_measurement),
            self.date.format(TIMESTAMP_FORMAT).to_string(),
            self.value.to_string(),
            text(&self.unit),
            text(&self.status),
            text(&self.note),
            text(&self.alarm_standard),
            text(&self.excellent),
            text(&self.acceptable),
            text(&self.requires_evaluation),
            text(&self.unacceptable),
        ]
    }
}

/// Filter choices, coarsest first. A finer level requires the coarser ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    equipment: Option<String>,
    component: Option<String>,
    point: Option<String>,
}

impl FilterSelection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(
        equipment: Option<String>,
        component: Option<String>,
        point: Option<String>,
    ) -> Result<Self> {
        if component.is_some() && equipment.is_none() {
            return Err(MonitorError::InvalidSelection(
                "a component can only be chosen after an equipment".into(),
            ));
        }
        if point.is_some() && component.is_none() {
            return Err(MonitorError::InvalidSelection(
                "a measurement point can only be chosen after a component".into(),
            ));
        }
        Ok(Self {
            equipment,
            component,
            point,
        })
    }

    pub fn equipment(&self) -> Option<&str> {
        self.equipment.as_deref()
    }

    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    pub fn point(&self) -> Option<&str> {
        self.point.as_deref()
    }

    pub fn is_unscoped(&self) -> bool {
        self.equipment.is_none()
    }

    fn conditions(&self) -> Vec<(&'static str, &str)> {
        [
            ("d.equipment_name", self.equipment()),
            ("d.component", self.component()),
            ("d.point_measurement", self.point()),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, v)))
        .collect()
    }
}

/// SQL and bind values for the readings feed.
pub fn readings_statement(
    selection: &FilterSelection,
    limit: Option<usize>,
    row_cap: usize,
) -> (String, Vec<Value>) {
    let mut sql = READINGS_SQL.to_string();
    let mut params = Vec::new();
    for (column, value) in selection.conditions() {
        params.push(Value::Text(value.to_string()));
        sql.push_str(&format!(" AND {column} = ?{}", params.len()));
    }
    sql.push_str(" ORDER BY d.date DESC");
    let limit = match limit {
        Some(limit) if selection.is_unscoped() => Some(limit.min(row_cap)),
        Some(limit) => Some(limit),
        None if selection.is_unscoped() => Some(row_cap),
        None => None,
    };
    if let Some(limit) = limit {
        params.push(Value::Integer(limit as i64));
        sql.push_str(&format!(" LIMIT ?{}", params.len()));
    }
    (sql, params)
}

pub struct ReadingsRepository<'a> {
    db: &'a Database,
    cache: &'a dyn QueryCache,
    row_cap: usize,
}

impl<'a> ReadingsRepository<'a> {
    pub fn new(db: &'a Database, cache: &'a dyn QueryCache, row_cap: usize) -> Self {
        Self { db, cache, row_cap }
    }

    /// Readings matching `selection`, newest first. Rows whose date cannot be
    /// read are left out.
    pub fn load_readings(
        &self,
        selection: &FilterSelection,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>> {
        let limit_arg = limit.map(|l| l.to_string());
        let key = CacheKey::new(
            "readings",
            &[
                selection.equipment(),
                selection.component(),
                selection.point(),
                limit_arg.as_deref(),
            ],
        );
        memoize(self.cache, key, || self.fetch_readings(selection, limit))
    }

    fn fetch_readings(
        &self,
        selection: &FilterSelection,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>> {
        let (sql, params) = readings_statement(selection, limit, self.row_cap);
        debug!("Loading readings: {sql}");
        self.db.with_connection(|conn| {
            let context = "readings feed";
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|err| MonitorError::query(context, err))?;
            let mut rows = stmt
                .query(rusqlite::params_from_iter(params.iter()))
                .map_err(|err| MonitorError::query(context, err))?;
            let mut readings = Vec::new();
            let mut undated = 0usize;
            while let Some(row) = rows.next().map_err(|err| MonitorError::query(context, err))? {
                match reading_from_row(row).map_err(|err| MonitorError::query(context, err))? {
                    Some(reading) => readings.push(reading),
                    None => undated += 1,
                }
            }
            if undated > 0 {
                warn!("Skipped {undated} reading(s) with an unreadable date or value");
            }
            Ok(readings)
        })
    }

    pub fn equipment_options(&self) -> Result<Vec<String>> {
        self.options("equipment_options", "equipment_name", &[])
    }

    pub fn component_options(&self, equipment: &str) -> Result<Vec<String>> {
        self.options(
            "component_options",
            "component",
            &[("equipment_name", equipment)],
        )
    }

    pub fn point_options(&self, equipment: &str, component: &str) -> Result<Vec<String>> {
        self.options(
            "point_options",
            "point_measurement",
            &[("equipment_name", equipment), ("component", component)],
        )
    }

    fn options(
        &self,
        function: &'static str,
        column: &'static str,
        scope: &[(&'static str, &str)],
    ) -> Result<Vec<String>> {
        let args = scope.iter().map(|(_, value)| Some(*value)).collect::<Vec<_>>();
        let key = CacheKey::new(function, &args);
        memoize(self.cache, key, || {
            let mut sql = format!("SELECT DISTINCT {column} FROM data WHERE {column} IS NOT NULL");
            for (idx, (scope_column, _)) in scope.iter().enumerate() {
                sql.push_str(&format!(" AND {scope_column} = ?{}", idx + 1));
            }
            sql.push_str(&format!(" ORDER BY {column}"));
            self.db.with_connection(|conn| {
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|err| MonitorError::query(function, err))?;
                let values = scope.iter().map(|(_, value)| *value);
                let mut rows = stmt
                    .query(rusqlite::params_from_iter(values))
                    .map_err(|err| MonitorError::query(function, err))?;
                let mut options = Vec::new();
                while let Some(row) = rows.next().map_err(|err| MonitorError::query(function, err))? {
                    let value = row
                        .get_ref(0)
                        .map_err(|err| MonitorError::query(function, err))?;
                    if let Some(text) = value_text(value).filter(|t| !t.trim().is_empty()) {
                        options.push(text);
                    }
                }
                Ok(options)
            })
        })
    }
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<Option<Reading>> {
    let text = |idx: usize| row.get_ref(idx).map(value_text);
    let Some(date) = text(4)?.as_deref().and_then(parse_timestamp) else {
        return Ok(None);
    };
    let value = match row.get_ref(5)? {
        rusqlite::types::ValueRef::Integer(i) => Some(i as f64),
        rusqlite::types::ValueRef::Real(f) => Some(f),
        other => value_text(other).as_deref().and_then(parse_number),
    };
    let Some(value) = value else {
        return Ok(None);
    };
    Ok(Some(Reading {
        equipment_tag_id: text(0)?,
        equipment_name: text(1)?,
        component: text(2)?,
        point_measurement: text(3)?,
        date,
        value,
        unit: text(6)?,
        status: text(7)?,
        note: text(8)?,
        alarm_standard: text(9)?,
        excellent: text(10)?,
        acceptable: text(11)?,
        requires_evaluation: text(12)?,
        unacceptable: text(13)?,
    }))
}

/// Turns a query failure into an empty result so one broken feature does not
/// take the rest of the dashboard down. Other errors propagate.
pub fn or_empty<T: Default>(result: Result<T>) -> Result<T> {
    match result {
        Err(err @ MonitorError::Query { .. }) => {
            warn!("{err}");
            debug!("{err:?}");
            Ok(T::default())
        }
        other => other,
    }
}
