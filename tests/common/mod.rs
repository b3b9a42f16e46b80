#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use equipment_monitor::store::{Database, SqliteConnectionFactory};
use rusqlite::Connection;
use tempfile::{TempDir, tempdir};

pub const SCHEMA: &str = "
CREATE TABLE data (
    identifier TEXT,
    equipment_tag_id TEXT,
    equipment_name TEXT,
    component TEXT,
    point_measurement TEXT,
    date TIMESTAMP,
    value REAL,
    unit TEXT,
    status TEXT,
    note TEXT,
    alarm_standard TEXT
);
CREATE TABLE alarm_standards (
    standard TEXT,
    excellent TEXT,
    acceptable TEXT,
    requires_evaluation TEXT,
    unacceptable TEXT
);
CREATE TABLE equipment (
    equipment_tag_id TEXT,
    equipment_name TEXT,
    area TEXT,
    description TEXT
);
CREATE TABLE alarm (
    equipment_tag_id TEXT,
    component TEXT,
    point_measurement TEXT,
    date TIMESTAMP,
    status TEXT,
    note TEXT
);
CREATE TABLE component (
    point INTEGER,
    equipment_tag_id TEXT,
    equipment_name TEXT,
    component TEXT,
    point_measurement TEXT,
    alarm_standard TEXT
);
";

/// Fixed clock for uploads that synthesize identifiers.
pub fn upload_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|date| date.and_hms_opt(8, 0, 0))
        .expect("valid timestamp")
}

/// Scratch directory holding a SQLite file with every monitored table.
pub struct TestWorkspace {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("temp dir");
        let db_path = temp_dir.path().join("monitor.db");
        let conn = Connection::open(&db_path).expect("create database");
        conn.execute_batch(SCHEMA).expect("create tables");
        Self { temp_dir, db_path }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn database(&self) -> Database {
        Database::new(SqliteConnectionFactory::new(
            &self.db_path,
            Duration::from_millis(500),
        ))
    }

    pub fn execute(&self, sql: &str) {
        let conn = Connection::open(&self.db_path).expect("open database");
        conn.execute_batch(sql).expect("execute sql");
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = Connection::open(&self.db_path).expect("open database");
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count rows")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Inserts a reading straight into `data`, bypassing the upload pipeline.
    pub fn insert_reading(&self, id: &str, equipment: &str, component: &str, point: &str, date: &str, value: f64) {
        let conn = Connection::open(&self.db_path).expect("open database");
        conn.execute(
            "INSERT INTO data (identifier, equipment_tag_id, equipment_name, component, \
             point_measurement, date, value, unit, status, note, alarm_standard) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'mm/s', 'acceptable', NULL, 'ISO-10816')",
            rusqlite::params![id, format!("TAG-{equipment}"), equipment, component, point, date, value],
        )
        .expect("insert reading");
    }

    pub fn insert_standard(&self, standard: &str) {
        self.execute(&format!(
            "INSERT INTO alarm_standards VALUES ('{standard}', '< 2.8', '2.8 - 7.1', '7.1 - 11', '> 11')"
        ));
    }
}

/// Semicolon-separated readings using the display spelling of the point column.
pub const READINGS_SEMICOLON: &str = "\
Equipment_Tag_ID;Equipment_Name;Component;Measurement_Point;Date;Value;Unit;Status;Note;Alarm_Standard
TAG-P101;Pump 101;Motor;DE Horizontal;2024-05-01 10:00:00;2,5;mm/s;Excellent;;ISO-10816
TAG-P101;Pump 101;Motor;NDE Vertical;2024-05-02 10:00:00;4,1;mm/s;Acceptable;checked;ISO-10816
TAG-P101;Pump 101;Pump;Inlet;2024-05-03 10:00:00;7,9;mm/s;Requires Evaluation;;ISO-10816
";

/// The same readings with identifiers supplied by the upload.
pub const READINGS_WITH_IDENTIFIERS: &str = "\
Identifier;Equipment_Tag_ID;Equipment_Name;Component;Measurement_Point;Date;Value;Unit;Status;Note;Alarm_Standard
P101-001;TAG-P101;Pump 101;Motor;DE Horizontal;2024-05-01 10:00:00;2,5;mm/s;Excellent;;ISO-10816
P101-002;TAG-P101;Pump 101;Motor;NDE Vertical;2024-05-02 10:00:00;4,1;mm/s;Acceptable;checked;ISO-10816
P101-003;TAG-P101;Pump 101;Pump;Inlet;2024-05-03 10:00:00;7,9;mm/s;Requires Evaluation;;ISO-10816
";
