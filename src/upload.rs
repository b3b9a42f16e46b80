//! The upload pipeline: read, normalize, reconcile, validate, de-duplicate,
//! append. Any failure before the append leaves the table untouched, and
//! the append itself runs in one transaction.

use std::path::Path;

use chrono::NaiveDateTime;
use encoding_rs::Encoding;
use log::{debug, info};

use crate::{
    cache::QueryCache,
    duplicates::{check_duplicates, drop_blank_keys},
    error::{MonitorError, Result},
    io_utils,
    normalize::normalize_columns,
    reconcile::{SchemaPolicy, reconcile},
    store::Database,
    tables::Table,
    values::validate_values,
};

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub table: Table,
    pub policy: SchemaPolicy,
    /// `None` detects `;` or `,` from the header line.
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl UploadOptions {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            policy: SchemaPolicy::default(),
            delimiter: None,
            encoding: encoding_rs::UTF_8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub rows_appended: usize,
    pub ignored_columns: Vec<String>,
    pub blank_keys_dropped: usize,
    pub uncoercible_keys: usize,
    pub synthesized_identifiers: bool,
}

impl UploadReport {
    pub fn summary(&self) -> String {
        format!("{} rows added.", self.rows_appended)
    }
}

pub fn run_upload(
    db: &Database,
    cache: &dyn QueryCache,
    path: &Path,
    options: &UploadOptions,
    now: NaiveDateTime,
) -> Result<UploadReport> {
    let table = options.table;
    let raw = io_utils::read_upload(path, options.delimiter, options.encoding)?;
    debug!(
        "Read {} row(s) with header(s) {:?} from {path:?}",
        raw.row_count(),
        raw.headers
    );
    if raw.is_empty() {
        return Err(MonitorError::EmptyUpload);
    }

    let normalized = normalize_columns(raw, table, now);
    let mut frame = normalized.frame;
    let blank_keys_dropped = drop_blank_keys(&mut frame, table);

    let columns = db.table_columns(table)?;
    let destination = columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
    let mut frame = reconcile(&frame, table, &destination, options.policy)?;
    validate_values(&mut frame, table)?;

    let checked = check_duplicates(db, table, &columns, frame)?;
    if checked.frame.is_empty() {
        return Err(MonitorError::EmptyUpload);
    }

    let rows_appended = db.append(table, &columns, &checked.frame)?;
    cache.invalidate_all();
    info!("Appended {rows_appended} row(s) to {table}");

    Ok(UploadReport {
        rows_appended,
        ignored_columns: normalized.ignored,
        blank_keys_dropped,
        uncoercible_keys: checked.uncoercible_keys,
        synthesized_identifiers: normalized.synthesized_identifiers,
    })
}
