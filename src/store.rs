//! Database access through an injected connection factory.
//!
//! Every operation opens its own connection, runs its statements and drops
//! the connection before returning; nothing is pooled between calls.

use std::{
    collections::BTreeSet,
    path::PathBuf,
    time::Duration,
};

use log::debug;
use rusqlite::{
    Connection, OpenFlags, params_from_iter,
    types::{Value, ValueRef},
};

use crate::{
    error::{MonitorError, Result},
    frame::Frame,
    io_utils::format_number,
    tables::Table,
};

/// SQLite refuses statements with more bind parameters than this on older builds.
pub const MAX_BIND_PARAMS: usize = 900;

pub trait ConnectionFactory: Send + Sync {
    fn connect(&self) -> Result<Connection>;

    /// Human-readable target used in diagnostics.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct SqliteConnectionFactory {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnectionFactory {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
        }
    }
}

impl ConnectionFactory for SqliteConnectionFactory {
    fn connect(&self) -> Result<Connection> {
        let connection_error = |source| MonitorError::Connection {
            target: self.describe(),
            source,
        };
        // The dashboard never creates schema, so a missing file is a connection failure.
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(connection_error)?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(connection_error)?;
        Ok(conn)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Declared shape of one destination column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Real,
    Text,
}

impl ColumnInfo {
    /// Binding affinity derived from the declared type. Date-like types stay text.
    pub fn affinity(&self) -> Affinity {
        let declared = self
            .declared_type
            .as_deref()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if declared.contains("INT") {
            Affinity::Integer
        } else if declared.contains("CHAR") || declared.contains("CLOB") || declared.contains("TEXT")
        {
            Affinity::Text
        } else if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]
            .iter()
            .any(|token| declared.contains(token))
        {
            Affinity::Real
        } else {
            Affinity::Text
        }
    }
}

pub struct Database {
    factory: Box<dyn ConnectionFactory>,
}

impl Database {
    pub fn new(factory: impl ConnectionFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
        }
    }

    pub fn describe(&self) -> String {
        self.factory.describe()
    }

    /// Runs `f` on a fresh connection that is closed as soon as `f` returns.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.factory.connect()?;
        f(&conn)
    }

    pub fn ping(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|err| MonitorError::query("ping", err))
        })
    }

    /// Destination columns in table order, read from a zero-row query.
    pub fn table_columns(&self, table: Table) -> Result<Vec<ColumnInfo>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT * FROM {} LIMIT 0", quote_ident(table.as_str()));
            let stmt = conn
                .prepare(&sql)
                .map_err(|err| MonitorError::query(format!("columns of {table}"), err))?;
            let columns = stmt
                .columns()
                .into_iter()
                .map(|column| ColumnInfo {
                    name: column.name().to_string(),
                    declared_type: column.decl_type().map(str::to_string),
                })
                .collect::<Vec<_>>();
            Ok(columns)
        })
    }

    /// Subset of `keys` already stored in `column`, rendered as key text.
    pub fn existing_keys(
        &self,
        table: Table,
        column: &str,
        keys: &[Value],
    ) -> Result<BTreeSet<String>> {
        if keys.is_empty() {
            return Ok(BTreeSet::new());
        }
        self.with_connection(|conn| {
            let mut found = BTreeSet::new();
            for chunk in keys.chunks(MAX_BIND_PARAMS) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "SELECT DISTINCT {col} FROM {tbl} WHERE {col} IN ({placeholders})",
                    col = quote_ident(column),
                    tbl = quote_ident(table.as_str()),
                );
                let context = || format!("existing {column} in {table}");
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|err| MonitorError::query(context(), err))?;
                let mut rows = stmt
                    .query(params_from_iter(chunk.iter()))
                    .map_err(|err| MonitorError::query(context(), err))?;
                while let Some(row) = rows.next().map_err(|err| MonitorError::query(context(), err))? {
                    let value = row
                        .get_ref(0)
                        .map_err(|err| MonitorError::query(context(), err))?;
                    if let Some(text) = value_text(value) {
                        found.insert(text);
                    }
                }
            }
            debug!(
                "{} of {} incoming key(s) already present in {table}.{column}",
                found.len(),
                keys.len()
            );
            Ok(found)
        })
    }

    /// Inserts every row of `frame` inside one transaction. Columns of
    /// `frame` must already match `columns` by name and order.
    pub fn append(&self, table: Table, columns: &[ColumnInfo], frame: &Frame) -> Result<usize> {
        let write_error = |source| MonitorError::Write {
            table: table.to_string(),
            source,
        };
        let mut conn = self.factory.connect()?;
        let tx = conn.transaction().map_err(write_error)?;
        {
            let column_list = columns
                .iter()
                .map(|c| quote_ident(&c.name))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = vec!["?"; columns.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
                quote_ident(table.as_str())
            );
            let mut stmt = tx.prepare(&sql).map_err(write_error)?;
            for row in &frame.rows {
                let values = columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| bind_value(column, cell.as_deref()));
                stmt.execute(params_from_iter(values))
                    .map_err(write_error)?;
            }
        }
        // Dropping an uncommitted transaction rolls it back, so an error above keeps nothing.
        tx.commit().map_err(write_error)?;
        Ok(frame.row_count())
    }
}

/// Converts a cell to the SQL value matching the column's affinity.
pub fn bind_value(column: &ColumnInfo, cell: Option<&str>) -> Value {
    let Some(text) = cell else {
        return Value::Null;
    };
    match column.affinity() {
        Affinity::Integer => text
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(text.to_string())),
        Affinity::Real => text
            .parse::<f64>()
            .map(Value::Real)
            .unwrap_or_else(|_| Value::Text(text.to_string())),
        Affinity::Text => Value::Text(text.to_string()),
    }
}

/// Text form of a stored value; `None` for SQL NULL.
pub fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(format_number(f)),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
