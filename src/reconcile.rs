//! Aligns a normalized upload with the destination table's columns.

use std::collections::BTreeSet;

use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::{MonitorError, Result},
    frame::Frame,
    tables::Table,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SchemaPolicy {
    /// Upload columns must equal the table's columns exactly
    #[default]
    Strict,
    /// Upload must cover the table's columns; extra columns are dropped
    Lenient,
}

/// Returns `frame` with exactly `destination`'s columns, in destination order.
///
/// Under [`SchemaPolicy::Strict`] any difference fails with both the missing
/// and the extra columns. Under [`SchemaPolicy::Lenient`] only missing
/// columns fail; extras are dropped.
pub fn reconcile(
    frame: &Frame,
    table: Table,
    destination: &[String],
    policy: SchemaPolicy,
) -> Result<Frame> {
    let uploaded = frame.headers.iter().map(String::as_str).collect::<BTreeSet<_>>();
    let expected = destination.iter().map(String::as_str).collect::<BTreeSet<_>>();

    let missing = owned(expected.difference(&uploaded));
    let extra = owned(uploaded.difference(&expected));
    debug!(
        "Reconciling {} upload column(s) with {table} ({} column(s)) under {policy:?}",
        uploaded.len(),
        expected.len()
    );

    let fails = match policy {
        SchemaPolicy::Strict => !missing.is_empty() || !extra.is_empty(),
        SchemaPolicy::Lenient => !missing.is_empty(),
    };
    if fails {
        return Err(MonitorError::SchemaMismatch {
            table: table.to_string(),
            missing,
            extra,
        });
    }
    if !extra.is_empty() {
        info!("Dropping column(s) not in {table}: {}", extra.join(", "));
    }

    let indices = destination
        .iter()
        .filter_map(|name| frame.column_index(name))
        .collect::<Vec<_>>();
    Ok(frame.project(&indices))
}

fn owned<'a>(names: impl Iterator<Item = &'a &'a str>) -> Vec<String> {
    names.map(|name| name.to_string()).collect()
}
