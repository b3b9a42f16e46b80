//! Uniqueness-key enforcement for uploads.
//!
//! The key column comes from the table registry; tables without a key skip
//! these checks. Stored keys are fetched with one `IN (...)` lookup per chunk
//! of incoming keys rather than one query per row.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use rusqlite::types::Value;

use crate::{
    error::{MonitorError, Result},
    frame::Frame,
    io_utils::format_number,
    store::{Affinity, ColumnInfo, Database},
    tables::Table,
};

#[derive(Debug, Clone, PartialEq)]
pub struct KeyCheck {
    pub frame: Frame,
    /// Rows removed because their key could not be read as a number.
    pub uncoercible_keys: usize,
}

/// Removes rows whose uniqueness key is null or blank. Returns the count removed.
pub fn drop_blank_keys(frame: &mut Frame, table: Table) -> usize {
    let Some(idx) = table.unique_key().and_then(|key| frame.column_index(key)) else {
        return 0;
    };
    let removed = frame.retain_rows(|row| {
        row[idx]
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty())
    });
    if removed > 0 {
        warn!("Dropped {removed} row(s) with a blank '{}'", frame.headers[idx]);
    }
    removed
}

/// A key as compared (text) and as bound to the lookup statement.
fn coerce_key(raw: &str, affinity: Affinity) -> Option<(String, Value)> {
    let raw = raw.trim();
    match affinity {
        Affinity::Text => Some((raw.to_string(), Value::Text(raw.to_string()))),
        Affinity::Integer => {
            let parsed = raw.parse::<i64>().ok().or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| f as i64)
            })?;
            Some((parsed.to_string(), Value::Integer(parsed)))
        }
        Affinity::Real => {
            let parsed = raw.parse::<f64>().ok().filter(|f| f.is_finite())?;
            Some((format_number(parsed), Value::Real(parsed)))
        }
    }
}

/// Keys present in both sets, sorted.
pub fn conflicting_keys(incoming: &BTreeSet<String>, existing: &BTreeSet<String>) -> Vec<String> {
    incoming.intersection(existing).cloned().collect()
}

/// Rejects the batch when any incoming key repeats within the batch or is
/// already stored; otherwise passes the rows through.
pub fn check_duplicates(
    db: &Database,
    table: Table,
    columns: &[ColumnInfo],
    mut frame: Frame,
) -> Result<KeyCheck> {
    let Some(key) = table.unique_key() else {
        debug!("{table} has no uniqueness key; skipping duplicate check");
        return Ok(KeyCheck {
            frame,
            uncoercible_keys: 0,
        });
    };
    let Some(idx) = frame.column_index(key) else {
        warn!("{table} upload has no '{key}' column; skipping duplicate check");
        return Ok(KeyCheck {
            frame,
            uncoercible_keys: 0,
        });
    };
    let affinity = columns
        .iter()
        .find(|c| c.name == key)
        .map(ColumnInfo::affinity)
        .unwrap_or(Affinity::Text);

    let mut keys = Vec::with_capacity(frame.row_count());
    let uncoercible_keys = frame.retain_rows(|row| {
        match row[idx].as_deref().and_then(|raw| coerce_key(raw, affinity)) {
            Some(coerced) => {
                keys.push(coerced);
                true
            }
            None => false,
        }
    });
    if uncoercible_keys > 0 {
        warn!("Dropped {uncoercible_keys} row(s) whose '{key}' is not numeric");
    }
    for (row, (text, _)) in frame.rows.iter_mut().zip(&keys) {
        row[idx] = Some(text.clone());
    }

    let mut counts = BTreeMap::<&str, usize>::new();
    for (text, _) in &keys {
        *counts.entry(text.as_str()).or_default() += 1;
    }
    let repeated = counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(text, _)| text.to_string())
        .collect::<Vec<_>>();
    if !repeated.is_empty() {
        return Err(MonitorError::DuplicateKeysInBatch {
            column: key.to_string(),
            keys: repeated,
        });
    }

    let incoming = keys.iter().map(|(text, _)| text.clone()).collect::<BTreeSet<_>>();
    let bind = keys.into_iter().map(|(_, value)| value).collect::<Vec<_>>();
    let existing = db.existing_keys(table, key, &bind)?;
    let conflicts = conflicting_keys(&incoming, &existing);
    if !conflicts.is_empty() {
        return Err(MonitorError::DuplicateKeyConflict {
            table: table.to_string(),
            column: key.to_string(),
            keys: conflicts,
        });
    }

    Ok(KeyCheck {
        frame,
        uncoercible_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::cell;
    use proptest::prelude::*;

    #[test]
    fn drop_blank_keys_only_touches_keyed_tables() {
        let mut frame = Frame::new(vec!["standard".into(), "excellent".into()]);
        frame.push_row(vec![cell("ISO"), cell("< 2")]);
        frame.push_row(vec![None, cell("< 3")]);
        let mut untouched = frame.clone();

        assert_eq!(drop_blank_keys(&mut frame, Table::AlarmStandards), 1);
        assert_eq!(frame.row_count(), 1);
        assert_eq!(drop_blank_keys(&mut untouched, Table::Equipment), 0);
        assert_eq!(untouched.row_count(), 2);
    }

    #[test]
    fn coerce_key_normalizes_numbers() {
        assert_eq!(
            coerce_key("12.0", Affinity::Integer),
            Some(("12".to_string(), Value::Integer(12)))
        );
        assert_eq!(
            coerce_key(" 7 ", Affinity::Real),
            Some(("7".to_string(), Value::Real(7.0)))
        );
        assert_eq!(coerce_key("P-7", Affinity::Integer), None);
        assert_eq!(
            coerce_key(" P-7", Affinity::Text),
            Some(("P-7".to_string(), Value::Text("P-7".into())))
        );
    }

    proptest! {
        #[test]
        fn conflicts_are_exactly_the_intersection(
            incoming in proptest::collection::btree_set("[a-h]{1,2}", 0..12),
            existing in proptest::collection::btree_set("[a-h]{1,2}", 0..12),
        ) {
            let conflicts = conflicting_keys(&incoming, &existing);
            let expected = incoming.intersection(&existing).cloned().collect::<Vec<_>>();
            prop_assert_eq!(conflicts.is_empty(), incoming.is_disjoint(&existing));
            prop_assert_eq!(conflicts, expected);
        }
    }
}
