//! Header recognition: maps arbitrary upload headers onto canonical column
//! names and fills in generated identifiers when the upload has none.
//!
//! Header matching happens in two passes over a fixed alias table:
//!
//! 1. the header normalized by [`normalize_header`] (lowercase, trimmed,
//!    spaces and parentheses replaced by `_`);
//! 2. the snake_case form of the raw header, so `EquipmentName` is recognized
//!    as well as `Equipment Name`.
//!
//! Canonical names always map to themselves, which keeps normalization
//! idempotent. Headers that match nothing are reported back as ignored and
//! their columns are dropped.

use std::{
    collections::{HashMap, HashSet},
    sync::OnceLock,
};

use chrono::NaiveDateTime;
use heck::ToSnakeCase;
use log::{info, warn};
use regex::Regex;

use crate::{frame::Frame, tables::Table};

pub const IDENTIFIER_PREFIX: &str = "ID";

const ALIASES: &[(&str, &str)] = &[
    ("measurement_point", "point_measurement"),
    ("point_of_measurement", "point_measurement"),
    ("tag", "equipment_tag_id"),
    ("tag_id", "equipment_tag_id"),
    ("equipment_tag", "equipment_tag_id"),
    ("equipment_id", "equipment_tag_id"),
    ("equipment", "equipment_name"),
    ("timestamp", "date"),
    ("datetime", "date"),
    ("date_time", "date"),
    ("reading", "value"),
    ("units", "unit"),
    ("notes", "note"),
    ("comment", "note"),
    ("comments", "note"),
    ("remarks", "note"),
    ("id", "identifier"),
    ("requires_evaluations", "requires_evaluation"),
];

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\s()]").expect("static header pattern"))
}

fn lookup_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map = HashMap::new();
        for table in Table::ALL {
            for column in table.known_columns() {
                map.insert(*column, *column);
            }
        }
        for (source, canonical) in ALIASES {
            map.insert(*source, *canonical);
        }
        map
    })
}

/// Lowercases and trims `raw`, replacing whitespace and parentheses with `_`.
pub fn normalize_header(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    header_pattern().replace_all(&lowered, "_").into_owned()
}

/// Resolves a raw header to its canonical column name, if recognized.
pub fn canonical_name(raw: &str) -> Option<&'static str> {
    let table = lookup_table();
    table
        .get(normalize_header(raw).as_str())
        .or_else(|| table.get(raw.trim().to_snake_case().as_str()))
        .copied()
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedUpload {
    pub frame: Frame,
    pub ignored: Vec<String>,
    pub synthesized_identifiers: bool,
}

/// Renames recognized columns, drops the rest, and synthesizes the table key
/// when the table allows it and no header maps to it.
pub fn normalize_columns(frame: Frame, table: Table, now: NaiveDateTime) -> NormalizedUpload {
    let mut keep = Vec::new();
    let mut renamed = Vec::new();
    let mut seen = HashSet::new();
    let mut ignored = Vec::new();

    for (idx, header) in frame.headers.iter().enumerate() {
        match canonical_name(header) {
            Some(canonical) if seen.insert(canonical) => {
                keep.push(idx);
                renamed.push(canonical.to_string());
            }
            Some(canonical) => {
                warn!("Column '{header}' duplicates '{canonical}' and is ignored");
                ignored.push(header.clone());
            }
            None => ignored.push(header.clone()),
        }
    }
    if !ignored.is_empty() {
        warn!("Ignoring unrecognized column(s): {}", ignored.join(", "));
    }

    let mut normalized = frame.project(&keep);
    normalized.headers = renamed;

    let mut synthesized_identifiers = false;
    let missing_key = table
        .unique_key()
        .filter(|key| table.synthesizes_key() && normalized.column_index(key).is_none());
    if let Some(key) = missing_key {
        let generated = synthesize_identifiers(normalized.row_count(), now);
        normalized.push_column(key, generated.into_iter().map(Some).collect());
        synthesized_identifiers = true;
        info!(
            "No '{key}' column in upload; generated {} identifier(s)",
            normalized.row_count()
        );
    }

    NormalizedUpload {
        frame: normalized,
        ignored,
        synthesized_identifiers,
    }
}

/// Generates `count` identifiers unique within the batch. Uniqueness against
/// stored rows is left to the duplicate check.
pub fn synthesize_identifiers(count: usize, now: NaiveDateTime) -> Vec<String> {
    let stamp = now.format("%Y%m%d%H%M%S");
    (1..=count)
        .map(|ordinal| format!("{IDENTIFIER_PREFIX}-{stamp}-{ordinal:06}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::cell;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(8, 15, 0)
            .unwrap()
    }

    fn frame(headers: &[&str]) -> Frame {
        let mut frame = Frame::new(headers.iter().map(|h| h.to_string()).collect());
        frame.push_row(headers.iter().map(|h| cell(&format!("{h}-1"))).collect());
        frame.push_row(headers.iter().map(|h| cell(&format!("{h}-2"))).collect());
        frame
    }

    #[test]
    fn normalize_header_replaces_spaces_and_parentheses() {
        assert_eq!(normalize_header("  Value (mm/s) "), "value__mm/s_");
        assert_eq!(normalize_header("Equipment Name"), "equipment_name");
    }

    #[test]
    fn canonical_name_handles_aliases_and_camel_case() {
        assert_eq!(canonical_name("Measurement_Point"), Some("point_measurement"));
        assert_eq!(canonical_name("EquipmentName"), Some("equipment_name"));
        assert_eq!(canonical_name("Time Stamp"), None);
        assert_eq!(canonical_name("TimeStamp"), Some("date"));
        assert_eq!(canonical_name("Requires Evaluation"), Some("requires_evaluation"));
    }

    #[test]
    fn unmatched_headers_are_reported_and_dropped() {
        let normalized = normalize_columns(
            frame(&["Identifier", "Colour", "Value"]),
            Table::Data,
            now(),
        );
        assert_eq!(normalized.ignored, vec!["Colour"]);
        assert_eq!(normalized.frame.headers, vec!["identifier", "value"]);
        assert_eq!(normalized.frame.rows[1][1].as_deref(), Some("Value-2"));
        assert!(!normalized.synthesized_identifiers);
    }

    #[test]
    fn second_mapping_to_same_column_is_ignored() {
        let normalized =
            normalize_columns(frame(&["Value", "Reading"]), Table::AlarmStandards, now());
        assert_eq!(normalized.frame.headers, vec!["value"]);
        assert_eq!(normalized.ignored, vec!["Reading"]);
    }

    #[test]
    fn synthesizes_identifier_for_data_only() {
        let data = normalize_columns(frame(&["Value"]), Table::Data, now());
        assert!(data.synthesized_identifiers);
        assert_eq!(data.frame.headers, vec!["value", "identifier"]);
        assert_eq!(
            data.frame.rows[0][1].as_deref(),
            Some("ID-20240305081500-000001")
        );

        let standards = normalize_columns(frame(&["Excellent"]), Table::AlarmStandards, now());
        assert!(!standards.synthesized_identifiers);
        assert_eq!(standards.frame.headers, vec!["excellent"]);
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            picks in proptest::collection::vec(0usize..11, 1..8)
        ) {
            let canonical = Table::Data.known_columns();
            let mut headers = picks.iter().map(|i| canonical[*i]).collect::<Vec<_>>();
            headers.sort();
            headers.dedup();
            let once = normalize_columns(frame(&headers), Table::Component, now());
            let again = normalize_columns(once.frame.clone(), Table::Component, now());
            prop_assert_eq!(&once.frame.headers, &headers);
            prop_assert_eq!(once.frame, again.frame);
            prop_assert!(again.ignored.is_empty());
        }

        #[test]
        fn synthesized_identifiers_are_unique(count in 1usize..2000) {
            let ids = synthesize_identifiers(count, now());
            let distinct = ids.iter().collect::<HashSet<_>>();
            prop_assert_eq!(ids.len(), count);
            prop_assert_eq!(distinct.len(), count);
        }
    }
}
