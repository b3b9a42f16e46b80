//! Upload decoding and output writers.
//!
//! All upload file I/O flows through this module:
//!
//! - **Format detection**: spreadsheet extensions (`xlsx`, `xlsm`, `xls`,
//!   `xlsb`, `ods`) are read with `calamine` (first sheet only); anything else
//!   is treated as delimited text.
//! - **Delimiter detection**: `;` anywhere in the first line selects semicolon,
//!   otherwise comma. An explicit delimiter always wins.
//! - **Encoding**: text is decoded via `encoding_rs` with BOM sniffing,
//!   defaulting to UTF-8.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use anyhow::{Result as AnyResult, anyhow};
use calamine::{Data, DataType, Reader, open_workbook_auto};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    error::{MonitorError, Result},
    frame::{Frame, cell},
};

pub const COMMA: u8 = b',';
pub const SEMICOLON: u8 = b';';

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

pub fn resolve_encoding(label: Option<&str>) -> AnyResult<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

pub fn detect_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.contains(';') {
        SEMICOLON
    } else {
        COMMA
    }
}

/// Reads an upload file into a [`Frame`] with the file's own header names.
pub fn read_upload(
    path: &Path,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<Frame> {
    if is_spreadsheet(path) {
        read_spreadsheet(path)
    } else {
        let bytes = fs::read(path).map_err(|err| MonitorError::input(path, err))?;
        read_delimited(path, &bytes, delimiter, encoding)
    }
}

pub fn read_delimited(
    path: &Path,
    bytes: &[u8],
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<Frame> {
    let text = decode_text(bytes, encoding).map_err(|err| MonitorError::input(path, err))?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&text));
    debug!(
        "Reading {:?} as delimited text (delimiter '{}')",
        path,
        crate::printable_delimiter(delimiter)
    );

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| MonitorError::input(path, err))?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(MonitorError::input(path, "file has no header row"));
    }

    let mut frame = Frame::new(headers);
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|err| {
            MonitorError::input(path, format!("row {}: {err}", idx + 2))
        })?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let line = record
            .position()
            .map_or(idx + 2, |position| position.line() as usize);
        frame.push_row_at(line, record.iter().map(cell).collect());
    }
    Ok(frame)
}

fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> AnyResult<String> {
    // `decode` sniffs and strips a UTF-8/UTF-16 BOM before falling back to `encoding`.
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!("Failed to decode text with encoding {}", used.name()))
    } else {
        Ok(text.into_owned())
    }
}

fn read_spreadsheet(path: &Path) -> Result<Frame> {
    let mut workbook = open_workbook_auto(path).map_err(|err| MonitorError::input(path, err))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| MonitorError::input(path, "workbook has no sheets"))?
        .map_err(|err| MonitorError::input(path, err))?;
    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or_else(|| MonitorError::input(path, "first sheet is empty"))?
        .iter()
        .map(|c| sheet_cell(c).unwrap_or_default())
        .collect::<Vec<_>>();
    debug!("Reading {:?} first sheet ({} column(s))", path, headers.len());

    // Sheet row numbers as shown in the workbook, header row included.
    let header_row = range.start().map_or(1, |(row, _)| row as usize + 1);
    let mut frame = Frame::new(headers);
    for (idx, row) in rows.enumerate() {
        let values = row.iter().map(sheet_cell).collect::<Vec<_>>();
        if values.iter().all(Option::is_none) {
            continue;
        }
        frame.push_row_at(header_row + idx + 1, values);
    }
    Ok(frame)
}

fn sheet_cell(value: &Data) -> Option<String> {
    match value {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => cell(s),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(format_number(*f)),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(_) => value
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
    }
}

/// Renders whole floats without a fractional part so spreadsheet keys such as
/// `12.0` compare equal to their text form `12`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

pub fn open_stdout_csv_writer(delimiter: u8) -> csv::Writer<Box<dyn Write>> {
    let out: Box<dyn Write> = Box::new(io::stdout());
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .double_quote(true)
        .from_writer(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("upload.csv")
    }

    #[test]
    fn detects_semicolon_from_first_line_only() {
        assert_eq!(detect_delimiter("a;b\n1,2"), SEMICOLON);
        assert_eq!(detect_delimiter("a,b\n1;2"), COMMA);
        assert_eq!(detect_delimiter(""), COMMA);
    }

    #[test]
    fn strips_utf8_bom_from_first_header() {
        let bytes = b"\xEF\xBB\xBFIdentifier;Value\nA;1\n";
        let frame = read_delimited(&path(), bytes, None, UTF_8).unwrap();
        assert_eq!(frame.headers, vec!["Identifier", "Value"]);
        assert_eq!(frame.rows[0], vec![Some("A".into()), Some("1".into())]);
    }

    #[test]
    fn decodes_legacy_encoding() {
        let bytes = b"note\ncaf\xE9\n";
        let frame = read_delimited(&path(), bytes, None, WINDOWS_1252).unwrap();
        assert_eq!(frame.rows[0][0].as_deref(), Some("café"));
    }

    #[test]
    fn explicit_delimiter_overrides_detection() {
        let bytes = b"a;b|c\n1;2|3\n";
        let frame = read_delimited(&path(), bytes, Some(b'|'), UTF_8).unwrap();
        assert_eq!(frame.headers, vec!["a;b", "c"]);
    }

    #[test]
    fn skips_blank_lines_and_pads_short_rows() {
        let bytes = b"a,b,c\n1,2\n,,\n4,5,6\n";
        let frame = read_delimited(&path(), bytes, None, UTF_8).unwrap();
        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.rows[0][2], None);
        assert_eq!(frame.lines, vec![2, 4]);
    }

    #[test]
    fn rows_keep_their_file_line_after_empty_lines() {
        let bytes = b"a,b
1,2


3,4
";
        let frame = read_delimited(&path(), bytes, None, UTF_8).unwrap();
        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.lines, vec![2, 5]);
    }

    #[test]
    fn spreadsheet_extensions_are_recognized() {
        assert!(is_spreadsheet(Path::new("readings.XLSX")));
        assert!(is_spreadsheet(Path::new("readings.ods")));
        assert!(!is_spreadsheet(Path::new("readings.csv")));
        assert!(!is_spreadsheet(Path::new("readings")));
    }

    #[test]
    fn whole_floats_render_as_integers() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(2.5), "2.5");
    }
}
