//! Plain-text rendering of readings, column listings and option lists.

use std::fmt::Write as _;

use itertools::Itertools;

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header. Line breaks and tabs inside cells are flattened.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(flatten(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", line(headers.iter().copied(), &widths));
    let rule = widths.iter().map(|w| "-".repeat((*w).max(3))).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", line(rule.iter().map(String::as_str), &widths));
    for row in rows {
        let cells = row.iter().map(|cell| flatten(cell)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", line(cells.iter().map(String::as_str), &widths));
    }
    output
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .join("  ")
        .trim_end()
        .to_string()
}

fn flatten(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}
