//! In-memory tabular batch carried through the upload pipeline.
//!
//! Blank cells are stored as `None` so that "null" means the same thing for
//! CSV text and spreadsheet cells.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    /// Source line of each row, counting the header as line 1. Kept in step
    /// with `rows` so errors point at the line the user has to fix.
    pub lines: Vec<usize>,
}

impl Frame {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Appends a row on the line after the previous one.
    pub fn push_row(&mut self, row: Vec<Option<String>>) {
        let line = self.lines.last().map_or(2, |last| last + 1);
        self.push_row_at(line, row);
    }

    /// Appends a row read from source `line`, padding or truncating it to the
    /// header width.
    pub fn push_row_at(&mut self, line: usize, mut row: Vec<Option<String>>) {
        row.resize(self.headers.len(), None);
        self.rows.push(row);
        self.lines.push(line);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Source line of the row at `idx`.
    pub fn line(&self, idx: usize) -> usize {
        self.lines.get(idx).copied().unwrap_or(idx + 2)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<String>>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.headers.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Builds a new frame holding only `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Frame {
        Frame {
            headers: indices.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
            lines: self.lines.clone(),
        }
    }

    /// Keeps rows for which `keep` returns true and returns how many were removed.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Option<String>]) -> bool) -> usize {
        let before = self.rows.len();
        let rows = std::mem::take(&mut self.rows);
        let lines = std::mem::take(&mut self.lines);
        for (idx, row) in rows.into_iter().enumerate() {
            if keep(&row) {
                self.lines.push(lines.get(idx).copied().unwrap_or(idx + 2));
                self.rows.push(row);
            }
        }
        before - self.rows.len()
    }
}

/// Normalizes a raw cell: surrounding whitespace is trimmed and empty text is null.
pub fn cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
