//! Spreadsheet normalizer: loosely structured raw sheets in, typed tables out.
//!
//! Three input shapes are handled:
//! - headered sheets, where one row carries real column names
//! - free-text sheets, one text cell per row, fields separated by runs of
//!   two or more whitespace characters
//! - fixed-offset blocks, a header row and a value row over a column span
//!
//! The first two produce a [`NormalizedTable`]; blocks produce name/cell pairs
//! for callers that assemble their own records.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use polars::prelude::*;
use regex::Regex;

use crate::cell::{RawCell, RawSheet};
use crate::error::DashError;
use crate::schema::timeseries;

static FIELD_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Target type of a normalized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    /// Stored as `YYYY-MM-DD` strings.
    Date,
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub required: bool,
    /// Carry the last non-blank value down into blank cells.
    pub forward_fill: bool,
}

impl ColumnSpec {
    pub fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            forward_fill: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn forward_filled(mut self) -> Self {
        self.forward_fill = true;
        self
    }
}

/// Declares the columns a sheet must provide and how to type them.
/// Columns not named here are kept as text.
#[derive(Debug, Clone, Default)]
pub struct NormalizeSpec {
    pub columns: Vec<ColumnSpec>,
}

impl NormalizeSpec {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn required_names(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.required)
            .map(|c| c.name.as_str())
    }
}

/// A clean rectangular table plus how many raw rows were discarded.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub frame: DataFrame,
    pub dropped_rows: usize,
}

/// Header names aligned with ragged raw rows.
struct Grid {
    headers: Vec<String>,
    rows: Vec<Vec<RawCell>>,
}

/// Normalize a sheet whose header row contains real column names.
///
/// The header row is the first row holding every required column name; when
/// nothing is required it is the first non-blank row.
pub fn normalize_headered(
    sheet: &RawSheet,
    spec: &NormalizeSpec,
) -> Result<NormalizedTable, DashError> {
    let required: Vec<&str> = spec.required_names().collect();
    let header_idx = sheet
        .rows
        .iter()
        .position(|row| {
            let names: HashSet<String> = row.iter().filter_map(RawCell::as_text).collect();
            if required.is_empty() {
                !names.is_empty()
            } else {
                required.iter().all(|r| names.contains(*r))
            }
        })
        .ok_or_else(|| {
            DashError::Schema(format!(
                "Sheet '{}' has no header row with columns {:?}",
                sheet.name, required
            ))
        })?;

    let header_row = &sheet.rows[header_idx];
    let headers = header_row
        .iter()
        .enumerate()
        .map(|(i, c)| c.as_text().unwrap_or_else(|| synthetic_name(i)))
        .collect();
    let grid = Grid {
        headers,
        rows: sheet.rows[header_idx + 1..].to_vec(),
    };
    build_table(&sheet.name, grid, spec)
}

/// Normalize a single-column free-text sheet by splitting each line into fields.
///
/// The first non-blank line is the header. If its field count differs from
/// the widest data line, every column is named positionally (`Column_N`).
pub fn normalize_free_text(
    sheet: &RawSheet,
    spec: &NormalizeSpec,
) -> Result<NormalizedTable, DashError> {
    let mut lines = sheet.rows.iter().map(|row| {
        row.iter()
            .find_map(RawCell::as_text)
            .map(|text| split_fields(&text))
            .unwrap_or_default()
    });

    let mut leading_blank = 0;
    let header = loop {
        match lines.next() {
            Some(fields) if fields.is_empty() => leading_blank += 1,
            Some(fields) => break fields,
            None => {
                return Err(DashError::Schema(format!(
                    "Sheet '{}' has no text lines",
                    sheet.name
                )))
            }
        }
    };

    let rows: Vec<Vec<RawCell>> = lines
        .map(|fields| fields.into_iter().map(RawCell::Text).collect())
        .collect();
    let width = rows.iter().map(Vec::len).max().unwrap_or(header.len());

    let headers = if width == header.len() {
        header
    } else {
        log::debug!(
            "Sheet '{}': header has {} fields, data has {}; using positional names",
            sheet.name,
            header.len(),
            width
        );
        (0..width).map(synthetic_name).collect()
    };

    let mut table = build_table(&sheet.name, Grid { headers, rows }, spec)?;
    table.dropped_rows += leading_blank;
    Ok(table)
}

/// Split a free-text line on runs of two or more whitespace characters.
pub fn split_fields(line: &str) -> Vec<String> {
    FIELD_SEPARATOR
        .split(line.trim())
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read a fixed-offset block: header names from `header_row`, values from
/// `value_row`, over the column span `cols`.
///
/// Blank header cells are named `Col_<index>`. A sheet too small to hold the
/// block is a format mismatch.
pub fn read_block(
    sheet: &RawSheet,
    header_row: usize,
    value_row: usize,
    cols: Range<usize>,
) -> Result<Vec<(String, RawCell)>, DashError> {
    if sheet.height() <= value_row.max(header_row) || sheet.width() < cols.end {
        return Err(DashError::FormatMismatch(format!(
            "Sheet '{}' is {}x{}, block needs row {} and columns {}..{}",
            sheet.name,
            sheet.height(),
            sheet.width(),
            value_row,
            cols.start,
            cols.end
        )));
    }
    Ok(cols
        .map(|c| {
            let name = sheet
                .cell(header_row, c)
                .as_text()
                .unwrap_or_else(|| format!("Col_{c}"));
            (name, sheet.cell(value_row, c).clone())
        })
        .collect())
}

fn synthetic_name(idx: usize) -> String {
    format!("Column_{}", idx + 1)
}

fn build_table(sheet_name: &str, grid: Grid, spec: &NormalizeSpec) -> Result<NormalizedTable, DashError> {
    for name in spec.required_names() {
        if !grid.headers.iter().any(|h| h == name) {
            return Err(DashError::Schema(format!(
                "Missing column '{name}' in sheet '{sheet_name}'"
            )));
        }
    }

    let width = grid.headers.len();
    let total = grid.rows.len();
    let mut rows: Vec<Vec<RawCell>> = grid
        .rows
        .into_iter()
        .filter(|row| !row.iter().take(width).all(RawCell::is_blank))
        .map(|mut row| {
            row.resize(width, RawCell::Empty);
            row
        })
        .collect();
    let dropped_rows = total - rows.len();

    for (idx, header) in grid.headers.iter().enumerate() {
        if spec.get(header).is_some_and(|c| c.forward_fill) {
            forward_fill(&mut rows, idx);
        }
    }

    let names = unique_names(&grid.headers);
    let columns: Vec<Column> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let kind = spec
                .get(&grid.headers[idx])
                .map(|c| c.kind)
                .unwrap_or(ColumnKind::Text);
            typed_column(name, kind, rows.iter().map(|r| &r[idx]))
        })
        .collect();

    let frame = DataFrame::new(columns)?;
    Ok(NormalizedTable {
        frame,
        dropped_rows,
    })
}

fn forward_fill(rows: &mut [Vec<RawCell>], idx: usize) {
    let mut last: Option<RawCell> = None;
    for row in rows.iter_mut() {
        if row[idx].is_blank() {
            if let Some(prev) = &last {
                row[idx] = prev.clone();
            }
        } else {
            last = Some(row[idx].clone());
        }
    }
}

/// Suffix repeated header names so the frame has distinct columns.
fn unique_names(headers: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    headers
        .iter()
        .map(|h| {
            let mut name = h.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{h}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

fn typed_column<'a>(name: &str, kind: ColumnKind, cells: impl Iterator<Item = &'a RawCell>) -> Column {
    match kind {
        ColumnKind::Number => {
            let values: Vec<Option<f64>> = cells.map(RawCell::as_number).collect();
            Series::new(name.into(), values).into()
        }
        ColumnKind::Date => {
            let values: Vec<Option<String>> = cells
                .map(|c| c.as_date().map(|d| d.format(timeseries::DATE_FORMAT).to_string()))
                .collect();
            Series::new(name.into(), values).into()
        }
        ColumnKind::Text => {
            let values: Vec<Option<String>> = cells.map(RawCell::as_text).collect();
            Series::new(name.into(), values).into()
        }
    }
}
