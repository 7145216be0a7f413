use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use log::debug;

use crate::cell::{RawCell, RawSheet};
use crate::error::DashError;

/// An uploaded file: its original name and full content.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    fn is_text(&self) -> bool {
        let lower = self.name.to_ascii_lowercase();
        lower.ends_with(".txt") || lower.ends_with(".prn") || lower.ends_with(".csv")
    }
}

/// Read every sheet of an uploaded file.
///
/// `.txt`, `.prn` and `.csv` uploads become one single-column sheet with one
/// row per line; everything else is opened as xlsx. The reader lives only for
/// the duration of this call.
pub fn read_sheets(file: &UploadedFile) -> Result<Vec<RawSheet>, DashError> {
    if file.is_text() {
        let text = String::from_utf8_lossy(&file.bytes);
        return Ok(vec![RawSheet::from_lines(file.name.clone(), text.lines())]);
    }

    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(file.bytes.as_slice()))?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        sheets.push(range_to_sheet(&name, &range));
    }
    debug!("Read {} sheet(s) from {}", sheets.len(), file.name);
    Ok(sheets)
}

/// Read one named sheet, failing with a schema error if it is absent.
pub fn read_sheet(file: &UploadedFile, sheet_name: &str) -> Result<RawSheet, DashError> {
    read_sheets(file)?
        .into_iter()
        .find(|s| s.name == sheet_name)
        .ok_or_else(|| {
            DashError::Schema(format!("Sheet '{sheet_name}' not found in {}", file.name))
        })
}

/// Convert a calamine range to a grid anchored at A1.
///
/// calamine ranges start at the first used cell, so leading empty rows and
/// columns are padded back in to keep fixed offsets meaningful.
fn range_to_sheet(name: &str, range: &calamine::Range<Data>) -> RawSheet {
    let (row_off, col_off) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<RawCell>> = vec![Vec::new(); row_off];
    for row in range.rows() {
        let mut cells = vec![RawCell::Empty; col_off];
        cells.extend(row.iter().map(convert_cell));
        rows.push(cells);
    }
    RawSheet::new(name, rows)
}

fn convert_cell(data: &Data) -> RawCell {
    match data {
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Float(f) => RawCell::Number(*f),
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Bool(b) => RawCell::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| RawCell::Date(d.date()))
            .unwrap_or(RawCell::Empty),
        Data::DateTimeIso(s) => RawCell::Text(s.clone()),
        _ => RawCell::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_upload_becomes_single_column_sheet() {
        let file = UploadedFile::new("Item_desc_0105.txt", "Item  Number of Days\n\nA1  2.5\n");
        let sheets = read_sheets(&file).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].height(), 3);
        assert!(sheets[0].cell(1, 0).is_blank());
        assert_eq!(sheets[0].cell(2, 0), &RawCell::text("A1  2.5"));
    }

    #[test]
    fn garbage_bytes_are_a_workbook_error() {
        let file = UploadedFile::new("Alloy_Product_Wise_Summery__RK_010624.xlsx", vec![1u8, 2, 3]);
        let err = read_sheets(&file).unwrap_err();
        assert!(matches!(err, DashError::Workbook(_)));
    }

    #[test]
    fn cell_conversion() {
        assert_eq!(convert_cell(&Data::Int(3)), RawCell::Number(3.0));
        assert_eq!(convert_cell(&Data::Empty), RawCell::Empty);
        assert_eq!(
            convert_cell(&Data::String("Die Shop".into())),
            RawCell::text("Die Shop")
        );
    }
}
