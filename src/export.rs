use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use polars::prelude::*;

use crate::error::DashError;

/// Serialize a frame as CSV with a header row.
pub fn to_csv_bytes(df: &mut DataFrame) -> Result<Vec<u8>, DashError> {
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(df)?;
    Ok(buf)
}

/// Write a frame as CSV to `path`, replacing any existing file.
pub fn write_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<(), DashError> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Read CSV bytes back into a frame, trimming whitespace from column names.
pub fn from_csv_bytes(bytes: &[u8]) -> Result<DataFrame, DashError> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;
    Ok(df)
}
