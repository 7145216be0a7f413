#[cfg(feature = "python")]
use pyo3::exceptions::PyRuntimeError;
#[cfg(feature = "python")]
use pyo3::PyErr;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    /// Filename, sheet name or cell layout does not match the expected template.
    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    /// Expected column or field absent after normalization.
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No valid input files")]
    EmptyBatch,

    #[error("No data: {0}")]
    NoData(String),

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl DashError {
    /// Short stable name of the error kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FormatMismatch(_) => "format_mismatch",
            Self::Schema(_) => "schema_error",
            Self::EmptyBatch => "empty_batch",
            Self::NoData(_) => "no_data",
            Self::Validation(_) => "validation",
            Self::Polars(_) => "polars",
            Self::Io(_) => "io",
            Self::Workbook(_) => "workbook",
            Self::Config(_) => "config",
        }
    }
}

#[cfg(feature = "python")]
impl From<DashError> for PyErr {
    fn from(err: DashError) -> PyErr {
        PyRuntimeError::new_err(err.to_string())
    }
}

/// A per-file (or per-sheet) problem collected while processing a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub source: String,
    pub kind: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn from_error(source: impl Into<String>, err: &DashError) -> Self {
        Self {
            source: source.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}
