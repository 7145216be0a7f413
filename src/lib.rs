pub mod aggregate;
pub mod aging;
pub mod cache;
pub mod cell;
pub mod config;
pub mod downtime;
pub mod error;
pub mod export;
pub mod filename;
pub mod normalize;
pub mod pipeline;
pub mod recovery;
pub mod schema;
pub mod session;
pub mod workbook;

#[cfg(feature = "python")]
mod python;

pub use aggregate::{aggregate, DatedTable, EntityKey, PivotSpec, TimeSeriesMatrix};
pub use config::DashConfig;
pub use downtime::{DowntimeFilter, DowntimeTable, PressLayout};
pub use error::{DashError, Diagnostic};
pub use pipeline::{BatchReport, RecoveryRequest};
pub use recovery::{optimize, recovery_percentage, AngleGrid, CuttingParams, RecoveryReport};
pub use session::Session;
pub use workbook::UploadedFile;
