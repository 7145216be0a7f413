//! Per-report batch processing.
//!
//! Each uploaded file is routed, read and normalized on its own. A file that
//! fails becomes a [`Diagnostic`] and its siblings carry on; only when nothing
//! survives does the report come back without output.

use log::{info, warn};
use polars::prelude::*;
use serde::Serialize;

use crate::aggregate::{aggregate, DatedTable, PivotSpec, TimeSeriesMatrix};
use crate::aging;
use crate::config::RecoverySettings;
use crate::downtime::{extract_press_days, rollup, DowntimeTable, PressLayout};
use crate::error::{DashError, Diagnostic};
use crate::filename::{route, FileTemplate};
use crate::normalize::{
    normalize_free_text, normalize_headered, ColumnKind, ColumnSpec, NormalizeSpec,
};
use crate::recovery::{optimize, optimize_many, CuttingParams, RecoveryReport};
use crate::schema::wip;
use crate::workbook::{read_sheet, read_sheets, UploadedFile};

/// Output of a batch plus everything that went wrong on the way.
#[derive(Debug, Clone)]
pub struct BatchReport<T> {
    pub output: Option<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> BatchReport<T> {
    fn finish(result: Result<T, DashError>, mut diagnostics: Vec<Diagnostic>) -> Self {
        match result {
            Ok(output) => Self {
                output: Some(output),
                diagnostics,
            },
            Err(e) => {
                warn!("Batch produced no output: {e}");
                diagnostics.push(Diagnostic::from_error("batch", &e));
                Self {
                    output: None,
                    diagnostics,
                }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.output.is_some()
    }
}

/// Column rules for the FNDWRR sheet of a WIP summary.
pub fn wip_spec() -> NormalizeSpec {
    NormalizeSpec::new(vec![
        ColumnSpec::new(wip::RESOURCES, ColumnKind::Text).forward_filled(),
        ColumnSpec::new(wip::INV, ColumnKind::Text),
        ColumnSpec::new(wip::QTY, ColumnKind::Number),
    ])
}

fn expect_template(file: &UploadedFile, expected: FileTemplate) -> Result<FileTemplate, DashError> {
    let (template, _) = route(&file.name)?;
    if template != expected {
        return Err(DashError::FormatMismatch(format!(
            "{} is a {} file, expected {}",
            file.name,
            template.name(),
            expected.name()
        )));
    }
    Ok(template)
}

/// Read one WIP summary upload into a dated table.
pub fn load_wip_file(file: &UploadedFile) -> Result<DatedTable, DashError> {
    let (template, date) = route(&file.name)?;
    let date = match (template, date) {
        (FileTemplate::WipSummary, Some(d)) => d,
        (FileTemplate::WipSummary, None) => {
            return Err(DashError::FormatMismatch(format!(
                "Filename does not match the expected pattern: {}",
                file.name
            )))
        }
        (other, _) => {
            return Err(DashError::FormatMismatch(format!(
                "{} is a {} file, expected {}",
                file.name,
                other.name(),
                FileTemplate::WipSummary.name()
            )))
        }
    };
    let sheet = read_sheet(file, wip::SHEET)?;
    let table = normalize_headered(&sheet, &wip_spec())?;
    PivotSpec::wip().check_columns(&table.frame)?;
    info!(
        "{}: {} row(s) for {date}, {} dropped",
        file.name,
        table.frame.height(),
        table.dropped_rows
    );
    Ok(DatedTable::new(&file.name, date, table.frame))
}

/// WIP day-wise trend: Resources × Inv × every day in the uploaded span.
pub fn process_wip_batch(files: &[UploadedFile]) -> BatchReport<TimeSeriesMatrix> {
    let mut tables = Vec::with_capacity(files.len());
    let mut diagnostics = Vec::new();
    for file in files {
        match load_wip_file(file) {
            Ok(t) => tables.push(t),
            Err(e) => {
                warn!("Skipping {}: {e}", file.name);
                diagnostics.push(Diagnostic::from_error(&file.name, &e));
            }
        }
    }
    BatchReport::finish(aggregate(tables, &PivotSpec::wip()), diagnostics)
}

/// Press delay workbook: one sheet per day, all presses on each sheet.
pub fn process_downtime_workbook(
    file: &UploadedFile,
    layout: &PressLayout,
) -> BatchReport<DowntimeTable> {
    let sheets = match read_sheets(file) {
        Ok(s) => s,
        Err(e) => return BatchReport::finish(Err(e), Vec::new()),
    };
    let (days, diagnostics) = extract_press_days(&sheets, layout);
    let result = if days.is_empty() {
        Err(DashError::EmptyBatch)
    } else {
        Ok(rollup(days))
    };
    BatchReport::finish(result, diagnostics)
}

/// Read one item-description upload. Single-column sheets are split as free
/// text; wider sheets are read by header.
pub fn load_item_file(file: &UploadedFile) -> Result<DataFrame, DashError> {
    expect_template(file, FileTemplate::ItemDescription)?;
    let sheet = read_sheets(file)?
        .into_iter()
        .next()
        .ok_or_else(|| DashError::Schema(format!("{} has no sheets", file.name)))?;
    let spec = aging::item_spec();
    let table = if sheet.width() <= 1 {
        normalize_free_text(&sheet, &spec)?
    } else {
        normalize_headered(&sheet, &spec)?
    };
    Ok(table.frame)
}

/// Pending-to-pack rows above `threshold_days`, across every item upload.
///
/// Uploads whose columns differ from the first accepted one are reported and
/// left out.
pub fn process_aging_batch(files: &[UploadedFile], threshold_days: f64) -> BatchReport<DataFrame> {
    let mut combined: Option<DataFrame> = None;
    let mut diagnostics = Vec::new();
    for file in files {
        let loaded = load_item_file(file).and_then(|frame| match combined.as_mut() {
            Some(acc) => acc.vstack_mut(&frame).map(|_| ()).map_err(|e| {
                DashError::Schema(format!("Columns differ from earlier uploads: {e}"))
            }),
            None => {
                combined = Some(frame);
                Ok(())
            }
        });
        if let Err(e) = loaded {
            warn!("Skipping {}: {e}", file.name);
            diagnostics.push(Diagnostic::from_error(&file.name, &e));
        }
    }
    let result = combined
        .ok_or(DashError::EmptyBatch)
        .and_then(|df| aging::overdue(&df, threshold_days));
    BatchReport::finish(result, diagnostics)
}

/// Parameters the dashboard sends for one optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoveryRequest {
    pub diameter: f64,
    pub disc_to_disc: f64,
    pub disc_to_border: f64,
}

/// Validate a request against the configured ranges and run the grid.
pub fn run_recovery(
    request: &RecoveryRequest,
    settings: &RecoverySettings,
) -> Result<RecoveryReport, DashError> {
    settings.validate_request(request.diameter, request.disc_to_disc, request.disc_to_border)?;
    let params = CuttingParams {
        thickness: settings.params.thickness,
        disc_to_disc: request.disc_to_disc,
        disc_to_border: request.disc_to_border,
    };
    Ok(optimize(
        request.diameter,
        &settings.widths,
        &settings.angles,
        &params,
    ))
}

/// Validate every diameter, then run the grid for each in input order.
pub fn run_recovery_sweep(
    diameters: &[f64],
    disc_to_disc: f64,
    disc_to_border: f64,
    settings: &RecoverySettings,
) -> Result<Vec<RecoveryReport>, DashError> {
    for &diameter in diameters {
        settings.validate_request(diameter, disc_to_disc, disc_to_border)?;
    }
    let params = CuttingParams {
        thickness: settings.params.thickness,
        disc_to_disc,
        disc_to_border,
    };
    Ok(optimize_many(
        diameters,
        &settings.widths,
        &settings.angles,
        &params,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wip_batch_reports_bad_names_and_keeps_going() {
        let files = vec![
            UploadedFile::new("random.xlsx", vec![0u8]),
            UploadedFile::new("Alloy_Product_Wise_Summery__RK_010624.xlsx", vec![0u8]),
        ];
        let report = process_wip_batch(&files);
        assert!(!report.is_ok());
        let kinds: Vec<&str> = report.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec!["format_mismatch", "workbook", "empty_batch"]);
    }

    #[test]
    fn production_stats_are_not_wip() {
        let files = vec![UploadedFile::new(
            "Hindalco_Daily_Production_Stat_010624.xlsx",
            vec![0u8],
        )];
        let report = process_wip_batch(&files);
        assert!(!report.is_ok());
        assert_eq!(report.diagnostics[0].kind, "format_mismatch");
        assert!(report.diagnostics[0].message.contains("daily_production"));
    }

    #[test]
    fn aging_batch_from_text_uploads() {
        let files = vec![
            UploadedFile::new(
                "Item_desc_a.txt",
                "Item  Status  Number of Days\nA-1  Pending  2.5\nA-2  Pending  1.0\n",
            ),
            UploadedFile::new(
                "Item_desc_b.txt",
                "Item  Status  Number of Days\nB-1  Hold  3\n",
            ),
            UploadedFile::new("Item_desc_c.txt", "Item  Number of Days\nC-1  9\n"),
            UploadedFile::new("Alloy_Product_Wise_Summery__RK_010624.txt", "x"),
        ];
        let report = process_aging_batch(&files, 1.8);
        let out = report.output.unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(report.diagnostics.len(), 2);
        assert_eq!(report.diagnostics[0].source, "Item_desc_c.txt");
        assert_eq!(report.diagnostics[1].kind, "format_mismatch");
    }

    #[test]
    fn aging_batch_empty() {
        let report = process_aging_batch(&[], 1.8);
        assert!(report.output.is_none());
        assert_eq!(report.diagnostics[0].kind, "empty_batch");
    }

    #[test]
    fn downtime_from_unreadable_workbook() {
        let report = process_downtime_workbook(
            &UploadedFile::new("delays.xlsx", vec![9u8; 4]),
            &PressLayout::default(),
        );
        assert!(report.output.is_none());
        assert_eq!(report.diagnostics[0].kind, "workbook");
    }

    #[test]
    fn recovery_requests_are_range_checked() {
        let settings = RecoverySettings::default();
        let ok = RecoveryRequest {
            diameter: 250.0,
            disc_to_disc: 5.0,
            disc_to_border: 30.0,
        };
        let report = run_recovery(&ok, &settings).unwrap();
        assert_eq!(report.best_per_width.len(), settings.widths.len());
        assert!(report.global_best.unwrap().is_feasible());

        let bad = RecoveryRequest {
            diameter: 5000.0,
            ..ok
        };
        assert!(matches!(
            run_recovery(&bad, &settings),
            Err(DashError::Validation(_))
        ));
    }

    #[test]
    fn recovery_sweep_matches_single_runs() {
        let settings = RecoverySettings::default();
        let reports = run_recovery_sweep(&[250.0, 300.0], 5.0, 30.0, &settings).unwrap();
        assert_eq!(reports.len(), 2);
        let single = run_recovery(
            &RecoveryRequest {
                diameter: 300.0,
                disc_to_disc: 5.0,
                disc_to_border: 30.0,
            },
            &settings,
        )
        .unwrap();
        assert_eq!(reports[1], single);

        assert!(matches!(
            run_recovery_sweep(&[250.0, 5000.0], 5.0, 30.0, &settings),
            Err(DashError::Validation(_))
        ));
    }
}
