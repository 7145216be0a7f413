use chrono::NaiveDate;
use polars::prelude::*;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyModule};
use pyo3_polars::PyDataFrame;

use crate::aggregate::{EntityKey, TimeSeriesMatrix};
use crate::aging;
use crate::config::DashConfig;
use crate::downtime::{DowntimeFilter, DowntimeTable};
use crate::error::{DashError, Diagnostic};
use crate::export;
use crate::pipeline::{BatchReport, RecoveryRequest};
use crate::recovery::round2;
use crate::schema;
use crate::session::Session;
use crate::workbook::UploadedFile;

/// Frame plus diagnostic messages, as handed to the dashboard.
type FrameReport = (Option<PyDataFrame>, Vec<String>);

#[pyclass]
pub struct DashSession {
    inner: Session,
    wip: Option<TimeSeriesMatrix>,
    downtime: Option<DowntimeTable>,
}

#[pymethods]
impl DashSession {
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => DashConfig::load(path)?,
            None => DashConfig::default(),
        };
        Ok(Self {
            inner: Session::new(config),
            wip: None,
            downtime: None,
        })
    }

    #[getter]
    fn session_id(&self) -> String {
        self.inner.id().to_string()
    }

    // ── WIP trend ───────────────────────────────────────────────────────────

    /// Day-wise WIP from `(filename, bytes)` uploads.
    ///
    /// Returns the Resources × Inv × Date frame (None when no file was
    /// usable) and one message per skipped file.
    fn load_wip(&mut self, files: Vec<(String, Vec<u8>)>) -> PyResult<FrameReport> {
        let report = self.inner.wip_trend(&uploads(files))?;
        self.wip = report.output.clone();
        frame_report(report, |m| m.to_dataframe())
    }

    /// `(YYYY-MM-DD, qty)` points for one Resources × Inv pair, or None
    /// when the pair never appears.
    fn wip_series(&self, resources: &str, inv: &str) -> PyResult<Option<Vec<(String, f64)>>> {
        let key = EntityKey::new([resources, inv]);
        Ok(self.loaded_wip()?.series(&key).map(|points| {
            points
                .into_iter()
                .map(|(d, v)| (d.format(schema::timeseries::DATE_FORMAT).to_string(), v))
                .collect()
        }))
    }

    /// The loaded WIP frame restricted to an inclusive `YYYY-MM-DD` range.
    fn wip_slice(&self, date_from: &str, date_to: &str) -> PyResult<PyDataFrame> {
        let sliced = self
            .loaded_wip()?
            .slice_dates(parse_date(date_from)?, parse_date(date_to)?);
        Ok(PyDataFrame(sliced.to_dataframe()?))
    }

    // ── Recovery ────────────────────────────────────────────────────────────

    /// Run the width × angle grid for one disc diameter.
    ///
    /// Returns (all trials, best per width, global best as
    /// `(width, angle, recovery)` rounded to two decimals).
    fn optimize_recovery(
        &mut self,
        diameter: f64,
        disc_to_disc: f64,
        disc_to_border: f64,
    ) -> PyResult<(PyDataFrame, PyDataFrame, Option<(f64, f64, f64)>)> {
        let report = self.inner.recovery(&RecoveryRequest {
            diameter,
            disc_to_disc,
            disc_to_border,
        })?;
        let best = report
            .global_best
            .filter(|t| t.is_feasible())
            .map(|t| (t.width, t.angle, round2(t.recovery)));
        Ok((
            PyDataFrame(report.trials_frame()?),
            PyDataFrame(report.best_per_width_frame()?),
            best,
        ))
    }

    // ── Press downtime ──────────────────────────────────────────────────────

    /// Load the press delay workbook. The table is kept for the
    /// metric and breakdown calls below.
    fn load_downtime(&mut self, filename: String, bytes: Vec<u8>) -> PyResult<FrameReport> {
        let report = self.inner.downtime(&UploadedFile::new(filename, bytes))?;
        self.downtime = report.output.clone();
        frame_report(report, |t| t.to_dataframe())
    }

    /// Downtime rows for a subset of presses and an optional `YYYY-MM-DD` range.
    #[pyo3(signature = (presses=None, date_from=None, date_to=None))]
    fn downtime_view(
        &self,
        presses: Option<Vec<u32>>,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> PyResult<PyDataFrame> {
        let filter = view_filter(presses, date_from, date_to)?;
        Ok(PyDataFrame(self.loaded_downtime()?.filter(&filter).to_dataframe()?))
    }

    /// `(press, days, average NRT, todate NRT, todate delay, engineering
    /// hours, engineering %)` within the same filter as [`downtime_view`],
    /// or None when the press has no rows there.
    #[pyo3(signature = (press, presses=None, date_from=None, date_to=None))]
    fn press_metrics(
        &self,
        press: u32,
        presses: Option<Vec<u32>>,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> PyResult<Option<(u32, i64, f64, f64, f64, f64, f64)>> {
        let filter = view_filter(presses, date_from, date_to)?;
        let view = self.loaded_downtime()?.filter(&filter);
        Ok(view.press_metrics(press).map(|m| {
            (
                m.press,
                m.days,
                m.average_nrt,
                m.todate_nrt,
                m.todate_delay,
                m.engineering_downtime,
                m.engineering_pct,
            )
        }))
    }

    /// `(category, hours, share %)` above the configured share threshold,
    /// within the same filter as [`downtime_view`].
    #[pyo3(signature = (press, presses=None, date_from=None, date_to=None))]
    fn delay_breakdown(
        &self,
        press: u32,
        presses: Option<Vec<u32>>,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> PyResult<Vec<(String, f64, f64)>> {
        let threshold = self.inner.config().delay_share_threshold_pct;
        let filter = view_filter(presses, date_from, date_to)?;
        Ok(self
            .loaded_downtime()?
            .filter(&filter)
            .delay_breakdown(press, threshold)
            .into_iter()
            .map(|s| (s.category, s.hours, s.share_pct))
            .collect())
    }

    /// Press numbers with the lowest and highest final Todate delay.
    fn delay_extremes(&self) -> PyResult<Option<((u32, f64), (u32, f64))>> {
        Ok(self
            .loaded_downtime()?
            .delay_extremes()
            .map(|e| ((e.min_entity, e.min_value), (e.max_entity, e.max_value))))
    }

    // ── Aging ───────────────────────────────────────────────────────────────

    /// Overdue pending-to-pack items across item-description uploads.
    #[pyo3(signature = (files, threshold_days=None))]
    fn aging(
        &mut self,
        files: Vec<(String, Vec<u8>)>,
        threshold_days: Option<f64>,
    ) -> PyResult<FrameReport> {
        let report = self.inner.aging(&uploads(files), threshold_days)?;
        frame_report(report, |df| Ok(df.clone()))
    }

    /// Row counts per value of `column`.
    #[staticmethod]
    fn count_by(df: PyDataFrame, column: &str) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(aging::count_frame(&df.0, column)?))
    }

    // ── Export ──────────────────────────────────────────────────────────────

    /// CSV bytes of any frame, for download buttons.
    #[staticmethod]
    fn export_csv<'py>(py: Python<'py>, df: PyDataFrame) -> PyResult<Bound<'py, PyBytes>> {
        let mut df = df.0;
        let bytes = export::to_csv_bytes(&mut df)?;
        Ok(PyBytes::new(py, &bytes))
    }

    fn clear_cache(&mut self) {
        self.inner.clear_cache();
        self.wip = None;
        self.downtime = None;
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl DashSession {
    fn loaded_wip(&self) -> Result<&TimeSeriesMatrix, DashError> {
        self.wip
            .as_ref()
            .ok_or_else(|| DashError::NoData("no WIP summaries loaded".into()))
    }

    fn loaded_downtime(&self) -> Result<&DowntimeTable, DashError> {
        self.downtime
            .as_ref()
            .ok_or_else(|| DashError::NoData("no downtime workbook loaded".into()))
    }
}

fn uploads(files: Vec<(String, Vec<u8>)>) -> Vec<UploadedFile> {
    files
        .into_iter()
        .map(|(name, bytes)| UploadedFile::new(name, bytes))
        .collect()
}

fn frame_report<T>(
    report: BatchReport<T>,
    to_frame: impl FnOnce(&T) -> Result<DataFrame, DashError>,
) -> PyResult<FrameReport> {
    let frame = report.output.as_ref().map(to_frame).transpose()?;
    let messages = report.diagnostics.iter().map(Diagnostic::to_string).collect();
    Ok((frame.map(PyDataFrame), messages))
}

fn view_filter(
    presses: Option<Vec<u32>>,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<DowntimeFilter, DashError> {
    Ok(DowntimeFilter {
        presses: presses.unwrap_or_default(),
        from: date_from.map(parse_date).transpose()?,
        to: date_to.map(parse_date).transpose()?,
    })
}

fn parse_date(s: &str) -> Result<NaiveDate, DashError> {
    NaiveDate::parse_from_str(s.trim(), schema::timeseries::DATE_FORMAT)
        .map_err(|e| DashError::Validation(format!("bad date '{s}': {e}")))
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // WIP
    let wip = PyModule::new(m.py(), "wip")?;
    wip.add("SHEET", schema::wip::SHEET)?;
    wip.add("RESOURCES", schema::wip::RESOURCES)?;
    wip.add("INV", schema::wip::INV)?;
    wip.add("QTY", schema::wip::QTY)?;
    m.add_submodule(&wip)?;

    // TimeSeries
    let timeseries = PyModule::new(m.py(), "timeseries")?;
    timeseries.add("DATE", schema::timeseries::DATE)?;
    timeseries.add("DATE_FORMAT", schema::timeseries::DATE_FORMAT)?;
    m.add_submodule(&timeseries)?;

    // Downtime
    let downtime = PyModule::new(m.py(), "downtime")?;
    downtime.add("PRESS", schema::downtime::PRESS)?;
    downtime.add("TOTAL_DELAY", schema::downtime::TOTAL_DELAY)?;
    downtime.add("TOTAL_NRT", schema::downtime::TOTAL_NRT)?;
    downtime.add("TODATE_NRT", schema::downtime::TODATE_NRT)?;
    downtime.add("TODATE_DELAY", schema::downtime::TODATE_DELAY)?;
    downtime.add("MAJOR_DELAY", schema::downtime::MAJOR_DELAY)?;
    downtime.add("DELAY_CATEGORIES", schema::downtime::DELAY_CATEGORIES.to_vec())?;
    m.add_submodule(&downtime)?;

    // Recovery
    let recovery = PyModule::new(m.py(), "recovery")?;
    recovery.add("DIAMETER", schema::recovery::DIAMETER)?;
    recovery.add("WIDTH", schema::recovery::WIDTH)?;
    recovery.add("ANGLE", schema::recovery::ANGLE)?;
    recovery.add("RECOVERY", schema::recovery::RECOVERY)?;
    m.add_submodule(&recovery)?;

    // Aging
    let aging = PyModule::new(m.py(), "aging")?;
    aging.add("NUMBER_OF_DAYS", schema::aging::NUMBER_OF_DAYS)?;
    aging.add("COUNT", schema::aging::COUNT)?;
    m.add_submodule(&aging)?;

    Ok(())
}

#[pymodule]
fn plant_dash(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<DashSession>()?;
    add_schema_exports(m)?;
    Ok(())
}
