//! Circle-cutting recovery optimizer.
//!
//! Discs of diameter `b` are cut from coil stock in a staggered pattern at an
//! angle to the feed direction. For each candidate coil width and cutting
//! angle the yield ("recovery") is the share of consumed material that ends up
//! in blanks. Geometrically impossible configurations score negative infinity
//! so they can sit in the trial grid next to feasible ones.

use std::f64::consts::PI;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::DashError;
use crate::schema::recovery;

/// Recovery reported for configurations that cannot be cut.
pub const INFEASIBLE: f64 = f64::NEG_INFINITY;

/// Material and clearance parameters shared by every trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CuttingParams {
    /// Material thickness in mm. 1.0 is fine for relative comparisons.
    pub thickness: f64,
    /// Gap between neighbouring discs, mm.
    pub disc_to_disc: f64,
    /// Margin between a disc and the coil edge, mm.
    pub disc_to_border: f64,
}

impl Default for CuttingParams {
    fn default() -> Self {
        Self {
            thickness: 1.0,
            disc_to_disc: 5.0,
            disc_to_border: 30.0,
        }
    }
}

/// Inclusive angle sweep in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleGrid {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl Default for AngleGrid {
    fn default() -> Self {
        Self {
            start: 30.0,
            end: 60.0,
            step: 1.0,
        }
    }
}

/// Upper bound on angles in one sweep.
pub const MAX_ANGLES: usize = 10_000;

impl AngleGrid {
    /// Number of angles in the sweep, or `None` when the bounds are not finite,
    /// `end < start`, or the sweep would exceed [`MAX_ANGLES`].
    /// A non-positive step counts `start` alone.
    pub fn count(&self) -> Option<usize> {
        if !(self.start.is_finite() && self.end.is_finite()) || self.end < self.start {
            return None;
        }
        if !(self.step > 0.0) {
            return Some(1);
        }
        let count = ((self.end - self.start) / self.step + 1e-9).floor() + 1.0;
        (count.is_finite() && count <= MAX_ANGLES as f64).then_some(count as usize)
    }

    /// Angles in ascending order, empty when [`count`](Self::count) is `None`.
    pub fn angles(&self) -> Vec<f64> {
        let count = self.count().unwrap_or(0);
        let step = if self.step > 0.0 { self.step } else { 0.0 };
        (0..count).map(|i| self.start + i as f64 * step).collect()
    }
}

/// One evaluated (diameter, width, angle) configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryTrial {
    pub diameter: f64,
    pub width: f64,
    pub angle: f64,
    pub recovery: f64,
}

impl RecoveryTrial {
    pub fn is_feasible(&self) -> bool {
        self.recovery.is_finite()
    }
}

/// Full trial grid for one diameter plus its optima.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    pub diameter: f64,
    /// Width-major, angle-ascending.
    pub trials: Vec<RecoveryTrial>,
    /// Best trial per width, in width order.
    pub best_per_width: Vec<RecoveryTrial>,
    pub global_best: Option<RecoveryTrial>,
}

/// Recovery percentage of cutting discs of `diameter` from a coil of `width`
/// at `angle_deg`.
///
/// Returns [`INFEASIBLE`] when the usable width cannot hold a single disc or
/// when the inputs make the geometry degenerate.
pub fn recovery_percentage(diameter: f64, width: f64, angle_deg: f64, params: &CuttingParams) -> f64 {
    let blank_center = diameter + params.disc_to_disc;
    let angle = angle_deg.to_radians();
    let tool_pitch = blank_center * angle.sin();
    let coil_pitch = blank_center * angle.cos();

    let usable_width = width - 2.0 * params.disc_to_border;
    if !(usable_width > diameter) {
        return INFEASIBLE;
    }
    if !(tool_pitch > 0.0 && coil_pitch > 0.0 && tool_pitch.is_finite() && coil_pitch.is_finite()) {
        return INFEASIBLE;
    }

    let no_of_blanks = ((usable_width - diameter) / tool_pitch).floor() + 1.0;
    let material_used = 2.0 * coil_pitch * width * params.thickness / 1000.0;
    let blank_volume = no_of_blanks * PI * diameter * diameter * params.thickness / 4000.0;
    if !(material_used > 0.0 && material_used.is_finite() && blank_volume.is_finite()) {
        return INFEASIBLE;
    }

    100.0 - (material_used - blank_volume) / material_used * 100.0
}

/// Evaluate every (width, angle) pair for one diameter.
///
/// Widths form the outer loop and angles the inner one, in the order given.
/// Selection keeps the first trial on ties.
pub fn optimize(
    diameter: f64,
    widths: &[f64],
    grid: &AngleGrid,
    params: &CuttingParams,
) -> RecoveryReport {
    let angles = grid.angles();
    let mut trials = Vec::with_capacity(widths.len() * angles.len());
    for &width in widths {
        for &angle in &angles {
            trials.push(RecoveryTrial {
                diameter,
                width,
                angle,
                recovery: recovery_percentage(diameter, width, angle, params),
            });
        }
    }

    let per_width = best_per_width(&trials);
    let global_best = select_best(&trials);
    RecoveryReport {
        diameter,
        trials,
        best_per_width: per_width,
        global_best,
    }
}

/// Best configuration for each diameter, in input order.
pub fn optimize_many(
    diameters: &[f64],
    widths: &[f64],
    grid: &AngleGrid,
    params: &CuttingParams,
) -> Vec<RecoveryReport> {
    diameters
        .iter()
        .map(|&d| optimize(d, widths, grid, params))
        .collect()
}

/// Arg-max over recovery. The earliest trial wins ties; an all-infeasible
/// slice returns its first trial.
pub fn select_best(trials: &[RecoveryTrial]) -> Option<RecoveryTrial> {
    let mut iter = trials.iter();
    let mut best = *iter.next()?;
    for t in iter {
        if t.recovery > best.recovery {
            best = *t;
        }
    }
    Some(best)
}

/// Per-width best for a flat trial list, widths in first-seen order.
pub fn best_per_width(trials: &[RecoveryTrial]) -> Vec<RecoveryTrial> {
    let mut out: Vec<RecoveryTrial> = Vec::new();
    for t in trials {
        match out.iter_mut().find(|b| b.width == t.width) {
            Some(b) if t.recovery > b.recovery => *b = *t,
            Some(_) => {}
            None => out.push(*t),
        }
    }
    out
}

/// Round to two decimals for display. Infinities pass through.
pub fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        value
    }
}

/// Trials as a frame: diameter, width, angle, recovery.
pub fn trials_to_dataframe(trials: &[RecoveryTrial]) -> Result<DataFrame, DashError> {
    let diameter: Vec<f64> = trials.iter().map(|t| t.diameter).collect();
    let width: Vec<f64> = trials.iter().map(|t| t.width).collect();
    let angle: Vec<f64> = trials.iter().map(|t| t.angle).collect();
    let rec: Vec<f64> = trials.iter().map(|t| t.recovery).collect();
    Ok(DataFrame::new(vec![
        Series::new(recovery::DIAMETER.into(), diameter).into(),
        Series::new(recovery::WIDTH.into(), width).into(),
        Series::new(recovery::ANGLE.into(), angle).into(),
        Series::new(recovery::RECOVERY.into(), rec).into(),
    ])?)
}

impl RecoveryReport {
    pub fn trials_frame(&self) -> Result<DataFrame, DashError> {
        trials_to_dataframe(&self.trials)
    }

    pub fn best_per_width_frame(&self) -> Result<DataFrame, DashError> {
        trials_to_dataframe(&self.best_per_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(width: f64, recovery: f64) -> RecoveryTrial {
        RecoveryTrial {
            diameter: 250.0,
            width,
            angle: 45.0,
            recovery,
        }
    }

    #[test]
    fn pinned_regression_value() {
        let params = CuttingParams::default();
        let r = recovery_percentage(250.0, 1016.0, 60.0, &params);
        assert!((r - 75.787_224_351_305_4).abs() < 1e-9, "got {r}");
        assert_eq!(round2(r), 75.79);

        let r30 = recovery_percentage(250.0, 1016.0, 30.0, &params);
        assert!((r30 - 65.633_661_570_541_1).abs() < 1e-9, "got {r30}");
    }

    #[test]
    fn infeasible_when_usable_width_too_small() {
        let params = CuttingParams::default();
        // 310 - 60 = 250, equal to the diameter
        assert_eq!(recovery_percentage(250.0, 310.0, 45.0, &params), INFEASIBLE);
        assert_eq!(recovery_percentage(250.0, 200.0, 45.0, &params), INFEASIBLE);
        assert!(recovery_percentage(250.0, 311.0, 45.0, &params).is_finite());
    }

    #[test]
    fn degenerate_inputs_never_panic() {
        let params = CuttingParams::default();
        assert_eq!(recovery_percentage(250.0, 1016.0, 0.0, &params), INFEASIBLE);
        assert_eq!(recovery_percentage(f64::NAN, 1016.0, 45.0, &params), INFEASIBLE);
        let zero_thickness = CuttingParams {
            thickness: 0.0,
            ..params
        };
        assert_eq!(recovery_percentage(250.0, 1016.0, 45.0, &zero_thickness), INFEASIBLE);
    }

    #[test]
    fn angle_grid_is_inclusive() {
        let angles = AngleGrid::default().angles();
        assert_eq!(angles.len(), 31);
        assert_eq!(angles[0], 30.0);
        assert_eq!(angles[30], 60.0);

        let coarse = AngleGrid { start: 30.0, end: 60.0, step: 7.5 }.angles();
        assert_eq!(coarse, vec![30.0, 37.5, 45.0, 52.5, 60.0]);
        assert!(AngleGrid { start: 60.0, end: 30.0, step: 1.0 }.angles().is_empty());
        assert_eq!(AngleGrid { start: 45.0, end: 60.0, step: 0.0 }.angles(), vec![45.0]);
    }

    #[test]
    fn huge_sweeps_are_empty() {
        let wide = AngleGrid { start: 30.0, end: 1e300, step: 1.0 };
        assert_eq!(wide.count(), None);
        assert!(wide.angles().is_empty());

        let fine = AngleGrid { start: 30.0, end: 60.0, step: 1e-9 };
        assert_eq!(fine.count(), None);
        assert_eq!(AngleGrid { start: 0.0, end: 9_999.0, step: 1.0 }.count(), Some(MAX_ANGLES));
        assert_eq!(AngleGrid { start: 30.0, end: f64::INFINITY, step: 1.0 }.count(), None);
    }

    #[test]
    fn global_best_selection() {
        let trials = [trial(914.0, 60.0), trial(1016.0, 75.0), trial(1118.0, 70.0)];
        let best = select_best(&trials).unwrap();
        assert_eq!(best.width, 1016.0);

        let per_width = best_per_width(&trials);
        let w1016 = per_width.iter().find(|t| t.width == 1016.0).unwrap();
        assert_eq!(*w1016, best);
    }

    #[test]
    fn ties_keep_first_trial() {
        let trials = [trial(914.0, 70.0), trial(1016.0, 70.0)];
        assert_eq!(select_best(&trials).unwrap().width, 914.0);
        assert!(select_best(&[]).is_none());

        let infeasible = [trial(914.0, INFEASIBLE), trial(1016.0, INFEASIBLE)];
        assert_eq!(select_best(&infeasible).unwrap().width, 914.0);
    }

    #[test]
    fn optimize_grid_order_and_optima() {
        let widths = [300.0, 1016.0, 1118.0];
        let report = optimize(250.0, &widths, &AngleGrid::default(), &CuttingParams::default());

        assert_eq!(report.trials.len(), 3 * 31);
        assert_eq!(report.trials[0].width, 300.0);
        assert_eq!(report.trials[30].angle, 60.0);
        assert_eq!(report.trials[31].width, 1016.0);

        assert_eq!(report.best_per_width.len(), 3);
        assert!(!report.best_per_width[0].is_feasible());

        let global = report.global_best.unwrap();
        let max = report
            .trials
            .iter()
            .map(|t| t.recovery)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(global.recovery, max);
        assert!(report.best_per_width.contains(&global));

        // bit-identical on re-run
        let again = optimize(250.0, &widths, &AngleGrid::default(), &CuttingParams::default());
        assert_eq!(report, again);
    }

    #[test]
    fn many_diameters_and_frames() {
        let reports = optimize_many(
            &[200.0, 250.0],
            &[1016.0],
            &AngleGrid::default(),
            &CuttingParams::default(),
        );
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].diameter, 250.0);

        let df = reports[0].trials_frame().unwrap();
        assert_eq!(df.height(), 31);
        assert_eq!(
            df.get_column_names_str(),
            vec!["diameter", "width", "angle", "recovery"]
        );
    }
}
