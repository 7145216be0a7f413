use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::downtime::PressLayout;
use crate::error::DashError;
use crate::recovery::{AngleGrid, CuttingParams, MAX_ANGLES};

/// Inclusive bounds for an interactive numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    fn check(&self, name: &str, v: f64) -> Result<(), DashError> {
        if self.contains(v) {
            Ok(())
        } else {
            Err(DashError::Validation(format!(
                "{name} = {v} is outside [{}, {}]",
                self.min, self.max
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Candidate coil widths, mm, in evaluation order.
    pub widths: Vec<f64>,
    pub angles: AngleGrid,
    pub params: CuttingParams,
    pub diameter_range: ParamRange,
    pub disc_to_disc_range: ParamRange,
    pub disc_to_border_range: ParamRange,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            widths: vec![914.0, 1016.0, 1118.0, 1220.0, 1270.0],
            angles: AngleGrid::default(),
            params: CuttingParams::default(),
            diameter_range: ParamRange::new(50.0, 1000.0),
            disc_to_disc_range: ParamRange::new(0.0, 50.0),
            disc_to_border_range: ParamRange::new(0.0, 100.0),
        }
    }
}

impl RecoverySettings {
    /// Check a requested diameter and clearances against the configured ranges.
    pub fn validate_request(
        &self,
        diameter: f64,
        disc_to_disc: f64,
        disc_to_border: f64,
    ) -> Result<(), DashError> {
        self.diameter_range.check("diameter", diameter)?;
        self.disc_to_disc_range.check("disc_to_disc", disc_to_disc)?;
        self.disc_to_border_range.check("disc_to_border", disc_to_border)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    pub recovery: RecoverySettings,
    pub press_layout: PressLayout,
    /// Pending-to-pack rows are overdue above this many days.
    pub aging_threshold_days: f64,
    /// Delay categories at or below this share (percent) are left out of breakdowns.
    pub delay_share_threshold_pct: f64,
    /// Entries kept per result cache.
    pub cache_capacity: usize,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            recovery: RecoverySettings::default(),
            press_layout: PressLayout::default(),
            aging_threshold_days: 1.8,
            delay_share_threshold_pct: 5.0,
            cache_capacity: 16,
        }
    }
}

impl DashConfig {
    /// Load a JSON config file. Absent fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DashError> {
        let contents = fs::read_to_string(path)?;
        let config: DashConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DashError> {
        let r = &self.recovery;
        if r.widths.is_empty() {
            return Err(DashError::Validation("recovery.widths is empty".into()));
        }
        if r.widths.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(DashError::Validation(
                "recovery.widths must be positive".into(),
            ));
        }
        if r.angles.count().is_none() {
            return Err(DashError::Validation(format!(
                "recovery.angles {:?} must span at most {MAX_ANGLES} finite angles",
                r.angles
            )));
        }
        if !(r.params.thickness > 0.0) {
            return Err(DashError::Validation(
                "recovery.params.thickness must be positive".into(),
            ));
        }
        if self.press_layout.col_end <= self.press_layout.col_start {
            return Err(DashError::Validation(
                "press_layout column span is empty".into(),
            ));
        }
        if !self.aging_threshold_days.is_finite() {
            return Err(DashError::Validation(
                "aging_threshold_days must be finite".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let config = DashConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.aging_threshold_days, 1.8);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "aging_threshold_days": 3.0, "recovery": {{ "widths": [1016.0] }} }}"#
        )
        .unwrap();
        let config = DashConfig::load(file.path()).unwrap();
        assert_eq!(config.aging_threshold_days, 3.0);
        assert_eq!(config.recovery.widths, vec![1016.0]);
        assert_eq!(config.recovery.angles, AngleGrid::default());
        assert_eq!(config.press_layout, PressLayout::default());
    }

    #[test]
    fn bad_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "recovery": {{ "widths": [] }} }}"#).unwrap();
        assert!(matches!(
            DashConfig::load(file.path()),
            Err(DashError::Validation(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            DashConfig::load(file.path()),
            Err(DashError::Config(_))
        ));
    }

    #[test]
    fn oversized_angle_sweep_is_rejected() {
        let mut config = DashConfig::default();
        config.recovery.angles = AngleGrid {
            start: 30.0,
            end: 1e300,
            step: 1.0,
        };
        assert!(matches!(config.validate(), Err(DashError::Validation(_))));

        config.recovery.angles = AngleGrid {
            start: 30.0,
            end: 60.0,
            step: 1e-6,
        };
        assert!(matches!(config.validate(), Err(DashError::Validation(_))));
    }

    #[test]
    fn request_ranges() {
        let r = RecoverySettings::default();
        assert!(r.validate_request(250.0, 5.0, 30.0).is_ok());
        assert!(r.validate_request(10.0, 5.0, 30.0).is_err());
        assert!(r.validate_request(250.0, -1.0, 30.0).is_err());
        assert!(r.validate_request(250.0, 5.0, f64::NAN).is_err());
    }
}
