use log::info;
use polars::prelude::DataFrame;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::TimeSeriesMatrix;
use crate::cache::{CacheKey, ResultCache};
use crate::config::{DashConfig, RecoverySettings};
use crate::downtime::DowntimeTable;
use crate::error::DashError;
use crate::pipeline::{
    process_aging_batch, process_downtime_workbook, process_wip_batch, run_recovery, BatchReport,
    RecoveryRequest,
};
use crate::recovery::RecoveryReport;
use crate::workbook::UploadedFile;

/// Configuration plus one result cache per report.
pub struct Session {
    id: Uuid,
    config: DashConfig,
    wip: ResultCache<BatchReport<TimeSeriesMatrix>>,
    downtime: ResultCache<BatchReport<DowntimeTable>>,
    aging: ResultCache<BatchReport<DataFrame>>,
    recovery: ResultCache<RecoveryReport>,
}

#[derive(Serialize)]
struct RecoveryKeyParams<'a> {
    request: &'a RecoveryRequest,
    settings: &'a RecoverySettings,
}

impl Session {
    pub fn new(config: DashConfig) -> Self {
        let capacity = config.cache_capacity;
        let id = Uuid::new_v4();
        info!("Session {id} started");
        Self {
            id,
            config,
            wip: ResultCache::new(capacity),
            downtime: ResultCache::new(capacity),
            aging: ResultCache::new(capacity),
            recovery: ResultCache::new(capacity),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &DashConfig {
        &self.config
    }

    /// Replace the configuration and drop every cached result.
    pub fn set_config(&mut self, config: DashConfig) -> Result<(), DashError> {
        config.validate()?;
        self.config = config;
        self.clear_cache();
        Ok(())
    }

    pub fn wip_trend(
        &mut self,
        files: &[UploadedFile],
    ) -> Result<BatchReport<TimeSeriesMatrix>, DashError> {
        let key = CacheKey::new("wip", files, &())?;
        self.wip
            .get_or_try_compute(key, || Ok(process_wip_batch(files)))
    }

    pub fn downtime(
        &mut self,
        file: &UploadedFile,
    ) -> Result<BatchReport<DowntimeTable>, DashError> {
        let layout = &self.config.press_layout;
        let key = CacheKey::new("downtime", std::slice::from_ref(file), layout)?;
        self.downtime
            .get_or_try_compute(key, || Ok(process_downtime_workbook(file, layout)))
    }

    /// Overdue items using the configured threshold, or `threshold_days` when given.
    pub fn aging(
        &mut self,
        files: &[UploadedFile],
        threshold_days: Option<f64>,
    ) -> Result<BatchReport<DataFrame>, DashError> {
        let threshold = threshold_days.unwrap_or(self.config.aging_threshold_days);
        let key = CacheKey::new("aging", files, &threshold)?;
        self.aging
            .get_or_try_compute(key, || Ok(process_aging_batch(files, threshold)))
    }

    pub fn recovery(&mut self, request: &RecoveryRequest) -> Result<RecoveryReport, DashError> {
        let settings = &self.config.recovery;
        let key = CacheKey::new(
            "recovery",
            &[],
            &RecoveryKeyParams { request, settings },
        )?;
        self.recovery
            .get_or_try_compute(key, || run_recovery(request, settings))
    }

    pub fn clear_cache(&mut self) {
        self.wip.clear();
        self.downtime.clear();
        self.aging.clear();
        self.recovery.clear();
    }

    /// (hits, misses) summed over every report cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        [
            self.wip.stats(),
            self.downtime.stats(),
            self.aging.stats(),
            self.recovery.stats(),
        ]
        .iter()
        .fold((0, 0), |(h, m), (dh, dm)| (h + dh, m + dm))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DashConfig::default())
    }
}
