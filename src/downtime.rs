//! Press downtime: delay extraction, NRT, running totals and extremes.
//!
//! The delay workbook has one sheet per day, named `DD.MM.YY`. Each press
//! occupies a fixed row and its delay categories span a fixed column range,
//! with category names on the first row.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cell::RawSheet;
use crate::error::{DashError, Diagnostic};
use crate::filename::parse_sheet_date;
use crate::normalize::read_block;
use crate::schema::{downtime, timeseries};

/// Where each press lives on a daily delay sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressLayout {
    /// (press number, zero-based sheet row)
    pub presses: Vec<(u32, usize)>,
    pub header_row: usize,
    /// First delay column, zero-based.
    pub col_start: usize,
    /// One past the last delay column.
    pub col_end: usize,
}

impl Default for PressLayout {
    fn default() -> Self {
        Self {
            presses: vec![
                (1, 2),
                (2, 4),
                (3, 6),
                (5, 8),
                (6, 10),
                (7, 12),
                (8, 14),
                (9, 16),
            ],
            header_row: 0,
            col_start: 4,
            col_end: 23,
        }
    }
}

/// Raw delay hours for one press on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct PressDay {
    pub date: NaiveDate,
    pub press: u32,
    /// Category name and hours; unparsable cells are `None`.
    pub delays: Vec<(String, Option<f64>)>,
    pub major_delay: Option<String>,
}

impl PressDay {
    /// Sum of every numeric delay category. Missing cells count as nothing.
    pub fn total_delay(&self) -> f64 {
        self.delays.iter().filter_map(|(_, v)| *v).sum()
    }
}

/// Pull one [`PressDay`] per press out of every dated sheet.
///
/// Sheets whose name is not a date, or that are too small for a press block,
/// are reported and skipped; the rest of the workbook still loads.
pub fn extract_press_days(
    sheets: &[RawSheet],
    layout: &PressLayout,
) -> (Vec<PressDay>, Vec<Diagnostic>) {
    let mut days = Vec::new();
    let mut diagnostics = Vec::new();

    for sheet in sheets {
        let date = match parse_sheet_date(&sheet.name) {
            Ok(d) => d,
            Err(e) => {
                debug!("Skipping sheet '{}': {e}", sheet.name);
                diagnostics.push(Diagnostic::from_error(&sheet.name, &e));
                continue;
            }
        };
        for &(press, row) in &layout.presses {
            let block = match read_block(
                sheet,
                layout.header_row,
                row,
                layout.col_start..layout.col_end,
            ) {
                Ok(b) => b,
                Err(e) => {
                    warn!("Sheet '{}' has no block for press {press}", sheet.name);
                    diagnostics.push(Diagnostic::from_error(
                        format!("{} / press {press}", sheet.name),
                        &e,
                    ));
                    continue;
                }
            };

            let mut delays = Vec::with_capacity(block.len());
            let mut major_delay = None;
            for (name, cell) in block {
                if name == downtime::MAJOR_DELAY {
                    major_delay = cell.as_text();
                } else {
                    delays.push((name, cell.as_number()));
                }
            }
            days.push(PressDay {
                date,
                press,
                delays,
                major_delay,
            });
        }
    }
    (days, diagnostics)
}

/// A measure with its running total.
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativePoint<K> {
    pub entity: K,
    pub date: NaiveDate,
    pub value: f64,
    pub cumulative: f64,
}

/// Running total per entity in date order.
///
/// The input is sorted by date first (stable, so same-day points keep their
/// relative order); output follows that order.
pub fn cumulative<K: Ord + Clone>(mut points: Vec<(K, NaiveDate, f64)>) -> Vec<CumulativePoint<K>> {
    points.sort_by_key(|(_, date, _)| *date);
    let mut totals: BTreeMap<K, f64> = BTreeMap::new();
    points
        .into_iter()
        .map(|(entity, date, value)| {
            let total = totals.entry(entity.clone()).or_insert(0.0);
            *total += value;
            CumulativePoint {
                entity,
                date,
                value,
                cumulative: *total,
            }
        })
        .collect()
}

/// Entities with the lowest and highest final cumulative value.
#[derive(Debug, Clone, PartialEq)]
pub struct Extremes<K> {
    pub min_entity: K,
    pub min_value: f64,
    pub max_entity: K,
    pub max_value: f64,
}

/// Lowest and highest final running total across entities.
///
/// Ties resolve to the smallest entity. `None` when there is nothing to rank.
pub fn extremes<K: Ord + Clone>(points: &[CumulativePoint<K>]) -> Option<Extremes<K>> {
    let mut finals: BTreeMap<&K, (NaiveDate, f64)> = BTreeMap::new();
    for p in points {
        let slot = finals.entry(&p.entity).or_insert((p.date, p.cumulative));
        if p.date >= slot.0 {
            *slot = (p.date, p.cumulative);
        }
    }

    let mut iter = finals.into_iter();
    let (first, (_, v)) = iter.next()?;
    let mut out = Extremes {
        min_entity: first.clone(),
        min_value: v,
        max_entity: first.clone(),
        max_value: v,
    };
    for (entity, (_, v)) in iter {
        if v < out.min_value {
            out.min_entity = entity.clone();
            out.min_value = v;
        }
        if v > out.max_value {
            out.max_entity = entity.clone();
            out.max_value = v;
        }
    }
    Some(out)
}

/// One press-day with derived totals.
#[derive(Debug, Clone, PartialEq)]
pub struct DowntimeRow {
    pub date: NaiveDate,
    pub press: u32,
    pub total_delay: f64,
    pub total_nrt: f64,
    pub todate_nrt: f64,
    pub todate_delay: f64,
    pub delays: Vec<(String, Option<f64>)>,
    pub major_delay: Option<String>,
}

impl DowntimeRow {
    pub fn delay(&self, category: &str) -> Option<f64> {
        self.delays
            .iter()
            .find(|(name, _)| name == category)
            .and_then(|(_, v)| *v)
    }
}

/// Press-days ordered by date, with running totals per press.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DowntimeTable {
    rows: Vec<DowntimeRow>,
    categories: Vec<String>,
}

/// Which presses and dates a dashboard view shows.
#[derive(Debug, Clone, Default)]
pub struct DowntimeFilter {
    /// Empty means every press.
    pub presses: Vec<u32>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DowntimeFilter {
    fn accepts(&self, row: &DowntimeRow) -> bool {
        (self.presses.is_empty() || self.presses.contains(&row.press))
            && self.from.map_or(true, |f| row.date >= f)
            && self.to.map_or(true, |t| row.date <= t)
    }
}

/// Headline numbers for one press over a view.
#[derive(Debug, Clone, PartialEq)]
pub struct PressMetrics {
    pub press: u32,
    pub days: i64,
    pub average_nrt: f64,
    pub todate_nrt: f64,
    pub todate_delay: f64,
    /// Mechanical + E&I hours.
    pub engineering_downtime: f64,
    /// Engineering downtime as a percentage of 24 h × days.
    pub engineering_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelayShare {
    pub category: String,
    pub hours: f64,
    pub share_pct: f64,
}

/// Sort press-days by date and derive total delay, NRT and their running totals.
pub fn rollup(mut days: Vec<PressDay>) -> DowntimeTable {
    days.sort_by(|a, b| a.date.cmp(&b.date).then(a.press.cmp(&b.press)));

    let mut categories: Vec<String> = Vec::new();
    for day in &days {
        for (name, _) in &day.delays {
            if !categories.contains(name) {
                categories.push(name.clone());
            }
        }
    }

    let totals: Vec<f64> = days.iter().map(PressDay::total_delay).collect();
    let delay_points = days
        .iter()
        .zip(&totals)
        .map(|(d, t)| (d.press, d.date, *t))
        .collect();
    let nrt_points = days
        .iter()
        .zip(&totals)
        .map(|(d, t)| (d.press, d.date, downtime::HOURS_PER_DAY - t))
        .collect();
    let todate_delay = cumulative(delay_points);
    let todate_nrt = cumulative(nrt_points);

    let rows = days
        .into_iter()
        .zip(todate_delay.into_iter().zip(todate_nrt))
        .map(|(day, (delay, nrt))| DowntimeRow {
            date: day.date,
            press: day.press,
            total_delay: delay.value,
            total_nrt: nrt.value,
            todate_nrt: nrt.cumulative,
            todate_delay: delay.cumulative,
            delays: day.delays,
            major_delay: day.major_delay,
        })
        .collect();

    DowntimeTable { rows, categories }
}

impl DowntimeTable {
    pub fn rows(&self) -> &[DowntimeRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Distinct presses, ascending.
    pub fn presses(&self) -> Vec<u32> {
        let mut presses: Vec<u32> = self.rows.iter().map(|r| r.press).collect();
        presses.sort_unstable();
        presses.dedup();
        presses
    }

    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.rows.first()?.date, self.rows.last()?.date))
    }

    /// Rows matching `filter`. Running totals keep their whole-workbook values.
    pub fn filter(&self, filter: &DowntimeFilter) -> DowntimeTable {
        DowntimeTable {
            rows: self
                .rows
                .iter()
                .filter(|r| filter.accepts(r))
                .cloned()
                .collect(),
            categories: self.categories.clone(),
        }
    }

    /// Press with the lowest and highest final Todate delay.
    pub fn delay_extremes(&self) -> Option<Extremes<u32>> {
        let points: Vec<CumulativePoint<u32>> = self
            .rows
            .iter()
            .map(|r| CumulativePoint {
                entity: r.press,
                date: r.date,
                value: r.total_delay,
                cumulative: r.todate_delay,
            })
            .collect();
        extremes(&points)
    }

    pub fn press_metrics(&self, press: u32) -> Option<PressMetrics> {
        let rows: Vec<&DowntimeRow> = self.rows.iter().filter(|r| r.press == press).collect();
        let first = rows.first()?;
        let last = rows.last()?;

        let days = (last.date - first.date).num_days() + 1;
        let average_nrt = rows.iter().map(|r| r.total_nrt).sum::<f64>() / rows.len() as f64;
        let engineering_downtime: f64 = rows
            .iter()
            .map(|r| {
                r.delay(downtime::MECHANICAL).unwrap_or(0.0)
                    + r.delay(downtime::ELECTRICAL).unwrap_or(0.0)
            })
            .sum();
        let engineering_pct =
            engineering_downtime * 100.0 / (downtime::HOURS_PER_DAY * days as f64);

        Some(PressMetrics {
            press,
            days,
            average_nrt,
            todate_nrt: last.todate_nrt,
            todate_delay: last.todate_delay,
            engineering_downtime,
            engineering_pct,
        })
    }

    /// Hours per known delay category for one press, keeping categories whose
    /// share of the total is strictly above `min_share_pct`.
    pub fn delay_breakdown(&self, press: u32, min_share_pct: f64) -> Vec<DelayShare> {
        let sums: Vec<(&str, f64)> = downtime::DELAY_CATEGORIES
            .iter()
            .filter(|c| self.categories.iter().any(|k| k.as_str() == **c))
            .map(|c| {
                let hours: f64 = self
                    .rows
                    .iter()
                    .filter(|r| r.press == press)
                    .filter_map(|r| r.delay(c))
                    .sum();
                (*c, hours)
            })
            .collect();
        let total: f64 = sums.iter().map(|(_, h)| h).sum();
        if !(total > 0.0) {
            return Vec::new();
        }
        sums.into_iter()
            .map(|(category, hours)| DelayShare {
                category: category.to_string(),
                hours,
                share_pct: hours / total * 100.0,
            })
            .filter(|s| s.share_pct > min_share_pct)
            .collect()
    }

    /// Date, Press, totals and running totals, then each delay category and
    /// the major delay note.
    pub fn to_dataframe(&self) -> Result<DataFrame, DashError> {
        let dates: Vec<String> = self
            .rows
            .iter()
            .map(|r| r.date.format(timeseries::DATE_FORMAT).to_string())
            .collect();
        let presses: Vec<i64> = self.rows.iter().map(|r| r.press as i64).collect();
        let pick = |f: fn(&DowntimeRow) -> f64| -> Vec<f64> { self.rows.iter().map(f).collect() };

        let mut columns: Vec<Column> = vec![
            Series::new(timeseries::DATE.into(), dates).into(),
            Series::new(downtime::PRESS.into(), presses).into(),
            Series::new(downtime::TOTAL_DELAY.into(), pick(|r| r.total_delay)).into(),
            Series::new(downtime::TOTAL_NRT.into(), pick(|r| r.total_nrt)).into(),
            Series::new(downtime::TODATE_NRT.into(), pick(|r| r.todate_nrt)).into(),
            Series::new(downtime::TODATE_DELAY.into(), pick(|r| r.todate_delay)).into(),
        ];
        for category in &self.categories {
            let values: Vec<Option<f64>> = self.rows.iter().map(|r| r.delay(category)).collect();
            columns.push(Series::new(category.as_str().into(), values).into());
        }
        let majors: Vec<Option<String>> = self.rows.iter().map(|r| r.major_delay.clone()).collect();
        columns.push(Series::new(downtime::MAJOR_DELAY.into(), majors).into());

        Ok(DataFrame::new(columns)?)
    }
}
