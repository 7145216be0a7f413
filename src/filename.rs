use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::DashError;

static WIP_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Alloy_Product_Wise_Summery__RK_(\d{2})(\d{2})(\d{2})").expect("valid regex")
});
static DAILY_PRODUCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Hindalco_Daily_Production_Stat_(\d{2})(\d{2})(\d{2})").expect("valid regex")
});
static ITEM_DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Item_desc").expect("valid regex"));
static SHEET_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,2})\.(\d{1,2})\.(\d{2})\s*$").expect("valid regex"));

/// Report family a file belongs to, decided by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileTemplate {
    /// `Alloy_Product_Wise_Summery__RK_DDMMYY…`, WIP snapshot.
    WipSummary,
    /// `Hindalco_Daily_Production_Stat_DDMMYY…`, daily production.
    DailyProduction,
    /// `Item_desc…`, pending-to-pack listing without an embedded date.
    ItemDescription,
}

impl FileTemplate {
    pub fn all() -> &'static [FileTemplate] {
        &[
            Self::WipSummary,
            Self::DailyProduction,
            Self::ItemDescription,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::WipSummary => "wip_summary",
            Self::DailyProduction => "daily_production",
            Self::ItemDescription => "item_description",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            Self::WipSummary => &WIP_SUMMARY,
            Self::DailyProduction => &DAILY_PRODUCTION,
            Self::ItemDescription => &ITEM_DESCRIPTION,
        }
    }

    pub fn has_date(&self) -> bool {
        !matches!(self, Self::ItemDescription)
    }

    pub fn matches(&self, filename: &str) -> bool {
        self.pattern().is_match(filename)
    }
}

/// Extract the `DDMMYY` date embedded in `filename` for the given template.
pub fn extract_date(filename: &str, template: FileTemplate) -> Result<NaiveDate, DashError> {
    let caps = template.pattern().captures(filename).ok_or_else(|| {
        DashError::FormatMismatch(format!(
            "Filename does not match the expected pattern: {filename}"
        ))
    })?;
    if caps.len() < 4 {
        return Err(DashError::FormatMismatch(format!(
            "Template {} carries no date: {filename}",
            template.name()
        )));
    }
    let day = &caps[1];
    let month = &caps[2];
    let year = &caps[3];
    calendar_date(day, month, year).ok_or_else(|| {
        DashError::FormatMismatch(format!(
            "Invalid date {day}{month}{year} in filename: {filename}"
        ))
    })
}

/// Pick the template a filename belongs to, plus its date when the template has one.
pub fn route(filename: &str) -> Result<(FileTemplate, Option<NaiveDate>), DashError> {
    let template = FileTemplate::all()
        .iter()
        .copied()
        .find(|t| t.matches(filename))
        .ok_or_else(|| {
            DashError::FormatMismatch(format!("No report template matches: {filename}"))
        })?;
    let date = if template.has_date() {
        Some(extract_date(filename, template)?)
    } else {
        None
    };
    Ok((template, date))
}

/// Parse a `DD.MM.YY` sheet name, as used by the press delay workbook.
pub fn parse_sheet_date(sheet_name: &str) -> Result<NaiveDate, DashError> {
    SHEET_DATE
        .captures(sheet_name)
        .and_then(|caps| calendar_date(&caps[1], &caps[2], &caps[3]))
        .ok_or_else(|| DashError::FormatMismatch(format!("Sheet name is not a date: {sheet_name}")))
}

fn calendar_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}
