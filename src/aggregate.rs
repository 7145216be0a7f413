use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::debug;
use polars::prelude::*;

use crate::error::DashError;
use crate::schema::{timeseries, wip};

/// Composite identity of a pivoted row, one value per key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(pub Vec<String>);

impl EntityKey {
    pub fn new<S: Into<String>>(parts: impl IntoIterator<Item = S>) -> Self {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Human label, parts joined with " - ".
    pub fn label(&self) -> String {
        self.0.join(" - ")
    }
}

/// Which columns identify an entity and which column is summed.
#[derive(Debug, Clone)]
pub struct PivotSpec {
    pub key_columns: Vec<String>,
    pub value_column: String,
    /// Key columns whose blanks take the last value above them in the same table.
    pub fill_columns: Vec<String>,
}

impl PivotSpec {
    pub fn new(key_columns: &[&str], value_column: &str) -> Self {
        Self {
            key_columns: key_columns.iter().map(|s| s.to_string()).collect(),
            value_column: value_column.to_string(),
            fill_columns: Vec::new(),
        }
    }

    pub fn forward_filled(mut self, columns: &[&str]) -> Self {
        self.fill_columns = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Resources × Inv, summing Qty. Only Resources is forward-filled.
    pub fn wip() -> Self {
        Self::new(&wip::KEYS, wip::QTY).forward_filled(&[wip::RESOURCES])
    }

    /// Fail with a schema error if `frame` lacks any column this pivot needs.
    pub fn check_columns(&self, frame: &DataFrame) -> Result<(), DashError> {
        for name in self.key_columns.iter().chain(std::iter::once(&self.value_column)) {
            if frame.column(name).is_err() {
                return Err(DashError::Schema(format!("Missing column: {name}")));
            }
        }
        Ok(())
    }
}

/// One normalized daily table and the date it describes.
#[derive(Debug, Clone)]
pub struct DatedTable {
    pub source: String,
    pub date: NaiveDate,
    pub frame: DataFrame,
}

impl DatedTable {
    pub fn new(source: impl Into<String>, date: NaiveDate, frame: DataFrame) -> Self {
        Self {
            source: source.into(),
            date,
            frame,
        }
    }
}

/// Entities × contiguous dates. Absent cells hold 0.0, never null.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesMatrix {
    key_columns: Vec<String>,
    keys: Vec<EntityKey>,
    dates: Vec<NaiveDate>,
    values: Vec<Vec<f64>>,
    dropped_rows: usize,
}

/// Day offset from the earliest table, carried through the group-by.
const DAY_INDEX: &str = "__day_index";

/// Concatenate daily tables and pivot them into a [`TimeSeriesMatrix`].
///
/// Tables are sorted by date here, whatever order they arrive in. The pivot's
/// fill columns are forward-filled within each table; rows still missing a key
/// or the measure are dropped and counted. Duplicate (entity, date) rows are
/// summed, and the date axis spans every day from the earliest to the latest
/// table date.
pub fn aggregate(
    mut tables: Vec<DatedTable>,
    spec: &PivotSpec,
) -> Result<TimeSeriesMatrix, DashError> {
    if tables.is_empty() {
        return Err(DashError::EmptyBatch);
    }
    tables.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.source.cmp(&b.source)));
    let first = tables[0].date;
    let last = tables[tables.len() - 1].date;

    let mut long: Option<DataFrame> = None;
    let mut dropped_rows = 0;
    for table in &tables {
        let (rows, dropped) = long_rows(table, spec, (table.date - first).num_days())?;
        debug!(
            "{}: {} row(s) kept, {} dropped",
            table.source,
            rows.height(),
            dropped
        );
        dropped_rows += dropped;
        match long.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&rows)?;
            }
            None => long = Some(rows),
        }
    }
    let long = long.ok_or(DashError::EmptyBatch)?;

    let group_keys: Vec<Expr> = spec
        .key_columns
        .iter()
        .map(|k| col(k.as_str()))
        .chain(std::iter::once(col(DAY_INDEX)))
        .collect();
    let summed = long
        .lazy()
        .group_by(group_keys)
        .agg([col(spec.value_column.as_str()).sum()])
        .collect()?;

    let width = (last - first).num_days() as usize + 1;
    let key_cols: Vec<&StringChunked> = spec
        .key_columns
        .iter()
        .map(|k| summed.column(k.as_str()).and_then(|c| c.str()))
        .collect::<Result<_, _>>()?;
    let days = summed.column(DAY_INDEX)?.i64()?;
    let sums = summed.column(spec.value_column.as_str())?.f64()?;

    let mut rows: BTreeMap<EntityKey, Vec<f64>> = BTreeMap::new();
    for i in 0..summed.height() {
        let parts: Option<Vec<String>> = key_cols
            .iter()
            .map(|kc| kc.get(i).map(str::to_string))
            .collect();
        let (Some(parts), Some(day), Some(value)) = (parts, days.get(i), sums.get(i)) else {
            continue;
        };
        rows.entry(EntityKey(parts))
            .or_insert_with(|| vec![0.0; width])[day as usize] += value;
    }

    let dates: Vec<NaiveDate> = first.iter_days().take(width).collect();
    let (keys, values) = rows.into_iter().unzip();

    Ok(TimeSeriesMatrix {
        key_columns: spec.key_columns.clone(),
        keys,
        dates,
        values,
        dropped_rows,
    })
}

/// One table as long rows: key columns, day index and the Float64 measure.
/// Returns the rows kept and the number dropped.
fn long_rows(
    table: &DatedTable,
    spec: &PivotSpec,
    day: i64,
) -> Result<(DataFrame, usize), DashError> {
    spec.check_columns(&table.frame)?;

    let mut exprs: Vec<Expr> = spec
        .key_columns
        .iter()
        .map(|k| col(k.as_str()).cast(DataType::String))
        .collect();
    exprs.push(col(spec.value_column.as_str()).cast(DataType::Float64));
    let typed = table.frame.clone().lazy().select(exprs).collect()?;

    let key_cols: Vec<&StringChunked> = spec
        .key_columns
        .iter()
        .map(|k| typed.column(k.as_str()).and_then(|c| c.str()))
        .collect::<Result<_, _>>()?;
    let fills: Vec<bool> = spec
        .key_columns
        .iter()
        .map(|k| spec.fill_columns.contains(k))
        .collect();
    let values = typed.column(spec.value_column.as_str())?.f64()?;

    let mut last: Vec<Option<String>> = vec![None; key_cols.len()];
    let mut kept_keys: Vec<Vec<String>> = vec![Vec::new(); key_cols.len()];
    let mut kept_values: Vec<f64> = Vec::new();
    let mut dropped = 0;
    for i in 0..typed.height() {
        let mut parts = Vec::with_capacity(key_cols.len());
        for ((kc, &fill), slot) in key_cols.iter().zip(&fills).zip(last.iter_mut()) {
            let cell = kc
                .get(i)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if fill {
                if cell.is_some() {
                    *slot = cell;
                }
                parts.push(slot.clone());
            } else {
                parts.push(cell);
            }
        }
        let parts: Option<Vec<String>> = parts.into_iter().collect();
        let (Some(value), Some(parts)) = (values.get(i), parts) else {
            dropped += 1;
            continue;
        };
        for (column, part) in kept_keys.iter_mut().zip(parts) {
            column.push(part);
        }
        kept_values.push(value);
    }

    let mut columns: Vec<Column> = spec
        .key_columns
        .iter()
        .zip(kept_keys)
        .map(|(name, parts)| Series::new(name.as_str().into(), parts).into())
        .collect();
    columns.push(Series::new(DAY_INDEX.into(), vec![day; kept_values.len()]).into());
    columns.push(Series::new(spec.value_column.as_str().into(), kept_values).into());
    Ok((DataFrame::new(columns)?, dropped))
}

impl TimeSeriesMatrix {
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn keys(&self) -> &[EntityKey] {
        &self.keys
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Date column labels, `YYYY-MM-DD`.
    pub fn date_labels(&self) -> Vec<String> {
        self.dates
            .iter()
            .map(|d| d.format(timeseries::DATE_FORMAT).to_string())
            .collect()
    }

    pub fn row(&self, key: &EntityKey) -> Option<&[f64]> {
        self.position(key).map(|i| self.values[i].as_slice())
    }

    pub fn value(&self, key: &EntityKey, date: NaiveDate) -> Option<f64> {
        let row = self.row(key)?;
        let j = self.dates.binary_search(&date).ok()?;
        Some(row[j])
    }

    /// Date-ordered series for one entity, ready for a line chart.
    pub fn series(&self, key: &EntityKey) -> Option<Vec<(NaiveDate, f64)>> {
        self.row(key)
            .map(|row| self.dates.iter().copied().zip(row.iter().copied()).collect())
    }

    pub fn height(&self) -> usize {
        self.keys.len()
    }

    pub fn width(&self) -> usize {
        self.dates.len()
    }

    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Sorted distinct values of one key column, for selection widgets.
    pub fn distinct(&self, column: &str) -> Option<Vec<String>> {
        let idx = self.key_columns.iter().position(|c| c == column)?;
        let set: BTreeSet<&String> = self.keys.iter().map(|k| &k.0[idx]).collect();
        Some(set.into_iter().cloned().collect())
    }

    /// Entities for which `keep` holds, all dates retained.
    pub fn filter(&self, keep: impl Fn(&EntityKey) -> bool) -> TimeSeriesMatrix {
        let (keys, values) = self
            .keys
            .iter()
            .zip(&self.values)
            .filter(|(k, _)| keep(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .unzip();
        TimeSeriesMatrix {
            key_columns: self.key_columns.clone(),
            keys,
            dates: self.dates.clone(),
            values,
            dropped_rows: self.dropped_rows,
        }
    }

    /// Dates within `[from, to]` inclusive, all entities retained.
    pub fn slice_dates(&self, from: NaiveDate, to: NaiveDate) -> TimeSeriesMatrix {
        let lo = self.dates.partition_point(|d| *d < from);
        let hi = self.dates.partition_point(|d| *d <= to).max(lo);
        TimeSeriesMatrix {
            key_columns: self.key_columns.clone(),
            keys: self.keys.clone(),
            dates: self.dates[lo..hi].to_vec(),
            values: self.values.iter().map(|r| r[lo..hi].to_vec()).collect(),
            dropped_rows: self.dropped_rows,
        }
    }

    /// Key columns followed by one Float64 column per date label.
    pub fn to_dataframe(&self) -> Result<DataFrame, DashError> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.key_columns.len() + self.dates.len());
        for (i, name) in self.key_columns.iter().enumerate() {
            let parts: Vec<&str> = self.keys.iter().map(|k| k.0[i].as_str()).collect();
            columns.push(Series::new(name.as_str().into(), parts).into());
        }
        for (j, label) in self.date_labels().iter().enumerate() {
            let values: Vec<f64> = self.values.iter().map(|r| r[j]).collect();
            columns.push(Series::new(label.as_str().into(), values).into());
        }
        Ok(DataFrame::new(columns)?)
    }

    fn position(&self, key: &EntityKey) -> Option<usize> {
        self.keys.binary_search(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn frame(resources: &[Option<&str>], inv: &[&str], qty: &[Option<f64>]) -> DataFrame {
        let resources: Vec<Option<String>> =
            resources.iter().map(|r| r.map(str::to_string)).collect();
        df!(
            "Resources" => resources,
            "Inv" => inv,
            "Qty" => qty,
        )
        .unwrap()
    }

    #[test]
    fn pivots_and_fills_missing_dates() {
        let tables = vec![
            DatedTable::new(
                "b",
                ymd(2024, 6, 3),
                frame(&[Some("MILL")], &["Coil"], &[Some(4.0)]),
            ),
            DatedTable::new(
                "a",
                ymd(2024, 6, 1),
                frame(
                    &[Some("CASTER"), None, Some("MILL")],
                    &["Slab", "Slab", "Coil"],
                    &[Some(10.0), Some(5.0), None],
                ),
            ),
        ];
        let m = aggregate(tables, &PivotSpec::wip()).unwrap();

        assert_eq!(m.date_labels(), vec!["2024-06-01", "2024-06-02", "2024-06-03"]);
        assert_eq!(m.height(), 2);
        assert_eq!(m.dropped_rows(), 1);

        let caster = EntityKey::new(["CASTER", "Slab"]);
        assert_eq!(m.row(&caster), Some(&[15.0, 0.0, 0.0][..]));
        let mill = EntityKey::new(["MILL", "Coil"]);
        assert_eq!(m.row(&mill), Some(&[0.0, 0.0, 4.0][..]));
        assert_eq!(m.value(&mill, ymd(2024, 6, 3)), Some(4.0));
    }

    #[test]
    fn blank_inv_is_dropped_not_filled() {
        let day = df!(
            "Resources" => [Some("CASTER"), Some("MILL"), Some("MILL")],
            "Inv" => [Some("Slab"), None, Some("  ")],
            "Qty" => [10.0, 5.0, 2.0],
        )
        .unwrap();
        let m = aggregate(
            vec![DatedTable::new("a", ymd(2024, 6, 1), day)],
            &PivotSpec::wip(),
        )
        .unwrap();

        assert_eq!(m.keys(), &[EntityKey::new(["CASTER", "Slab"])]);
        assert_eq!(m.dropped_rows(), 2);
        assert_eq!(m.row(&EntityKey::new(["CASTER", "Slab"])), Some(&[10.0][..]));
    }

    #[test]
    fn fill_list_controls_forward_fill() {
        let day = df!(
            "Resources" => [Some("CASTER"), None],
            "Inv" => [Some("Slab"), None],
            "Qty" => [1.0, 2.0],
        )
        .unwrap();
        let tables = vec![DatedTable::new("a", ymd(2024, 6, 1), day)];

        let none = aggregate(tables.clone(), &PivotSpec::new(&["Resources", "Inv"], "Qty")).unwrap();
        assert_eq!(none.height(), 1);
        assert_eq!(none.dropped_rows(), 1);

        let both = PivotSpec::new(&["Resources", "Inv"], "Qty").forward_filled(&["Resources", "Inv"]);
        let m = aggregate(tables, &both).unwrap();
        assert_eq!(m.dropped_rows(), 0);
        assert_eq!(m.row(&EntityKey::new(["CASTER", "Slab"])), Some(&[3.0][..]));
    }

    #[test]
    fn fill_stops_at_file_boundary() {
        let tables = vec![
            DatedTable::new("a", ymd(2024, 6, 1), frame(&[Some("CASTER")], &["Slab"], &[Some(1.0)])),
            DatedTable::new(
                "b",
                ymd(2024, 6, 2),
                frame(&[None, Some("MILL")], &["Slab", "Coil"], &[Some(7.0), Some(2.0)]),
            ),
        ];
        let m = aggregate(tables, &PivotSpec::wip()).unwrap();
        assert_eq!(m.dropped_rows(), 1);
        assert_eq!(m.row(&EntityKey::new(["CASTER", "Slab"])), Some(&[1.0, 0.0][..]));
        assert_eq!(m.row(&EntityKey::new(["MILL", "Coil"])), Some(&[0.0, 2.0][..]));
    }

    #[test]
    fn empty_batch() {
        assert!(matches!(
            aggregate(Vec::new(), &PivotSpec::wip()),
            Err(DashError::EmptyBatch)
        ));
    }

    #[test]
    fn missing_column_is_schema_error() {
        let bad = df!("Resources" => ["A"], "Qty" => [1.0]).unwrap();
        let err = aggregate(
            vec![DatedTable::new("x", ymd(2024, 1, 1), bad)],
            &PivotSpec::wip(),
        )
        .unwrap_err();
        assert!(matches!(err, DashError::Schema(_)));
    }

    #[test]
    fn views_and_dataframe() {
        let tables = vec![
            DatedTable::new("a", ymd(2024, 6, 1), frame(&[Some("A")], &["x"], &[Some(1.0)])),
            DatedTable::new("b", ymd(2024, 6, 2), frame(&[Some("B")], &["y"], &[Some(2.0)])),
        ];
        let m = aggregate(tables, &PivotSpec::wip()).unwrap();

        assert_eq!(m.distinct("Resources"), Some(vec!["A".to_string(), "B".to_string()]));
        assert_eq!(m.distinct("Nope"), None);

        assert_eq!(
            m.series(&EntityKey::new(["B", "y"])),
            Some(vec![(ymd(2024, 6, 1), 0.0), (ymd(2024, 6, 2), 2.0)])
        );
        assert_eq!(m.series(&EntityKey::new(["B", "x"])), None);

        let only_b = m.filter(|k| k.parts()[0] == "B");
        assert_eq!(only_b.height(), 1);
        assert_eq!(only_b.width(), 2);

        let day2 = m.slice_dates(ymd(2024, 6, 2), ymd(2024, 6, 30));
        assert_eq!(day2.dates(), &[ymd(2024, 6, 2)]);
        assert_eq!(day2.row(&EntityKey::new(["A", "x"])), Some(&[0.0][..]));

        let df = m.to_dataframe().unwrap();
        assert_eq!(
            df.get_column_names_str(),
            vec!["Resources", "Inv", "2024-06-01", "2024-06-02"]
        );
        assert_eq!(df.height(), 2);
    }
}
