use polars::prelude::*;

use crate::error::DashError;
use crate::normalize::{ColumnKind, ColumnSpec, NormalizeSpec};
use crate::schema::aging;

/// Column rules for item-description listings.
pub fn item_spec() -> NormalizeSpec {
    NormalizeSpec::new(vec![ColumnSpec::new(aging::NUMBER_OF_DAYS, ColumnKind::Number)])
}

/// Rows whose `Number of Days` is strictly above `threshold_days`.
///
/// Missing or unparsable day counts never pass the threshold.
pub fn overdue(items: &DataFrame, threshold_days: f64) -> Result<DataFrame, DashError> {
    if items.column(aging::NUMBER_OF_DAYS).is_err() {
        return Err(DashError::Schema(format!(
            "Missing column: {}",
            aging::NUMBER_OF_DAYS
        )));
    }
    let out = items
        .clone()
        .lazy()
        .with_columns([col(aging::NUMBER_OF_DAYS).cast(DataType::Float64)])
        .filter(col(aging::NUMBER_OF_DAYS).gt(lit(threshold_days)))
        .collect()?;
    Ok(out)
}

const BLANK: &str = "(blank)";

/// Row count per distinct value of `group_column`, sorted by value.
/// Rows with a blank group are counted under `"(blank)"`.
pub fn count_frame(items: &DataFrame, group_column: &str) -> Result<DataFrame, DashError> {
    if items.column(group_column).is_err() {
        return Err(DashError::Schema(format!("Missing column: {group_column}")));
    }
    let group = col(group_column).cast(DataType::String).str().strip_chars(lit(" \t\r\n"));
    let out = items
        .clone()
        .lazy()
        .select([when(group.clone().eq(lit("")))
            .then(lit(BLANK))
            .otherwise(group)
            .fill_null(lit(BLANK))
            .alias(group_column)])
        .group_by([col(group_column)])
        .agg([len().cast(DataType::UInt64).alias(aging::COUNT)])
        .sort_by_exprs([col(group_column)], SortMultipleOptions::default())
        .collect()?;
    Ok(out)
}

/// [`count_frame`] as `(group, count)` pairs.
pub fn count_by(items: &DataFrame, group_column: &str) -> Result<Vec<(String, usize)>, DashError> {
    let frame = count_frame(items, group_column)?;
    let groups = frame.column(group_column)?.str()?;
    let counts = frame.column(aging::COUNT)?.u64()?;
    Ok(groups
        .into_iter()
        .zip(counts.into_iter())
        .filter_map(|(g, n)| Some((g?.to_string(), n? as usize)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> DataFrame {
        df!(
            "Item" => ["A", "B", "C", "D"],
            "Status" => [Some("Pending"), Some("Pending"), None, Some("Hold")],
            "Number of Days" => [Some(2.5), Some(1.8), Some(4.0), None],
        )
        .unwrap()
    }

    #[test]
    fn threshold_is_strict() {
        let out = overdue(&items(), 1.8).unwrap();
        let names: Vec<Option<&str>> = out.column("Item").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(names, vec![Some("A"), Some("C")]);

        assert_eq!(overdue(&items(), 0.0).unwrap().height(), 3);
        assert_eq!(overdue(&items(), 10.0).unwrap().height(), 0);
    }

    #[test]
    fn missing_days_column() {
        let df = df!("Item" => ["A"]).unwrap();
        assert!(matches!(overdue(&df, 1.8), Err(DashError::Schema(_))));
    }

    #[test]
    fn counts_per_group() {
        let out = overdue(&items(), 1.0).unwrap();
        let counts = count_by(&out, "Status").unwrap();
        assert_eq!(
            counts,
            vec![("(blank)".to_string(), 1), ("Pending".to_string(), 2)]
        );
        assert!(count_by(&out, "Nope").is_err());

        let frame = count_frame(&out, "Status").unwrap();
        assert_eq!(frame.get_column_names_str(), vec!["Status", "count"]);
        let n: Vec<Option<u64>> = frame.column("count").unwrap().u64().unwrap().into_iter().collect();
        assert_eq!(n, vec![Some(1), Some(2)]);
    }

    #[test]
    fn whitespace_groups_count_as_blank() {
        let df = df!(
            "Status" => [Some(" Hold "), Some("  "), None, Some("Hold")],
        )
        .unwrap();
        let counts = count_by(&df, "Status").unwrap();
        assert_eq!(
            counts,
            vec![("(blank)".to_string(), 2), ("Hold".to_string(), 2)]
        );
    }
}
