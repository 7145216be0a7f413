use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use proptest::prelude::*;

use plant_dash::downtime::cumulative;
use plant_dash::recovery::{optimize, select_best, INFEASIBLE};
use plant_dash::{aggregate, AngleGrid, CuttingParams, DatedTable, EntityKey, PivotSpec};

const RESOURCES: [&str; 3] = ["Die Shop", "Extrusion", "Packing"];
const INV: [&str; 2] = ["RM", "FG"];

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

prop_compose! {
    /// One day's snapshot: rows of (resource, inv, qty) at a day offset.
    fn arb_table(idx: usize)(
        offset in 0i64..20,
        rows in prop::collection::vec((0usize..3, 0usize..2, 0u32..500), 1..8),
    ) -> DatedTable {
        let resources: Vec<&str> = rows.iter().map(|r| RESOURCES[r.0]).collect();
        let inv: Vec<&str> = rows.iter().map(|r| INV[r.1]).collect();
        let qty: Vec<f64> = rows.iter().map(|r| r.2 as f64).collect();
        let frame = df!(
            "Resources" => resources,
            "Inv" => inv,
            "Qty" => qty,
        ).unwrap();
        DatedTable::new(format!("file_{idx}"), base() + Duration::days(offset), frame)
    }
}

fn arb_tables() -> impl Strategy<Value = Vec<DatedTable>> {
    (1usize..6).prop_flat_map(|n| (0..n).map(arb_table).collect::<Vec<_>>())
}

proptest! {
    /// Upload order never changes the pivot.
    #[test]
    fn prop_aggregation_ignores_upload_order(tables in arb_tables()) {
        let spec = PivotSpec::wip();
        let forward = aggregate(tables.clone(), &spec).unwrap();
        let mut reversed = tables;
        reversed.reverse();
        let backward = aggregate(reversed, &spec).unwrap();
        prop_assert_eq!(forward, backward);
    }

    /// The date axis is contiguous from the first to the last upload date.
    #[test]
    fn prop_date_axis_is_contiguous(tables in arb_tables()) {
        let min = tables.iter().map(|t| t.date).min().unwrap();
        let max = tables.iter().map(|t| t.date).max().unwrap();
        let m = aggregate(tables, &PivotSpec::wip()).unwrap();
        prop_assert_eq!(m.width() as i64, (max - min).num_days() + 1);
        prop_assert_eq!(m.dates().first().copied(), Some(min));
        prop_assert_eq!(m.dates().last().copied(), Some(max));
        prop_assert!(m.dates().windows(2).all(|w| w[1] - w[0] == Duration::days(1)));
    }

    /// Every input quantity lands in the matrix exactly once.
    #[test]
    fn prop_totals_are_preserved(tables in arb_tables()) {
        let input: f64 = tables
            .iter()
            .map(|t| t.frame.column("Qty").unwrap().f64().unwrap().sum().unwrap_or(0.0))
            .sum();
        let m = aggregate(tables, &PivotSpec::wip()).unwrap();
        let output: f64 = m.keys().iter().map(|k| m.row(k).unwrap().iter().sum::<f64>()).sum();
        prop_assert_eq!(input, output);
        prop_assert_eq!(m.dropped_rows(), 0);
    }

    /// A running total ends at the sum of its entity's values.
    #[test]
    fn prop_cumulative_ends_at_sum(
        points in prop::collection::vec((0u32..4, 0i64..30, 0u32..24), 0..40),
    ) {
        let input: Vec<(u32, NaiveDate, f64)> = points
            .iter()
            .map(|&(press, day, hours)| (press, base() + Duration::days(day), hours as f64))
            .collect();
        let out = cumulative(input.clone());
        prop_assert_eq!(out.len(), input.len());
        prop_assert!(out.windows(2).all(|w| w[0].date <= w[1].date));
        for press in 0u32..4 {
            let expected: f64 = input.iter().filter(|p| p.0 == press).map(|p| p.2).sum();
            let last = out.iter().rev().find(|p| p.entity == press).map(|p| p.cumulative);
            prop_assert_eq!(last.unwrap_or(0.0), expected);
        }
    }

    /// The global best is never beaten by any trial, and is the earliest of equals.
    #[test]
    fn prop_global_best_is_first_maximum(diameter in 50.0f64..1000.0, gap in 0.0f64..50.0) {
        let params = CuttingParams { disc_to_disc: gap, ..CuttingParams::default() };
        let widths = [914.0, 1016.0, 1118.0, 1220.0, 1270.0];
        let report = optimize(diameter, &widths, &AngleGrid::default(), &params);
        prop_assert_eq!(report.trials.len(), widths.len() * 31);
        let best = report.global_best.unwrap();
        let first_max = report
            .trials
            .iter()
            .position(|t| t.recovery == best.recovery)
            .unwrap();
        prop_assert_eq!(report.trials[first_max], best);
        prop_assert!(report.trials.iter().all(|t| t.recovery <= best.recovery));
        prop_assert_eq!(select_best(&report.trials), Some(best));
        for t in &report.trials {
            prop_assert!(t.recovery == INFEASIBLE || t.recovery.is_finite());
        }
    }
}

#[test]
fn entity_keys_sort_by_parts() {
    let a = EntityKey::new(["Die Shop", "RM"]);
    let b = EntityKey::new(["Die Shop", "WIP"]);
    let c = EntityKey::new(["Extrusion", "FG"]);
    assert!(a < b && b < c);
    assert_eq!(c.label(), "Extrusion - FG");
}
