/// Column-name constants for the plant dashboard tables.
/// Single source of truth - exported to Python via PyO3.

// ── WIP summary columns ─────────────────────────────────────────────────────
pub mod wip {
    pub const SHEET: &str = "FNDWRR";
    pub const RESOURCES: &str = "Resources";
    pub const INV: &str = "Inv";
    pub const QTY: &str = "Qty";

    pub const KEYS: [&str; 2] = [RESOURCES, INV];
}

// ── Shared time columns ─────────────────────────────────────────────────────
pub mod timeseries {
    pub const DATE: &str = "Date";
    /// Label format of date columns in pivoted tables.
    pub const DATE_FORMAT: &str = "%Y-%m-%d";
}

// ── Press downtime columns ──────────────────────────────────────────────────
pub mod downtime {
    pub const PRESS: &str = "Press";
    pub const TOTAL_DELAY: &str = "Total delay";
    pub const TOTAL_NRT: &str = "Total NRT";
    pub const TODATE_NRT: &str = "Todate NRT";
    pub const TODATE_DELAY: &str = "Todate delay";
    pub const MAJOR_DELAY: &str = "Major Delay";
    pub const MECHANICAL: &str = "Mechanical";
    pub const ELECTRICAL: &str = "E&I";

    /// Hours in a reporting day.
    pub const HOURS_PER_DAY: f64 = 24.0;

    pub const DELAY_CATEGORIES: [&str; 18] = [
        "Mechanical",
        "E&I",
        "Operation",
        "Die Shop",
        "Misc",
        "P.M.",
        "SD / BD",
        "No Order",
        "No Billet",
        "Center Crack",
        "Planning",
        "Die Failure",
        "Die Management",
        "Die Development",
        "Die change Time",
        "System",
        "Power",
        "Die Withdrawal",
    ];
}

// ── Recovery optimizer columns ──────────────────────────────────────────────
pub mod recovery {
    pub const DIAMETER: &str = "diameter";
    pub const WIDTH: &str = "width";
    pub const ANGLE: &str = "angle";
    pub const RECOVERY: &str = "recovery";
}

// ── Pending-to-pack aging columns ───────────────────────────────────────────
pub mod aging {
    pub const NUMBER_OF_DAYS: &str = "Number of Days";
    pub const COUNT: &str = "count";
}
