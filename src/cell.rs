use chrono::NaiveDate;

/// One untyped cell as it came out of the workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d.%m.%y", "%d-%m-%Y", "%d/%m/%Y"];

impl RawCell {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Empty cells and whitespace-only text count as blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric value, or `None` when the cell holds nothing parseable.
    ///
    /// Text is trimmed and thousands separators are removed before parsing.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            Self::Text(s) => {
                let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
                cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
            }
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Text(s) => {
                let s = s.trim();
                DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
            }
            _ => None,
        }
    }

    /// Trimmed text form; numbers with no fractional part print without one.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Self::Number(v) => Some(if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{}", *v as i64)
            } else {
                v.to_string()
            }),
            Self::Bool(b) => Some(b.to_string()),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }
}

/// A named grid of raw cells. Rows may be ragged.
#[derive(Debug, Clone, Default)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<RawCell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Build a single-column sheet from lines of text.
    pub fn from_lines<'a>(name: impl Into<String>, lines: impl IntoIterator<Item = &'a str>) -> Self {
        let rows = lines
            .into_iter()
            .map(|line| {
                let line = line.trim_end_matches(['\r', '\n']);
                if line.trim().is_empty() {
                    vec![RawCell::Empty]
                } else {
                    vec![RawCell::text(line)]
                }
            })
            .collect();
        Self::new(name, rows)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell at (row, col); out-of-range positions read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &RawCell {
        static EMPTY: RawCell = RawCell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}
