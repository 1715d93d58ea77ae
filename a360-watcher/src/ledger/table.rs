//! Loosely-typed table model for ledger sheets
//!
//! A sheet is a header row plus data rows of typed cells. Rows are always padded to the
//! column count so positional access by column index is safe.

use std::cmp::Ordering;

/// One cell value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Excel date serial (days since 1899-12-30), written back with a date format
    DateTime(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text rendering; whole floats render without a fractional part
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Cell::Bool(b) => b.to_string(),
            Cell::DateTime(serial) => serial_to_datetime(*serial)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| serial.to_string()),
        }
    }

    /// Trimmed text rendering
    pub fn trimmed(&self) -> String {
        self.as_text().trim().to_string()
    }

    /// Numeric coercion (numbers as-is, numeric text parsed, everything else `None`)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) if f.is_finite() => Some(*f),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Integer target age, truncating a fractional value
    pub fn as_age(&self) -> Option<i64> {
        self.as_number().map(|f| f.trunc() as i64)
    }
}

fn serial_to_datetime(serial: f64) -> Option<chrono::NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(chrono::TimeDelta::try_milliseconds(millis)?)
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<u32> for Cell {
    fn from(value: u32) -> Self {
        Cell::Int(i64::from(value))
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

/// Header plus rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Append a column filled with `default` for every existing row
    pub fn add_column(&mut self, name: impl Into<String>, default: Cell) {
        self.columns.push(name.into());
        for row in &mut self.rows {
            row.push(default.clone());
        }
    }

    /// Append a row, padding or truncating it to the column count
    pub fn push_row(&mut self, mut row: Vec<Cell>) -> usize {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Cell by row index and column name (`Empty` when either is absent)
    pub fn get(&self, row: usize, column: &str) -> &Cell {
        self.column_index(column)
            .and_then(|c| self.rows.get(row).and_then(|r| r.get(c)))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Trimmed text of a cell
    pub fn text(&self, row: usize, column: &str) -> String {
        self.get(row, column).trimmed()
    }

    /// Set a cell; returns false when the column does not exist
    pub fn set(&mut self, row: usize, column: &str, value: impl Into<Cell>) -> bool {
        let Some(col) = self.column_index(column) else {
            return false;
        };
        match self.rows.get_mut(row) {
            Some(cells) => {
                if cells.len() <= col {
                    cells.resize(col + 1, Cell::Empty);
                }
                cells[col] = value.into();
                true
            }
            None => false,
        }
    }

    /// Pad every row to the column count
    pub fn normalize(&mut self) {
        let width = self.columns.len();
        for row in &mut self.rows {
            row.resize(width, Cell::Empty);
        }
    }

    /// Stable sort by (SubjectID, Timeline, TargetAge); rows without an age sort last
    /// within their subject/timeline group
    pub fn sort_by_subject_timeline_age(&mut self) {
        let subject = self.column_index("SubjectID");
        let timeline = self.column_index("Timeline");
        let age = self.column_index("TargetAge");
        if subject.is_none() && timeline.is_none() && age.is_none() {
            return;
        }

        let text_at = |row: &[Cell], col: Option<usize>| -> String {
            col.and_then(|c| row.get(c)).map(Cell::as_text).unwrap_or_default()
        };
        let age_at = |row: &[Cell], col: Option<usize>| -> Option<f64> {
            col.and_then(|c| row.get(c)).and_then(Cell::as_number)
        };

        self.rows.sort_by(|a, b| {
            let (a, b) = (a.as_slice(), b.as_slice());
            text_at(a, subject)
                .cmp(&text_at(b, subject))
                .then_with(|| text_at(a, timeline).cmp(&text_at(b, timeline)))
                .then_with(|| compare_missing_last(age_at(a, age), age_at(b, age)))
        });
    }
}

fn compare_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_float_renders_as_integer() {
        assert_eq!(Cell::Float(35.0).as_text(), "35");
        assert_eq!(Cell::Float(3.5).as_text(), "3.5");
        assert_eq!(Cell::Int(20).as_text(), "20");
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Cell::Text(" 45 ".into()).as_number(), Some(45.0));
        assert_eq!(Cell::Text("n/a".into()).as_number(), None);
        assert_eq!(Cell::Empty.as_number(), None);
        assert_eq!(Cell::Float(45.7).as_age(), Some(45));
    }

    #[test]
    fn test_add_column_pads_existing_rows() {
        let mut table = Table::new(["SubjectID"]);
        table.push_row(vec![Cell::from("S001")]);
        table.add_column("RunID", Cell::Empty);

        assert_eq!(table.rows[0].len(), 2);
        assert_eq!(table.get(0, "RunID"), &Cell::Empty);
    }

    #[test]
    fn test_set_unknown_column_is_rejected() {
        let mut table = Table::new(["SubjectID"]);
        table.push_row(vec![]);
        assert!(!table.set(0, "Nope", "x"));
        assert!(table.set(0, "SubjectID", "S001"));
        assert_eq!(table.text(0, "SubjectID"), "S001");
    }

    #[test]
    fn test_sort_is_stable_with_missing_ages_last() {
        let mut table = Table::new(["SubjectID", "Timeline", "TargetAge", "Tag"]);
        table.push_row(vec!["S002".into(), "A".into(), Cell::Int(20), "a".into()]);
        table.push_row(vec!["S001".into(), "A".into(), Cell::Empty, "b".into()]);
        table.push_row(vec!["S001".into(), "A".into(), Cell::Int(70), "c".into()]);
        table.push_row(vec!["S001".into(), "A".into(), Cell::Float(35.0), "d".into()]);
        table.push_row(vec!["S001".into(), "A".into(), Cell::Int(70), "e".into()]);

        table.sort_by_subject_timeline_age();

        let tags: Vec<String> = (0..table.len()).map(|i| table.text(i, "Tag")).collect();
        assert_eq!(tags, ["d", "c", "e", "b", "a"]);
    }
}
