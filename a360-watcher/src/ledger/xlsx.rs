//! `.xlsx` ledger workbook
//!
//! Read with `calamine`, written with `rust_xlsxwriter`. A save reads every sheet, swaps in
//! the replaced tables, writes the whole workbook to a sibling temp file and renames it over
//! the original, so a failed save never leaves a truncated workbook behind.
//!
//! Only cell values survive a save. Formatting, formulas and column widths of the original
//! workbook are not carried over.

use super::document::LedgerDocument;
use super::table::{Cell, Table};
use crate::error::{LedgerError, LedgerResult};
use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Number format applied to date cells on save; calamine reads it back as a date
const DATE_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Ledger stored as an Excel workbook on disk
#[derive(Debug, Clone)]
pub struct XlsxLedger {
    path: PathBuf,
}

impl XlsxLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a new workbook containing exactly `tables`, replacing any existing file
    pub fn create(path: impl Into<PathBuf>, tables: &[(&str, &Table)]) -> LedgerResult<Self> {
        let ledger = Self::new(path);
        let owned: Vec<(String, Table)> = tables
            .iter()
            .map(|(name, table)| (name.to_string(), (*table).clone()))
            .collect();
        ledger.write_workbook(&owned)?;
        Ok(ledger)
    }

    /// All sheets in workbook order
    pub fn read_all(&self) -> LedgerResult<Vec<(String, Table)>> {
        let mut workbook = self.open()?;
        let names = workbook.sheet_names().to_vec();

        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let range = workbook.worksheet_range(&name)?;
            sheets.push((name, table_from_range(&range)));
        }
        Ok(sheets)
    }

    /// Open for reading; a sharing violation surfaces as `Locked`
    fn open(&self) -> LedgerResult<Xlsx<BufReader<File>>> {
        let file = File::open(&self.path).map_err(|e| LedgerError::from_io(&self.path, e))?;
        Ok(Xlsx::new(BufReader::new(file))?)
    }

    fn write_workbook(&self, sheets: &[(String, Table)]) -> LedgerResult<()> {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format(DATE_FORMAT);
        for (name, table) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(name)?;

            for (col, header) in table.columns.iter().enumerate() {
                worksheet.write_string(0, col as u16, header)?;
            }
            for (row_idx, row) in table.rows.iter().enumerate() {
                let row_num = (row_idx + 1) as u32;
                for (col, cell) in row.iter().enumerate() {
                    let col = col as u16;
                    match cell {
                        Cell::Empty => {}
                        Cell::Text(s) => {
                            worksheet.write_string(row_num, col, s)?;
                        }
                        Cell::Int(i) => {
                            worksheet.write_number(row_num, col, *i as f64)?;
                        }
                        Cell::Float(f) => {
                            worksheet.write_number(row_num, col, *f)?;
                        }
                        Cell::Bool(b) => {
                            worksheet.write_boolean(row_num, col, *b)?;
                        }
                        Cell::DateTime(serial) => {
                            worksheet.write_number_with_format(
                                row_num,
                                col,
                                *serial,
                                &date_format,
                            )?;
                        }
                    }
                }
            }
        }

        let temp_path = self.temp_path();
        if let Err(e) = workbook.save(&temp_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }

        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(LedgerError::from_io(&self.path, e));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger.xlsx".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp.xlsx", file_name, uuid::Uuid::new_v4().simple()))
    }
}

impl LedgerDocument for XlsxLedger {
    fn load_table(&self, name: &str) -> LedgerResult<Table> {
        let mut workbook = self.open()?;
        if !workbook.sheet_names().iter().any(|s| s == name) {
            return Err(LedgerError::MissingTable(name.to_string()));
        }
        let range = workbook.worksheet_range(name)?;
        Ok(table_from_range(&range))
    }

    fn save_tables(&self, tables: &[(&str, &Table)]) -> LedgerResult<()> {
        let mut sheets = self.read_all()?;

        for (name, table) in tables {
            match sheets.iter_mut().find(|(existing, _)| existing.as_str() == *name) {
                Some((_, slot)) => *slot = (*table).clone(),
                None => sheets.push((name.to_string(), (*table).clone())),
            }
        }

        self.write_workbook(&sheets)?;
        debug!(
            path = %self.path.display(),
            tables = tables.len(),
            "Ledger workbook saved"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// First non-empty row is the header; blank header cells become `Unnamed: {index}`
fn table_from_range(range: &calamine::Range<Data>) -> Table {
    let mut rows = range.rows().skip_while(|row| row.iter().all(|c| matches!(c, Data::Empty)));

    let Some(header) = rows.next() else {
        return Table::default();
    };

    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            let name = cell_from_data(c).trimmed();
            if name.is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                name
            }
        })
        .collect();

    let mut table = Table::new(columns);
    for row in rows {
        // Fully blank rows are not data
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        table.push_row(row.iter().map(cell_from_data).collect());
    }
    table
}

fn cell_from_data(c: &Data) -> Cell {
    match c {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => Cell::Float(dt.as_f64()),
        Data::DateTime(dt) => Cell::DateTime(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}
