//! Persistent ledger document abstraction
//!
//! The store only needs two primitives: load one named table, and save a set of named
//! tables in one write that leaves every other table untouched.

use super::table::Table;
use crate::error::{LedgerError, LedgerResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A tabular document holding named tables
pub trait LedgerDocument: Send + Sync {
    /// Load one table by name
    fn load_table(&self, name: &str) -> LedgerResult<Table>;

    /// Replace the given tables in one save; other tables are preserved
    fn save_tables(&self, tables: &[(&str, &Table)]) -> LedgerResult<()>;

    /// Human-readable location for log messages
    fn describe(&self) -> String;
}

/// In-memory ledger document
///
/// Used by tests and dry runs. Can simulate a document held open by another process and
/// slow I/O (to widen race windows in concurrency tests).
#[derive(Debug, Default)]
pub struct MemoryLedger {
    tables: Mutex<HashMap<String, Table>>,
    locked: AtomicBool,
    read_only: AtomicBool,
    io_delay: Option<Duration>,
    saves: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, table: Table) -> Self {
        self.put_table(name, table);
        self
    }

    /// Sleep this long inside every load and save
    pub fn with_io_delay(mut self, delay: Duration) -> Self {
        self.io_delay = Some(delay);
        self
    }

    /// Simulate the document being open in another program
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    /// Reads succeed but saves fail as locked, like a workbook open in Excel
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Snapshot of a stored table
    pub fn table(&self, name: &str) -> Option<Table> {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Replace a table directly, bypassing the lock simulation (an "external edit")
    pub fn put_table(&self, name: &str, mut table: Table) {
        table.normalize();
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), table);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_locked(&self) -> LedgerResult<()> {
        if self.locked.load(Ordering::SeqCst) {
            Err(LedgerError::Locked(PathBuf::from("memory")))
        } else {
            Ok(())
        }
    }

    fn simulate_io(&self) {
        if let Some(delay) = self.io_delay {
            std::thread::sleep(delay);
        }
    }
}

impl LedgerDocument for MemoryLedger {
    fn load_table(&self, name: &str) -> LedgerResult<Table> {
        self.check_locked()?;
        self.simulate_io();
        self.table(name)
            .ok_or_else(|| LedgerError::MissingTable(name.to_string()))
    }

    fn save_tables(&self, tables: &[(&str, &Table)]) -> LedgerResult<()> {
        self.check_locked()?;
        self.simulate_io();
        if self.read_only.load(Ordering::SeqCst) {
            return Err(LedgerError::Locked(PathBuf::from("memory")));
        }
        let mut stored = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        for (name, table) in tables {
            stored.insert(name.to_string(), (*table).clone());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory ledger".to_string()
    }
}
