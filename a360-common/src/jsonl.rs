//! Append-only newline-delimited JSON sinks
//!
//! Used for the event log and the dataset index. Appends are best-effort: a failed write
//! is logged and reported to the caller but never aborts ingestion.

use crate::Result;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Append-only JSONL file
///
/// Each record is written with a single `write_all` of the full line while holding an
/// internal mutex, so lines from concurrent ingestion threads never interleave.
#[derive(Debug)]
pub struct JsonlWriter {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Append, logging instead of returning failures
    pub fn append_best_effort<T: Serialize>(&self, record: &T) -> bool {
        match self.append(record) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to append jsonl: {}: {}", self.path.display(), e);
                false
            }
        }
    }
}
