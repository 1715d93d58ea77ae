//! Error types for a360-watcher

use std::path::PathBuf;
use thiserror::Error;

/// Ledger document / transaction errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Document is held open by another process (e.g. the workbook is open in Excel)
    #[error("Ledger locked: {0}")]
    Locked(PathBuf),

    /// Required sheet absent from the document
    #[error("Ledger table missing: {0}")]
    MissingTable(String),

    /// Workbook could not be parsed
    #[error("Ledger read failed: {0}")]
    Read(String),

    /// Workbook could not be written
    #[error("Ledger write failed: {0}")]
    Write(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Map an IO error on the ledger file, surfacing permission failures as `Locked`
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            LedgerError::Locked(path.to_path_buf())
        } else {
            LedgerError::Io(err)
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, LedgerError::Locked(_))
    }
}

impl From<calamine::XlsxError> for LedgerError {
    fn from(err: calamine::XlsxError) -> Self {
        LedgerError::Read(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for LedgerError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        LedgerError::Write(err.to_string())
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Folder watcher errors
#[derive(Debug, Error)]
pub enum WatchError {
    /// Watched directory does not exist
    #[error("Watched directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// Underlying notify backend failure
    #[error("Filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
}
