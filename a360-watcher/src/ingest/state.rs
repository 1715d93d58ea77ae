//! Per-file ingestion states
//!
//! DETECTED → VALIDATED → STORED → INGESTING → INGESTED, with ERROR reachable from every
//! step. Each state carries exactly what the next transition needs, so a transition can
//! only be called with the output of the one before it.

use a360_common::events::FailureReason;
use std::path::PathBuf;

/// Ingestible file name seen in the watched folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub src_path: PathBuf,
    pub subject_id: String,
    pub age: u32,
}

/// Subject resolved to its archive base path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub src_path: PathBuf,
    pub subject_id: String,
    pub age: u32,
    /// Archive-relative subject folder, as written in the Subjects sheet
    pub base_path_rel: String,
}

/// File copied into the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    pub src_path: PathBuf,
    pub subject_id: String,
    pub age: u32,
    pub base_path_rel: String,
    pub dest_path: PathBuf,
    /// Canonical archive file name (`S010_A35.png`)
    pub filename: String,
    /// A previous file occupied the destination
    pub overwrite: bool,
    /// Where the previous file was moved
    pub backup_path: Option<PathBuf>,
    pub bytes: Option<u64>,
    pub sha256: Option<String>,
}

/// Ledger updated and dataset index appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub stored: Stored,
    pub image_id: String,
    pub run_id: String,
}

/// Processing of a file stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub subject_id: String,
    pub age: u32,
    pub reason: FailureReason,
    /// Source path before the copy, archive path after it
    pub path: PathBuf,
}

/// Final state of one processed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not an ingestible file; no event was emitted
    Ignored,
    Ingested(Ingested),
    Failed(Failure),
}

impl Outcome {
    pub fn is_ingested(&self) -> bool {
        matches!(self, Outcome::Ingested(_))
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Outcome::Failed(failure) => Some(failure.reason),
            _ => None,
        }
    }
}

impl Detected {
    pub fn validated(self, base_path_rel: String) -> Validated {
        Validated {
            src_path: self.src_path,
            subject_id: self.subject_id,
            age: self.age,
            base_path_rel,
        }
    }
}
