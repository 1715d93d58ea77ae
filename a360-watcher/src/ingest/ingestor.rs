//! Ingestion state machine
//!
//! One call to [`Ingestor::process`] walks a file through every stage, emitting one status
//! event per transition. The individual transitions are public so each can be driven on
//! its own.
//!
//! A file that fails after the copy stays in the archive. The ledger can be repaired later
//! with the reconcile operation; generated output is never discarded.

use super::dataset_index::{
    relative_posix, DatasetIndexEntry, DatasetLabels, DATASET_INDEX_SCHEMA, DATASET_STAGE,
};
use super::state::{Detected, Failure, Ingested, Outcome, Stored, Validated};
use crate::broadcaster::StatusPublisher;
use crate::ledger::{LedgerStore, SubjectDirectory};
use crate::services::file_hasher::describe_file;
use crate::services::{canonical_filename, parse_path, Stability, StabilityChecker};
use a360_common::config::WatcherConfig;
use a360_common::events::{FailureReason, IngestStatus, WatcherEvent};
use a360_common::jsonl::JsonlWriter;
use a360_common::time;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Archive subfolder receiving replaced files
pub const REPLACED_DIR: &str = "_replaced";

/// Archive layout settings
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub project_root: PathBuf,
    pub timeline_code: String,
    pub timeline_folder_name: String,
    /// Lowercase, without the dot
    pub image_extension: String,
    pub hash_images: bool,
}

impl IngestSettings {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            project_root: config.project_root.clone(),
            timeline_code: config.timeline_code.clone(),
            timeline_folder_name: config.timeline_folder_name.clone(),
            image_extension: config.image_extension.clone(),
            hash_images: config.hash_images,
        }
    }
}

/// Drives detected files into the archive and ledger
pub struct Ingestor {
    settings: IngestSettings,
    ledger: Arc<LedgerStore>,
    subjects: RwLock<SubjectDirectory>,
    stability: StabilityChecker,
    publisher: StatusPublisher,
    dataset_index: Option<Arc<JsonlWriter>>,
    /// Held across backup, copy and hash so two files for one destination cannot interleave
    archive_lock: Mutex<()>,
}

impl Ingestor {
    pub fn new(settings: IngestSettings, ledger: Arc<LedgerStore>, publisher: StatusPublisher) -> Self {
        Self {
            settings,
            ledger,
            subjects: RwLock::new(SubjectDirectory::default()),
            stability: StabilityChecker::default(),
            publisher,
            dataset_index: None,
            archive_lock: Mutex::new(()),
        }
    }

    /// Build from the bootstrap config (stability timing and dataset index included)
    pub fn from_config(
        config: &WatcherConfig,
        ledger: Arc<LedgerStore>,
        publisher: StatusPublisher,
    ) -> Self {
        let dataset_index = config
            .write_dataset_index
            .then(|| Arc::new(JsonlWriter::new(config.dataset_index_path())));
        Self::new(IngestSettings::from_config(config), ledger, publisher)
            .with_stability_checker(StabilityChecker::new(
                config.stability_timeout(),
                config.stability_interval(),
            ))
            .with_dataset_index(dataset_index)
    }

    pub fn with_stability_checker(mut self, checker: StabilityChecker) -> Self {
        self.stability = checker;
        self
    }

    pub fn with_dataset_index(mut self, writer: Option<Arc<JsonlWriter>>) -> Self {
        self.dataset_index = writer;
        self
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Snapshot of the cached subject directory
    pub fn subjects(&self) -> SubjectDirectory {
        self.subjects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Reload the subject cache from the ledger
    pub fn refresh_subjects(&self) -> crate::error::LedgerResult<usize> {
        let directory = self.ledger.load_subjects()?;
        let count = directory.len();
        self.replace_subjects(directory);
        debug!(subjects = count, "Subject cache refreshed");
        Ok(count)
    }

    fn replace_subjects(&self, directory: SubjectDirectory) {
        *self.subjects.write().unwrap_or_else(|e| e.into_inner()) = directory;
    }

    fn cached_base_path(&self, subject_id: &str) -> Option<String> {
        self.subjects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .base_path(subject_id)
            .map(str::to_string)
    }

    fn emit(&self, subject_id: &str, age: u32, status: IngestStatus, path: &Path) {
        self.publisher
            .publish(WatcherEvent::new(subject_id, age, status, Some(path)));
    }

    fn fail(&self, subject_id: &str, age: u32, path: &Path, reason: FailureReason) -> Failure {
        self.publisher.publish(
            WatcherEvent::new(subject_id, age, IngestStatus::Error, Some(path)).with_reason(reason),
        );
        Failure {
            subject_id: subject_id.to_string(),
            age,
            reason,
            path: path.to_path_buf(),
        }
    }

    /// Entry condition plus filename parse; emits DETECTED on a match
    ///
    /// Anything else (directories, other extensions, unparseable names) is ignored
    /// without an event.
    pub fn detect(&self, path: &Path) -> Option<Detected> {
        if !path.is_file() {
            return None;
        }
        let extension_matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.settings.image_extension))
            .unwrap_or(false);
        if !extension_matches {
            return None;
        }

        let parsed = parse_path(path)?;
        self.emit(&parsed.subject_id, parsed.age, IngestStatus::Detected, path);
        Some(Detected {
            src_path: path.to_path_buf(),
            subject_id: parsed.subject_id,
            age: parsed.age,
        })
    }

    /// Resolve the subject's base path, refreshing the cache once on a miss
    pub fn validate(&self, detected: Detected) -> Result<Validated, Failure> {
        let mut base_path = self.cached_base_path(&detected.subject_id);

        if base_path.is_none() {
            // Subject may have been created after the last refresh
            if let Err(e) = self.refresh_subjects() {
                warn!("Failed to refresh subject cache: {}", e);
            }
            base_path = self.cached_base_path(&detected.subject_id);
        }

        let Some(base_path) = base_path else {
            warn!(
                subject_id = %detected.subject_id,
                file = %detected.src_path.display(),
                "No Base_Path in Subjects sheet; skipping file"
            );
            return Err(self.fail(
                &detected.subject_id,
                detected.age,
                &detected.src_path,
                FailureReason::NoBasePath,
            ));
        };

        self.emit(
            &detected.subject_id,
            detected.age,
            IngestStatus::Validated,
            &detected.src_path,
        );
        Ok(detected.validated(base_path))
    }

    /// Wait for the producer to finish writing
    pub fn await_stable(&self, validated: Validated) -> Result<Validated, Failure> {
        match self.stability.wait_for_stable(&validated.src_path) {
            Stability::Stable { .. } => Ok(validated),
            Stability::Unstable => {
                error!(
                    file = %validated.src_path.display(),
                    timeout_ms = self.stability.timeout().as_millis() as u64,
                    "File never stabilized"
                );
                Err(self.fail(
                    &validated.subject_id,
                    validated.age,
                    &validated.src_path,
                    FailureReason::UnstableFile,
                ))
            }
        }
    }

    /// Archive folder of a subject's timeline
    pub fn timeline_dir(&self, base_path_rel: &str) -> PathBuf {
        self.settings
            .project_root
            .join(base_path_rel.trim_matches(['/', '\\']))
            .join(&self.settings.timeline_folder_name)
    }

    /// Copy into the archive, moving any previous file into `_replaced/` first
    pub fn store(&self, validated: Validated) -> Result<Stored, Failure> {
        let timeline_dir = self.timeline_dir(&validated.base_path_rel);
        let filename = canonical_filename(
            &validated.subject_id,
            validated.age,
            &self.settings.image_extension,
        );
        let dest_path = timeline_dir.join(&filename);

        let copy_failed = |message: String| {
            error!(
                src = %validated.src_path.display(),
                dest = %dest_path.display(),
                "{}",
                message
            );
            self.fail(
                &validated.subject_id,
                validated.age,
                &validated.src_path,
                FailureReason::CopyFailed,
            )
        };

        let archive_guard = self.archive_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Err(e) = std::fs::create_dir_all(&timeline_dir) {
            return Err(copy_failed(format!("Failed to create archive folder: {}", e)));
        }

        let overwrite = dest_path.exists();
        let backup_path = if overwrite {
            match backup_existing(&dest_path, &filename) {
                Ok(path) => {
                    info!(
                        dest = %dest_path.display(),
                        backup = %path.display(),
                        "Existing archive file moved aside"
                    );
                    Some(path)
                }
                Err(e) => {
                    return Err(copy_failed(format!(
                        "Could not back up existing file; refusing to overwrite: {}",
                        e
                    )));
                }
            }
        } else {
            None
        };

        if let Err(e) = std::fs::copy(&validated.src_path, &dest_path) {
            return Err(copy_failed(format!("Failed to copy: {}", e)));
        }

        let (bytes, sha256) = describe_file(&dest_path, self.settings.hash_images);
        drop(archive_guard);

        let stored = Stored {
            src_path: validated.src_path,
            subject_id: validated.subject_id,
            age: validated.age,
            base_path_rel: validated.base_path_rel,
            dest_path,
            filename,
            overwrite,
            backup_path,
            bytes,
            sha256,
        };

        self.publisher.publish(
            WatcherEvent::new(
                &stored.subject_id,
                stored.age,
                IngestStatus::Stored,
                Some(&stored.dest_path),
            )
            .with_extra("overwrite", stored.overwrite)
            .with_extra(
                "backupPath",
                stored
                    .backup_path
                    .as_ref()
                    .map(|p| Value::from(p.display().to_string()))
                    .unwrap_or(Value::Null),
            )
            .with_extra("sha256", stored.sha256.clone().map(Value::from).unwrap_or(Value::Null))
            .with_extra("bytes", stored.bytes.map(Value::from).unwrap_or(Value::Null)),
        );

        Ok(stored)
    }

    /// Ledger transaction plus dataset index append, inside the ledger lock
    pub fn ingest(&self, stored: Stored) -> Result<Ingested, Failure> {
        let mut txn = self.ledger.begin();
        self.emit(&stored.subject_id, stored.age, IngestStatus::Ingesting, &stored.dest_path);

        let result = txn.apply_image_update(
            &stored.subject_id,
            stored.age,
            &stored.base_path_rel,
            &stored.filename,
        );
        let subjects = txn.take_subjects();
        if let Some(subjects) = &subjects {
            self.replace_subjects(subjects.clone());
        }

        let update = match result {
            Ok(update) => update,
            Err(e) => {
                drop(txn);
                let reason = if e.is_locked() {
                    error!(
                        ledger = %self.ledger.describe(),
                        "Ledger is locked by another program. Close the workbook; the stored file was kept"
                    );
                    FailureReason::LedgerLocked
                } else {
                    error!(
                        ledger = %self.ledger.describe(),
                        error = %e,
                        "Ledger update failed; the stored file was kept"
                    );
                    FailureReason::LedgerUpdateFailed
                };
                return Err(self.fail(&stored.subject_id, stored.age, &stored.dest_path, reason));
            }
        };

        let labels = DatasetLabels::from(
            subjects
                .as_ref()
                .and_then(|directory| directory.labels(&stored.subject_id)),
        );

        if let Some(index) = &self.dataset_index {
            let entry = DatasetIndexEntry {
                schema: DATASET_INDEX_SCHEMA.to_string(),
                utc: time::utc_now_iso(),
                subject_id: stored.subject_id.clone(),
                timeline: self.settings.timeline_code.clone(),
                age: stored.age,
                stage: DATASET_STAGE.to_string(),
                src_path: stored.src_path.display().to_string(),
                dest_path: stored.dest_path.display().to_string(),
                dest_rel: relative_posix(&stored.dest_path, &self.settings.project_root),
                base_path_rel: stored.base_path_rel.replace('\\', "/"),
                timeline_folder_name: self.settings.timeline_folder_name.clone(),
                filename: stored.filename.clone(),
                image_id: update.image_id.clone(),
                run_id: update.run_id.clone(),
                overwrite: stored.overwrite,
                backup_path: stored.backup_path.as_ref().map(|p| p.display().to_string()),
                bytes: stored.bytes,
                sha256: stored.sha256.clone(),
                labels,
            };
            index.append_best_effort(&entry);
        }
        drop(txn);

        info!(
            subject_id = %stored.subject_id,
            age = stored.age,
            image_id = %update.image_id,
            dest = %stored.dest_path.display(),
            "Image ingested"
        );
        self.emit(&stored.subject_id, stored.age, IngestStatus::Ingested, &stored.dest_path);

        Ok(Ingested {
            stored,
            image_id: update.image_id,
            run_id: update.run_id,
        })
    }

    /// Run one file through every stage
    pub fn process(&self, path: &Path) -> Outcome {
        let Some(detected) = self.detect(path) else {
            return Outcome::Ignored;
        };

        let result = self
            .validate(detected)
            .and_then(|validated| self.await_stable(validated))
            .and_then(|validated| self.store(validated))
            .and_then(|stored| self.ingest(stored));

        match result {
            Ok(ingested) => Outcome::Ingested(ingested),
            Err(failure) => Outcome::Failed(failure),
        }
    }
}

/// Move `dest_path` into `_replaced/{filename}.{stamp}.bak` beside it
fn backup_existing(dest_path: &Path, filename: &str) -> std::io::Result<PathBuf> {
    let backup_dir = dest_path
        .parent()
        .map(|p| p.join(REPLACED_DIR))
        .unwrap_or_else(|| PathBuf::from(REPLACED_DIR));
    std::fs::create_dir_all(&backup_dir)?;

    let stamp = time::local_stamp();
    let mut backup_path = backup_dir.join(format!("{}.{}.bak", filename, stamp));
    let mut suffix = 1;
    while backup_path.exists() {
        backup_path = backup_dir.join(format!("{}.{}_{}.bak", filename, stamp, suffix));
        suffix += 1;
    }

    std::fs::rename(dest_path, &backup_path)?;
    Ok(backup_path)
}
