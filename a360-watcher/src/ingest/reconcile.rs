//! Archive → ledger reconciliation
//!
//! Files can be in the archive without a matching Images row, typically because the
//! ledger was locked when they were ingested. Reconciliation scans every subject's
//! timeline folder and applies the normal image update for each canonical file the ledger
//! does not know about. It never moves, copies or deletes files.

use crate::error::LedgerResult;
use crate::ledger::store::find_image_row;
use crate::ledger::{LedgerStore, SubjectDirectory};
use crate::services::{canonical_filename, parse_path};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One repaired Images row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairedImage {
    pub subject_id: String,
    pub age: u32,
    pub filename: String,
    pub image_id: String,
}

/// Summary of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Timeline folders that exist and were scanned
    pub folders_scanned: usize,
    /// Canonical archive files found
    pub files_seen: usize,
    /// Files whose Images row already names them
    pub already_present: usize,
    pub repaired: Vec<RepairedImage>,
}

/// Reconcile the archive against the ledger, holding the ledger lock throughout
pub fn reconcile_archive(
    ledger: &LedgerStore,
    project_root: &Path,
    image_extension: &str,
) -> LedgerResult<ReconcileReport> {
    let settings = ledger.settings().clone();
    let mut txn = ledger.begin();
    let subjects = SubjectDirectory::from_table(&txn.load_subjects_table()?);
    let images = txn.load_images_table()?;

    let mut report = ReconcileReport::default();

    for (subject_id, base_path) in subjects.subjects_with_base_path() {
        let folder = project_root
            .join(base_path.trim_matches(['/', '\\']))
            .join(&settings.timeline_folder_name);
        if !folder.is_dir() {
            continue;
        }
        report.folders_scanned += 1;

        for path in canonical_files(&folder, subject_id, image_extension) {
            let Some(parsed) = parse_path(&path) else {
                continue;
            };
            report.files_seen += 1;
            let filename = canonical_filename(subject_id, parsed.age, image_extension);

            let known = find_image_row(&images, subject_id, &settings.timeline_code, parsed.age)
                .map(|row| images.text(row, "Filename") == filename)
                .unwrap_or(false);
            if known {
                report.already_present += 1;
                continue;
            }

            let update = txn.apply_image_update(subject_id, parsed.age, base_path, &filename)?;
            info!(
                subject_id = %subject_id,
                age = parsed.age,
                image_id = %update.image_id,
                "Ledger row repaired from archive"
            );
            report.repaired.push(RepairedImage {
                subject_id: subject_id.to_string(),
                age: parsed.age,
                filename,
                image_id: update.image_id,
            });
        }
    }

    Ok(report)
}

/// Files in `folder` named exactly `{subject}_A{age:02}.{ext}`, sorted by name
fn canonical_files(folder: &Path, subject_id: &str, image_extension: &str) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "Cannot read archive folder");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let Some(parsed) = parse_path(path) else {
                return false;
            };
            let expected = canonical_filename(subject_id, parsed.age, image_extension);
            parsed.subject_id == subject_id
                && path.file_name().and_then(|n| n.to_str()) == Some(expected.as_str())
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Cell, LedgerSettings, MemoryLedger, Table, IMAGES_SHEET, SUBJECTS_SHEET};
    use std::sync::Arc;

    #[test]
    fn test_only_canonical_files_for_subject() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "S010_A35.png",
            "S010_A45.png",
            "S010_A35_0001.png",
            "S011_A35.png",
            "S010_A50.jpg",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("_replaced")).unwrap();

        let names: Vec<String> = canonical_files(dir.path(), "S010", "png")
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["S010_A35.png", "S010_A45.png"]);
    }

    #[test]
    fn test_reconcile_repairs_missing_rows_only() {
        let dir = tempfile::tempdir().unwrap();
        let timeline = dir.path().join("Male/Ghanaian/subject002/TimelineA");
        std::fs::create_dir_all(&timeline).unwrap();
        std::fs::write(timeline.join("S002_A20.png"), b"x").unwrap();
        std::fs::write(timeline.join("S002_A55.png"), b"x").unwrap();

        let mut subjects = Table::new(["SubjectID", "Base_Path"]);
        subjects.push_row(vec!["S002".into(), "Male/Ghanaian/subject002".into()]);
        subjects.push_row(vec!["S003".into(), "Male/Missing/subject003".into()]);
        let mut images = Table::new(["SubjectID", "Timeline", "TargetAge", "Filename"]);
        images.push_row(vec!["S002".into(), "A".into(), Cell::Int(20), "S002_A20.png".into()]);

        let ledger = Arc::new(
            MemoryLedger::new()
                .with_table(SUBJECTS_SHEET, subjects)
                .with_table(IMAGES_SHEET, images),
        );
        let store = LedgerStore::new(ledger.clone(), LedgerSettings::default());

        let report = reconcile_archive(&store, dir.path(), "png").unwrap();
        assert_eq!(report.folders_scanned, 1);
        assert_eq!(report.files_seen, 2);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.repaired.len(), 1);
        assert_eq!(report.repaired[0].image_id, "S002_A55_Gem");

        let saved = ledger.table(IMAGES_SHEET).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(ledger.save_count(), 1);

        // Second pass finds nothing to do
        let again = reconcile_archive(&store, dir.path(), "png").unwrap();
        assert!(again.repaired.is_empty());
        assert_eq!(again.already_present, 2);
        assert!(timeline.join("S002_A55.png").exists());
    }
}
