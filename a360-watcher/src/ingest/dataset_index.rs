//! ML dataset index records
//!
//! One line per successfully ingested image, appended inside the ledger lock right after
//! the ledger save.

use crate::ledger::SubjectLabels;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema tag of every record
pub const DATASET_INDEX_SCHEMA: &str = "A360_dataset_index_v1";

/// Stage tag of images produced by this pipeline
pub const DATASET_STAGE: &str = "TimelineImage";

/// Subject labels copied into the record at ingest time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLabels {
    pub sex: String,
    pub ethnicity_group: String,
    pub fitzpatrick_tone: String,
}

impl From<Option<&SubjectLabels>> for DatasetLabels {
    fn from(labels: Option<&SubjectLabels>) -> Self {
        labels
            .map(|l| Self {
                sex: l.sex.clone(),
                ethnicity_group: l.ethnicity_group.clone(),
                fitzpatrick_tone: l.fitzpatrick_tone.clone(),
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetIndexEntry {
    pub schema: String,
    pub utc: String,
    pub subject_id: String,
    pub timeline: String,
    pub age: u32,
    pub stage: String,
    pub src_path: String,
    pub dest_path: String,
    /// Archive-relative POSIX path, `None` when the destination is outside the root
    pub dest_rel: Option<String>,
    pub base_path_rel: String,
    pub timeline_folder_name: String,
    pub filename: String,
    pub image_id: String,
    pub run_id: String,
    pub overwrite: bool,
    pub backup_path: Option<String>,
    pub bytes: Option<u64>,
    pub sha256: Option<String>,
    pub labels: DatasetLabels,
}

/// POSIX path of `path` relative to `root`, resolving both when they exist
pub fn relative_posix(path: &Path, root: &Path) -> Option<String> {
    let resolved_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let resolved_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    let relative = resolved_path.strip_prefix(&resolved_root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_relative_posix_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Female").join("Korean").join("S010_A35.png");
        std::fs::create_dir_all(nested.parent().unwrap()).unwrap();
        std::fs::write(&nested, b"x").unwrap();

        assert_eq!(
            relative_posix(&nested, dir.path()).as_deref(),
            Some("Female/Korean/S010_A35.png")
        );
    }

    #[test]
    fn test_relative_posix_outside_root() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let file = other.path().join("x.png");
        std::fs::write(&file, b"x").unwrap();

        assert_eq!(relative_posix(&file, root.path()), None);
    }

    #[test]
    fn test_labels_default_when_subject_unknown() {
        assert_eq!(DatasetLabels::from(None), DatasetLabels::default());
    }

    #[test]
    fn test_entry_field_names() {
        let entry = DatasetIndexEntry {
            schema: DATASET_INDEX_SCHEMA.to_string(),
            utc: "2024-05-01T12:00:00+00:00".to_string(),
            subject_id: "S010".to_string(),
            timeline: "A".to_string(),
            age: 35,
            stage: DATASET_STAGE.to_string(),
            src_path: "/out/S010_A35_0001.png".to_string(),
            dest_path: "/archive/x/TimelineA/S010_A35.png".to_string(),
            dest_rel: None,
            base_path_rel: "x".to_string(),
            timeline_folder_name: "TimelineA".to_string(),
            filename: "S010_A35.png".to_string(),
            image_id: "S010_A35_Gem".to_string(),
            run_id: "CUI_S010_A35_20240501_120000_000".to_string(),
            overwrite: false,
            backup_path: None,
            bytes: Some(10),
            sha256: None,
            labels: DatasetLabels::default(),
        };

        let value = serde_json::to_value(&entry).unwrap();
        for key in [
            "schema", "utc", "subjectId", "timeline", "age", "stage", "srcPath", "destPath",
            "destRel", "basePathRel", "timelineFolderName", "filename", "imageId", "runId",
            "overwrite", "backupPath", "bytes", "sha256", "labels",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["destRel"], Value::Null);
        assert!(value["labels"].get("ethnicity_group").is_some());
    }
}
