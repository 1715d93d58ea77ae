//! Subject directory: the cached view of the Subjects sheet
//!
//! Owned by the ingestor and replaced wholesale, either after a cache miss or after every
//! ledger transaction. Never mutated in place.

use super::table::Table;
use std::collections::HashMap;

/// Label snapshot of one subject, copied into dataset index entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectLabels {
    pub sex: String,
    pub ethnicity_group: String,
    pub fitzpatrick_tone: String,
    pub folder_name: String,
    pub base_path: String,
}

/// SubjectID → base path and SubjectID → labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectDirectory {
    base_paths: HashMap<String, String>,
    labels: HashMap<String, SubjectLabels>,
}

impl SubjectDirectory {
    /// Build from the Subjects sheet
    ///
    /// Every non-blank SubjectID gets labels; only subjects with a non-blank Base_Path get
    /// a base path.
    pub fn from_table(subjects: &Table) -> Self {
        let mut directory = Self::default();

        for row in 0..subjects.len() {
            let subject_id = subjects.text(row, "SubjectID");
            if subject_id.is_empty() {
                continue;
            }

            let labels = SubjectLabels {
                sex: subjects.text(row, "Sex"),
                ethnicity_group: subjects.text(row, "Ethnicity_Group"),
                fitzpatrick_tone: subjects.text(row, "Fitzpatrick_Tone"),
                folder_name: subjects.text(row, "Folder_Name"),
                base_path: subjects.text(row, "Base_Path"),
            };

            if !labels.base_path.is_empty() {
                directory
                    .base_paths
                    .insert(subject_id.clone(), labels.base_path.clone());
            }
            directory.labels.insert(subject_id, labels);
        }

        directory
    }

    pub fn base_path(&self, subject_id: &str) -> Option<&str> {
        self.base_paths.get(subject_id).map(String::as_str)
    }

    pub fn labels(&self, subject_id: &str) -> Option<&SubjectLabels> {
        self.labels.get(subject_id)
    }

    /// Subjects with a base path, sorted by id
    pub fn subjects_with_base_path(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .base_paths
            .iter()
            .map(|(id, path)| (id.as_str(), path.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
