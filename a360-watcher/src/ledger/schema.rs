//! Declarative sheet schemas and column reconciliation
//!
//! Sheets may be edited by hand, so a required column can be missing. Reconciliation is
//! additive only: missing columns are appended with their default value, unknown columns
//! are never dropped or reordered.

use super::table::{Cell, Table};

/// Sheet holding one row per subject
pub const SUBJECTS_SHEET: &str = "Subjects";
/// Sheet holding one row per (subject, timeline, age)
pub const IMAGES_SHEET: &str = "Images";
/// Fully derived prompt sheet
pub const PROMPTS_SHEET: &str = "Prompts_Auto";

/// Required column with the value backfilled into existing rows
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: &'static str,
    pub default_value: Cell,
}

impl ColumnDefinition {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            default_value: Cell::Empty,
        }
    }

    pub fn default(mut self, value: impl Into<Cell>) -> Self {
        self.default_value = value.into();
        self
    }
}

/// Columns the image update writes, in the order they are appended when missing
pub fn image_columns() -> Vec<ColumnDefinition> {
    [
        "SubjectID",
        "Timeline",
        "TargetAge",
        "FolderPath",
        "Filename",
        "ImageID",
        "GenerationStage",
        "SourceModelTool",
        "BaseInput20_ID",
        "BaseInput70_ID",
        "RunID",
    ]
    .into_iter()
    .map(ColumnDefinition::new)
    .collect()
}

/// Column order of the prompt sheet
pub const PROMPT_COLUMNS: [&str; 10] = [
    "SubjectID",
    "Timeline",
    "TargetAge",
    "PromptType",
    "BaseImageID",
    "OutputImageID",
    "Sex",
    "Ethnicity_Group",
    "Fitzpatrick_Tone",
    "PromptText",
];

/// Required columns absent from `existing`, in required order
pub fn missing_columns<'a>(
    existing: &[String],
    required: &'a [ColumnDefinition],
) -> Vec<&'a ColumnDefinition> {
    required
        .iter()
        .filter(|def| !existing.iter().any(|c| c == def.name))
        .collect()
}

/// Append missing required columns to a table; returns the names added
pub fn reconcile_columns(table: &mut Table, required: &[ColumnDefinition]) -> Vec<&'static str> {
    let missing: Vec<ColumnDefinition> = missing_columns(&table.columns, required)
        .into_iter()
        .cloned()
        .collect();

    missing
        .into_iter()
        .map(|def| {
            table.add_column(def.name, def.default_value);
            def.name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(defs: &[&ColumnDefinition]) -> Vec<&'static str> {
        defs.iter().map(|d| d.name).collect()
    }

    #[test]
    fn test_missing_columns_in_required_order() {
        let existing: Vec<String> = ["ImageID", "Notes", "SubjectID"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let required = vec![
            ColumnDefinition::new("SubjectID"),
            ColumnDefinition::new("Timeline"),
            ColumnDefinition::new("ImageID"),
            ColumnDefinition::new("RunID"),
        ];

        assert_eq!(names(&missing_columns(&existing, &required)), ["Timeline", "RunID"]);
    }

    #[test]
    fn test_no_missing_columns() {
        let existing: Vec<String> = vec!["A".into(), "B".into()];
        let required = vec![ColumnDefinition::new("B"), ColumnDefinition::new("A")];
        assert!(missing_columns(&existing, &required).is_empty());
    }

    #[test]
    fn test_reconcile_keeps_unknown_columns_and_backfills() {
        let mut table = Table::new(["Legacy", "SubjectID"]);
        table.push_row(vec!["keep".into(), "S001".into()]);

        let required = vec![
            ColumnDefinition::new("SubjectID"),
            ColumnDefinition::new("GenerationStage").default("Manual"),
        ];
        let added = reconcile_columns(&mut table, &required);

        assert_eq!(added, ["GenerationStage"]);
        assert_eq!(table.columns, ["Legacy", "SubjectID", "GenerationStage"]);
        assert_eq!(table.text(0, "Legacy"), "keep");
        assert_eq!(table.text(0, "GenerationStage"), "Manual");
    }

    #[test]
    fn test_image_columns_cover_lineage_fields() {
        let names: Vec<&str> = image_columns().iter().map(|d| d.name).collect();
        for col in ["BaseInput20_ID", "BaseInput70_ID", "RunID", "FolderPath"] {
            assert!(names.contains(&col));
        }
    }
}
