//! End-to-end ingestion tests
//!
//! Drive real files through the ingestor into a real workbook, dataset index and event log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use a360_common::config::WatcherConfig;
use a360_common::events::{FailureReason, IngestStatus, WatcherEvent};
use a360_common::jsonl::JsonlWriter;
use a360_watcher::broadcaster::StatusPublisher;
use a360_watcher::ingest::{reconcile_archive, Ingestor, Outcome};
use a360_watcher::ledger::{
    Cell, LedgerDocument, LedgerSettings, LedgerStore, MemoryLedger, Table, XlsxLedger,
    IMAGES_SHEET, PROMPTS_SHEET, SUBJECTS_SHEET,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

struct Project {
    _dir: TempDir,
    root: PathBuf,
    out_dir: PathBuf,
    config: WatcherConfig,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("A360");
        let out_dir = dir.path().join("ComfyUI/output");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&out_dir).unwrap();

        let mut config = WatcherConfig::new(&root, root.join("A360_Master.xlsx"), &out_dir);
        config.stability_timeout_ms = 2_000;
        config.stability_interval_ms = 20;

        Self {
            _dir: dir,
            root,
            out_dir,
            config,
        }
    }

    fn create_workbook(&self) -> XlsxLedger {
        let mut subjects = Table::new([
            "SubjectID",
            "Sex",
            "Ethnicity_Group",
            "Fitzpatrick_Tone",
            "Base_Path",
        ]);
        subjects.push_row(vec![
            "S010".into(),
            "Female".into(),
            "Korean".into(),
            "III".into(),
            "Female/Korean/subject010".into(),
        ]);
        let mut images = Table::new(["SubjectID", "Timeline", "TargetAge", "ImageID"]);
        images.push_row(vec![
            "S010".into(),
            "A".into(),
            Cell::Int(20),
            "S010_A20_Gem".into(),
        ]);

        XlsxLedger::create(
            &self.config.excel_path,
            &[(SUBJECTS_SHEET, &subjects), (IMAGES_SHEET, &images)],
        )
        .unwrap()
    }

    fn ingestor(&self, document: Arc<dyn LedgerDocument>) -> (Ingestor, UnboundedReceiver<WatcherEvent>) {
        let ledger = Arc::new(LedgerStore::new(document, LedgerSettings::from_config(&self.config)));
        let event_log = Some(Arc::new(JsonlWriter::new(self.config.event_log_path())));
        let (publisher, events) = StatusPublisher::channel(event_log);
        (Ingestor::from_config(&self.config, ledger, publisher), events)
    }

    fn drop_output(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.out_dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn timeline_dir(&self) -> PathBuf {
        self.root.join("Female/Korean/subject010/TimelineA")
    }
}

fn drain(events: &mut UnboundedReceiver<WatcherEvent>) -> Vec<WatcherEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn read_jsonl(path: &Path) -> Vec<Value> {
    match std::fs::read_to_string(path) {
        Ok(text) => text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn test_new_output_is_archived_recorded_and_indexed() {
    let project = Project::new();
    let workbook = Arc::new(project.create_workbook());
    let (ingestor, mut events) = project.ingestor(workbook.clone());

    let src = project.drop_output("S010_A35_0001.png", b"aged pixels");
    let ingested = match ingestor.process(&src) {
        Outcome::Ingested(ingested) => ingested,
        other => panic!("expected ingest, got {:?}", other),
    };

    // Archive copy under the canonical name; output left in place
    let dest = project.timeline_dir().join("S010_A35.png");
    assert_eq!(ingested.stored.dest_path, dest);
    assert_eq!(std::fs::read(&dest).unwrap(), b"aged pixels");
    assert!(src.exists());

    // Ledger rows
    let images = workbook.load_table(IMAGES_SHEET).unwrap();
    assert_eq!(images.len(), 2);
    let row = (0..images.len())
        .find(|&r| images.get(r, "TargetAge").as_age() == Some(35))
        .unwrap();
    assert_eq!(images.text(row, "ImageID"), "S010_A35_Gem");
    assert_eq!(images.text(row, "Filename"), "S010_A35.png");
    assert_eq!(images.text(row, "FolderPath"), "Female/Korean/subject010/TimelineA");
    assert_eq!(images.text(row, "RunID"), ingested.run_id);
    assert_eq!(images.text(row, "BaseInput20_ID"), "S010_A20_Gem");
    assert_eq!(images.text(row, "BaseInput70_ID"), "S010_A70_Gem");
    assert!(ingested.run_id.starts_with("CUI_S010_A35_"));

    let prompts = workbook.load_table(PROMPTS_SHEET).unwrap();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts.text(1, "OutputImageID"), "S010_A35_Gem");
    assert_eq!(prompts.text(1, "PromptType"), "Age_from_20");

    // Dataset index
    let index = read_jsonl(&project.config.dataset_index_path());
    assert_eq!(index.len(), 1);
    let entry = &index[0];
    assert_eq!(entry["schema"], "A360_dataset_index_v1");
    assert_eq!(entry["subjectId"], "S010");
    assert_eq!(entry["age"], 35);
    assert_eq!(entry["imageId"], "S010_A35_Gem");
    assert_eq!(entry["runId"], ingested.run_id.as_str());
    assert_eq!(entry["destRel"], "Female/Korean/subject010/TimelineA/S010_A35.png");
    assert_eq!(entry["overwrite"], false);
    assert_eq!(entry["bytes"], 11);
    assert_eq!(entry["labels"]["sex"], "Female");

    // Events, in order, mirrored to the event log
    let statuses: Vec<IngestStatus> = drain(&mut events).iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        [
            IngestStatus::Detected,
            IngestStatus::Validated,
            IngestStatus::Stored,
            IngestStatus::Ingesting,
            IngestStatus::Ingested,
        ]
    );
    let log = read_jsonl(&project.config.event_log_path());
    assert_eq!(log.len(), 5);
    assert_eq!(log[4]["type"], "WATCHER_EVENT");
    assert_eq!(log[4]["status"], "INGESTED");
    assert_eq!(log[4]["stage"], "COMFY_OUTPUT");
    assert_eq!(log[4]["image"], "A35");
}

#[test]
fn test_unknown_subject_fails_without_side_effects() {
    let project = Project::new();
    let mut subjects = Table::new(["SubjectID", "Base_Path"]);
    subjects.push_row(vec!["S010".into(), "Female/Korean/subject010".into()]);
    let memory = Arc::new(
        MemoryLedger::new()
            .with_table(SUBJECTS_SHEET, subjects)
            .with_table(IMAGES_SHEET, Table::new(["SubjectID", "Timeline", "TargetAge"])),
    );
    let (ingestor, mut events) = project.ingestor(memory.clone());

    let src = project.drop_output("S999_A40.png", b"pixels");
    let outcome = ingestor.process(&src);
    assert_eq!(outcome.failure_reason(), Some(FailureReason::NoBasePath));

    let events = drain(&mut events);
    let errors: Vec<&WatcherEvent> = events
        .iter()
        .filter(|e| e.status == IngestStatus::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].subject_id, "S999");
    assert_eq!(errors[0].reason(), Some("no base path for subject"));
    assert_eq!(events.last().map(|e| e.status), Some(IngestStatus::Error));

    assert!(src.exists());
    let archive_dirs = std::fs::read_dir(&project.root)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .count();
    assert_eq!(archive_dirs, 0, "nothing was archived");
    assert_eq!(memory.save_count(), 0);
    assert!(read_jsonl(&project.config.dataset_index_path()).is_empty());
}

#[test]
fn test_regenerated_output_replaces_archive_file_with_backup() {
    let project = Project::new();
    let workbook = Arc::new(project.create_workbook());
    let (ingestor, _events) = project.ingestor(workbook.clone());

    let first = project.drop_output("S010_A50_0001.png", b"first take");
    assert!(ingestor.process(&first).is_ingested());
    let second = project.drop_output("S010_A50_0002.png", b"second take");
    let Outcome::Ingested(ingested) = ingestor.process(&second) else {
        panic!("second take not ingested");
    };

    let dest = project.timeline_dir().join("S010_A50.png");
    assert_eq!(std::fs::read(&dest).unwrap(), b"second take");

    let backup = ingested.stored.backup_path.clone().unwrap();
    assert!(backup.starts_with(project.timeline_dir().join("_replaced")));
    assert!(backup
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("S010_A50.png."));
    assert_eq!(std::fs::read(&backup).unwrap(), b"first take");

    // Still one ledger row for age 50
    let images = workbook.load_table(IMAGES_SHEET).unwrap();
    let rows = (0..images.len())
        .filter(|&r| images.get(r, "TargetAge").as_age() == Some(50))
        .count();
    assert_eq!(rows, 1);

    let index = read_jsonl(&project.config.dataset_index_path());
    assert_eq!(index.len(), 2);
    assert_eq!(index[1]["overwrite"], true);
    assert_eq!(index[1]["backupPath"], backup.display().to_string());
}

#[test]
fn test_locked_ledger_keeps_file_and_reconcile_repairs_it() {
    let project = Project::new();
    let mut subjects = Table::new(["SubjectID", "Base_Path"]);
    subjects.push_row(vec!["S010".into(), "Female/Korean/subject010".into()]);
    let memory = Arc::new(
        MemoryLedger::new()
            .with_table(SUBJECTS_SHEET, subjects)
            .with_table(IMAGES_SHEET, Table::new(["SubjectID", "Timeline", "TargetAge"])),
    );
    let (ingestor, _events) = project.ingestor(memory.clone());
    ingestor.refresh_subjects().unwrap();

    memory.set_locked(true);
    let src = project.drop_output("S010_A60.png", b"pixels");
    assert_eq!(
        ingestor.process(&src).failure_reason(),
        Some(FailureReason::LedgerLocked)
    );
    assert!(project.timeline_dir().join("S010_A60.png").exists());
    assert!(read_jsonl(&project.config.dataset_index_path()).is_empty());

    memory.set_locked(false);
    let store = LedgerStore::new(memory.clone(), LedgerSettings::from_config(&project.config));
    let report = reconcile_archive(&store, &project.root, "png").unwrap();
    assert_eq!(report.repaired.len(), 1);
    assert_eq!(report.repaired[0].image_id, "S010_A60_Gem");
    assert_eq!(memory.table(IMAGES_SHEET).unwrap().len(), 1);
}

#[test]
fn test_workbook_keeps_foreign_sheets_across_ingests() {
    let project = Project::new();
    let workbook = project.create_workbook();
    let mut notes = Table::new(["Key", "Value"]);
    notes.push_row(vec!["owner".into(), "lab".into()]);
    workbook.save_tables(&[("Notes", &notes)]).unwrap();
    let workbook = Arc::new(workbook);

    let (ingestor, _events) = project.ingestor(workbook.clone());
    let src = project.drop_output("S010_A25.png", b"pixels");
    assert!(ingestor.process(&src).is_ingested());

    let sheets: Vec<String> = workbook
        .read_all()
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(sheets, ["Subjects", "Images", "Notes", "Prompts_Auto"]);
    assert_eq!(workbook.load_table("Notes").unwrap(), notes);
}
