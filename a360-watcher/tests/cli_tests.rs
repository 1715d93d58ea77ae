//! Binary tests for the one-shot subcommands

use std::path::Path;
use std::process::Command;

use a360_common::config::WatcherConfig;
use a360_watcher::ledger::{Cell, Table, XlsxLedger, IMAGES_SHEET, SUBJECTS_SHEET};
use serde_json::Value;

fn write_project(dir: &Path) -> std::path::PathBuf {
    let root = dir.join("A360");
    let out_dir = dir.join("output");
    std::fs::create_dir_all(root.join("Female/Korean/subject010/TimelineA")).unwrap();
    std::fs::create_dir_all(&out_dir).unwrap();

    let mut subjects = Table::new(["SubjectID", "Sex", "Base_Path"]);
    subjects.push_row(vec![
        "S010".into(),
        "Female".into(),
        "Female/Korean/subject010".into(),
    ]);
    let mut images = Table::new(["SubjectID", "Timeline", "TargetAge", "ImageID"]);
    images.push_row(vec!["S010".into(), "A".into(), Cell::Int(20), "S010_A20_Gem".into()]);
    let excel_path = root.join("A360_Master.xlsx");
    XlsxLedger::create(&excel_path, &[(SUBJECTS_SHEET, &subjects), (IMAGES_SHEET, &images)])
        .unwrap();

    // Archived earlier but never recorded
    std::fs::write(
        root.join("Female/Korean/subject010/TimelineA/S010_A45.png"),
        b"pixels",
    )
    .unwrap();

    let config = WatcherConfig::new(&root, &excel_path, &out_dir);
    let config_path = dir.join("a360.json");
    std::fs::write(&config_path, serde_json::to_string(&config).unwrap()).unwrap();
    config_path
}

#[test]
fn test_reconcile_prints_only_the_report_on_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_project(dir.path());

    let output = Command::new(env!("CARGO_BIN_EXE_a360-watcher"))
        .arg("--config")
        .arg(&config_path)
        .arg("reconcile")
        .env("RUST_LOG", "info")
        .env_remove("A360_CONFIG_PATH")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // stdout is exactly one JSON document even with info logging on
    let stdout = String::from_utf8(output.stdout).unwrap();
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["repaired"].as_array().unwrap().len(), 1);
    assert_eq!(report["repaired"][0]["imageId"], "S010_A45_Gem");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Reconcile complete"));
}
