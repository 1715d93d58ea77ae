//! Ledger store: the serialized image-update transaction
//!
//! Every write goes through [`LedgerStore::begin`], which takes the process-wide ledger
//! lock. Inside the lock the store reloads Subjects and Images from the document, so an
//! edit made by another tool since the last transaction is never overwritten with a stale
//! copy.

use super::document::LedgerDocument;
use super::prompts::{build_prompts, BASE_AGE, OLD_ANCHOR_AGE};
use super::schema::{self, IMAGES_SHEET, PROMPTS_SHEET, SUBJECTS_SHEET};
use super::subjects::SubjectDirectory;
use super::table::Table;
use crate::error::LedgerResult;
use a360_common::config::WatcherConfig;
use chrono::{Local, TimeZone};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// GenerationStage written for pipeline-generated ages
pub const AGE_GEN_STAGE: &str = "ComfyUI_AgeGen";

/// Canonical image identifier (`S010_A35_Gem`)
pub fn image_id(subject_id: &str, age: u32) -> String {
    format!("{}_A{:02}_Gem", subject_id, age)
}

/// Anchor ages are produced outside this pipeline and carry no lineage fields
pub fn is_anchor_age(age: u32) -> bool {
    i64::from(age) == BASE_AGE || i64::from(age) == OLD_ANCHOR_AGE
}

/// Archive-relative folder of a subject's timeline, always with `/` separators
pub fn timeline_folder_path(base_path_rel: &str, timeline_folder_name: &str) -> String {
    let base = base_path_rel.trim_end_matches(['/', '\\']);
    format!("{}/{}", base, timeline_folder_name).replace('\\', "/")
}

/// Timeline settings applied to every update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    pub timeline_code: String,
    pub timeline_folder_name: String,
    pub source_model_tool: String,
}

impl LedgerSettings {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            timeline_code: config.timeline_code.clone(),
            timeline_folder_name: config.timeline_folder_name.clone(),
            source_model_tool: config.source_model_tool.clone(),
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            timeline_code: "A".to_string(),
            timeline_folder_name: "TimelineA".to_string(),
            source_model_tool: "ComfyUI".to_string(),
        }
    }
}

/// Mints run identifiers with strictly increasing millisecond stamps
#[derive(Debug, Default)]
pub struct RunIdMint {
    last_millis: AtomicI64,
}

impl RunIdMint {
    /// `CUI_{subject}_A{age:02}_{YYYYMMDD_HHMMSS_mmm}` (local time)
    pub fn mint(&self, subject_id: &str, age: u32) -> String {
        let now = Local::now().timestamp_millis();
        let mut last = self.last_millis.load(Ordering::SeqCst);
        let stamp_millis = loop {
            let candidate = now.max(last + 1);
            match self.last_millis.compare_exchange(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break candidate,
                Err(actual) => last = actual,
            }
        };

        let stamp = Local
            .timestamp_millis_opt(stamp_millis)
            .single()
            .unwrap_or_else(Local::now)
            .format("%Y%m%d_%H%M%S_%3f");
        format!("CUI_{}_A{:02}_{}", subject_id, age, stamp)
    }
}

/// Outcome of one image update
#[derive(Debug, Clone)]
pub struct ImageUpdate {
    pub image_id: String,
    /// Minted for every update; written to the ledger for non-anchor ages only
    pub run_id: String,
    pub folder_path: String,
    /// True when a new Images row was created
    pub inserted: bool,
    /// Columns appended to the Images sheet by reconciliation
    pub added_columns: Vec<&'static str>,
}

/// Serialized access to the ledger document
pub struct LedgerStore {
    document: Arc<dyn LedgerDocument>,
    settings: LedgerSettings,
    lock: Mutex<()>,
    run_ids: RunIdMint,
}

impl LedgerStore {
    pub fn new(document: Arc<dyn LedgerDocument>, settings: LedgerSettings) -> Self {
        Self {
            document,
            settings,
            lock: Mutex::new(()),
            run_ids: RunIdMint::default(),
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn describe(&self) -> String {
        self.document.describe()
    }

    /// Take the ledger lock; released when the transaction is dropped
    pub fn begin(&self) -> LedgerTransaction<'_> {
        let guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        LedgerTransaction {
            store: self,
            subjects: None,
            _guard: guard,
        }
    }

    /// Read the Subjects sheet without taking the lock (cache refresh on a miss)
    pub fn load_subjects(&self) -> LedgerResult<SubjectDirectory> {
        let subjects = self.document.load_table(SUBJECTS_SHEET)?;
        Ok(SubjectDirectory::from_table(&subjects))
    }

    /// Regenerate and save only the prompt sheet; returns the prompt row count
    pub fn refresh_prompts(&self) -> LedgerResult<usize> {
        let txn = self.begin();
        let subjects = txn.load_subjects_table()?;
        let mut images = txn.load_images_table()?;
        images.sort_by_subject_timeline_age();

        let prompts = build_prompts(&subjects, &images, &self.settings.timeline_code);
        self.document.save_tables(&[(PROMPTS_SHEET, &prompts)])?;
        info!(
            ledger = %self.document.describe(),
            prompts = prompts.len(),
            "Prompt sheet refreshed"
        );
        Ok(prompts.len())
    }
}

/// Holder of the ledger lock
pub struct LedgerTransaction<'a> {
    store: &'a LedgerStore,
    subjects: Option<SubjectDirectory>,
    _guard: MutexGuard<'a, ()>,
}

impl LedgerTransaction<'_> {
    pub fn load_subjects_table(&self) -> LedgerResult<Table> {
        self.store.document.load_table(SUBJECTS_SHEET)
    }

    pub fn load_images_table(&self) -> LedgerResult<Table> {
        self.store.document.load_table(IMAGES_SHEET)
    }

    /// Subjects read by the last image update, kept even when its save failed
    pub fn take_subjects(&mut self) -> Option<SubjectDirectory> {
        self.subjects.take()
    }

    /// Insert or update the Images row for (subject, timeline, age), then regenerate
    /// prompts and save Subjects, Images and Prompts in one write
    pub fn apply_image_update(
        &mut self,
        subject_id: &str,
        age: u32,
        base_path_rel: &str,
        filename: &str,
    ) -> LedgerResult<ImageUpdate> {
        let settings = &self.store.settings;
        let subjects = self.load_subjects_table()?;
        self.subjects = Some(SubjectDirectory::from_table(&subjects));
        let mut images = self.load_images_table()?;

        let added_columns = schema::reconcile_columns(&mut images, &schema::image_columns());
        if !added_columns.is_empty() {
            debug!(columns = ?added_columns, "Added missing Images columns");
        }

        let folder_path = timeline_folder_path(base_path_rel, &settings.timeline_folder_name);
        let image_id = image_id(subject_id, age);
        let run_id = self.store.run_ids.mint(subject_id, age);

        let (row, inserted) = match find_image_row(&images, subject_id, &settings.timeline_code, age)
        {
            Some(row) => (row, false),
            None => {
                let template = choose_template_row(&images, subject_id, &settings.timeline_code)
                    .map(|row| images.rows[row].clone())
                    .unwrap_or_default();
                (images.push_row(template), true)
            }
        };

        images.set(row, "SubjectID", subject_id);
        images.set(row, "Timeline", settings.timeline_code.as_str());
        images.set(row, "TargetAge", age);
        images.set(row, "FolderPath", folder_path.as_str());
        images.set(row, "Filename", filename);
        images.set(row, "ImageID", image_id.as_str());

        if !is_anchor_age(age) {
            images.set(row, "GenerationStage", AGE_GEN_STAGE);
            images.set(row, "SourceModelTool", settings.source_model_tool.as_str());
            images.set(row, "BaseInput20_ID", image_id_for(subject_id, BASE_AGE));
            images.set(row, "BaseInput70_ID", image_id_for(subject_id, OLD_ANCHOR_AGE));
            images.set(row, "RunID", run_id.as_str());
        }

        images.sort_by_subject_timeline_age();
        let prompts = build_prompts(&subjects, &images, &settings.timeline_code);

        self.store.document.save_tables(&[
            (SUBJECTS_SHEET, &subjects),
            (IMAGES_SHEET, &images),
            (PROMPTS_SHEET, &prompts),
        ])?;

        debug!(
            subject_id = %subject_id,
            age,
            image_id = %image_id,
            inserted,
            "Ledger image row saved"
        );

        Ok(ImageUpdate {
            image_id,
            run_id,
            folder_path,
            inserted,
            added_columns,
        })
    }
}

fn image_id_for(subject_id: &str, age: i64) -> String {
    format!("{}_A{:02}_Gem", subject_id, age)
}

fn matches_subject_timeline(images: &Table, row: usize, subject_id: &str, timeline: &str) -> bool {
    images.text(row, "SubjectID") == subject_id && images.text(row, "Timeline") == timeline
}

/// Row index of the exact (subject, timeline, age) match
pub fn find_image_row(images: &Table, subject_id: &str, timeline: &str, age: u32) -> Option<usize> {
    (0..images.len()).find(|&row| {
        matches_subject_timeline(images, row, subject_id, timeline)
            && images.get(row, "TargetAge").as_number() == Some(f64::from(age))
    })
}

/// Template for a new row: the subject's age-20 row on this timeline, else its first row
pub fn choose_template_row(images: &Table, subject_id: &str, timeline: &str) -> Option<usize> {
    let candidates: Vec<usize> = (0..images.len())
        .filter(|&row| matches_subject_timeline(images, row, subject_id, timeline))
        .collect();

    candidates
        .iter()
        .copied()
        .find(|&row| images.get(row, "TargetAge").as_number() == Some(BASE_AGE as f64))
        .or_else(|| candidates.first().copied())
}
