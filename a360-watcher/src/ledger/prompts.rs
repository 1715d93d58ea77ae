//! Prompt sheet generation
//!
//! The prompt sheet is a pure function of the Subjects and Images sheets and is
//! regenerated from scratch on every ledger write.

use super::schema::PROMPT_COLUMNS;
use super::table::{Cell, Table};
use std::collections::HashMap;

/// Anchor age of the base portrait
pub const BASE_AGE: i64 = 20;
/// Second anchor age
pub const OLD_ANCHOR_AGE: i64 = 70;

/// Columns searched, in order, for free-text facial features
const FEATURE_COLUMNS: [&str; 4] = ["Facial_Features", "Face_Features", "FaceNotes", "Notes"];

/// Prompt type tag for a target age
pub fn prompt_type(age: i64) -> &'static str {
    match age {
        BASE_AGE => "Base_20",
        OLD_ANCHOR_AGE => "Age_70_from_20",
        _ => "Age_from_20",
    }
}

/// (noun, possessive pronoun) for a sex label
pub fn sex_words(sex: &str) -> (&'static str, &'static str) {
    let lower = sex.trim().to_lowercase();
    if lower.starts_with('m') {
        ("man", "his")
    } else if lower.starts_with('f') {
        ("woman", "her")
    } else {
        ("person", "their")
    }
}

/// Resolved descriptive fields for one image row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptSubject {
    pub sex: String,
    pub ethnicity: String,
    pub fitzpatrick_tone: String,
    pub features: String,
}

/// Base portrait text for the age-20 anchor
pub fn base_prompt(subject: &PromptSubject, age: i64) -> String {
    let (word, pronoun) = sex_words(&subject.sex);
    format!(
        "Extreme close-up clinical portrait, hyper-detailed facial features, sharp skin texture, \
         realistic pores, natural skin shine, high definition lighting, high-resolution 4000 x 4000, \
         ultra-photorealistic, shallow depth of field, face in perfect focus, \
         of a {eth}{word}, {age} years old{fitz}{features}, \
         full head from the clavicle and shoulders up, no clothing cover for medical reference, \
         no dark shadows, soft white background, \
         DO NOT crop off the top of {pronoun} head.",
        eth = ethnicity_phrase(&subject.ethnicity),
        fitz = tone_phrase(&subject.fitzpatrick_tone),
        features = features_phrase(&subject.features),
    )
}

/// Aging text transforming the age-20 base portrait
pub fn aging_prompt(subject: &PromptSubject, age: i64) -> String {
    let (word, pronoun) = sex_words(&subject.sex);
    format!(
        "Using the age 20 base clinical portrait of this same {eth}{word}, \
         naturally age {pronoun} to approximately {age} years old while fully preserving identity, \
         facial structure, hairstyle, lighting, camera angle, composition, and the clinical studio aesthetic. \
         Maintain hyper-detailed skin texture, realistic pores, sharp focus, and a soft white background. \
         Add age-appropriate features such as fine and deep wrinkles and realistic changes for a {age}-year-old.",
        eth = ethnicity_phrase(&subject.ethnicity),
    )
}

fn ethnicity_phrase(ethnicity: &str) -> String {
    if ethnicity.is_empty() {
        String::new()
    } else {
        format!("{} ", ethnicity)
    }
}

fn tone_phrase(tone: &str) -> String {
    if tone.is_empty() {
        String::new()
    } else {
        format!(", Fitzpatrick Tone {}", tone)
    }
}

fn features_phrase(features: &str) -> String {
    if features.is_empty() {
        String::new()
    } else {
        format!(", {}", features)
    }
}

/// Build the prompt sheet for one timeline
///
/// One row per Images row of `timeline_code` with a non-blank SubjectID and a numeric
/// TargetAge. Every label (sex, ethnicity, tone, features) prefers the image row and
/// falls back to the subject row.
pub fn build_prompts(subjects: &Table, images: &Table, timeline_code: &str) -> Table {
    let mut prompts = Table::new(PROMPT_COLUMNS);
    if !images.has_column("SubjectID") {
        return prompts;
    }

    let mut subject_rows: HashMap<String, usize> = HashMap::new();
    if subjects.has_column("SubjectID") {
        for row in 0..subjects.len() {
            let id = subjects.text(row, "SubjectID");
            if !id.is_empty() {
                // Last duplicate wins
                subject_rows.insert(id, row);
            }
        }
    }

    for row in 0..images.len() {
        let subject_id = images.text(row, "SubjectID");
        if subject_id.is_empty() || images.text(row, "Timeline") != timeline_code {
            continue;
        }
        let Some(age) = images.get(row, "TargetAge").as_age() else {
            continue;
        };

        let subject_row = subject_rows.get(&subject_id).copied();
        let from_image_or_subject = |column: &str| -> String {
            let value = images.text(row, column);
            match (value.is_empty(), subject_row) {
                (true, Some(s)) => subjects.text(s, column),
                _ => value,
            }
        };

        let resolved = PromptSubject {
            sex: from_image_or_subject("Sex"),
            ethnicity: from_image_or_subject("Ethnicity_Group"),
            fitzpatrick_tone: from_image_or_subject("Fitzpatrick_Tone"),
            features: match (first_feature_text(images, row), subject_row) {
                (features, Some(s)) if features.is_empty() => first_feature_text(subjects, s),
                (features, _) => features,
            },
        };

        let output_image_id = images.get(row, "ImageID").clone();
        let (base_image_id, text) = if age == BASE_AGE {
            (output_image_id.clone(), base_prompt(&resolved, age))
        } else {
            (
                Cell::Text(format!("{}_A20_Gem", subject_id)),
                aging_prompt(&resolved, age),
            )
        };

        prompts.push_row(vec![
            Cell::Text(subject_id),
            Cell::from(timeline_code),
            Cell::Int(age),
            Cell::from(prompt_type(age)),
            base_image_id,
            output_image_id,
            Cell::Text(resolved.sex),
            Cell::Text(resolved.ethnicity),
            Cell::Text(resolved.fitzpatrick_tone),
            Cell::Text(text),
        ]);
    }

    prompts.sort_by_subject_timeline_age();
    prompts
}

fn first_feature_text(table: &Table, row: usize) -> String {
    FEATURE_COLUMNS
        .iter()
        .filter(|col| table.has_column(col))
        .map(|col| table.text(row, col))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}
