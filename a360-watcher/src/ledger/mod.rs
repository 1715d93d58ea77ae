//! Ledger workbook: Subjects, Images and the derived prompt sheet

pub mod document;
pub mod prompts;
pub mod schema;
pub mod store;
pub mod subjects;
pub mod table;
pub mod xlsx;

pub use document::{LedgerDocument, MemoryLedger};
pub use schema::{IMAGES_SHEET, PROMPTS_SHEET, SUBJECTS_SHEET};
pub use store::{ImageUpdate, LedgerSettings, LedgerStore, LedgerTransaction};
pub use subjects::{SubjectDirectory, SubjectLabels};
pub use table::{Cell, Table};
pub use xlsx::XlsxLedger;
