//! File-level services used by the ingestion pipeline

pub mod file_hasher;
pub mod filename_parser;
pub mod folder_watcher;
pub mod stability_checker;

pub use filename_parser::{canonical_filename, parse_path, parse_stem, ParsedName};
pub use folder_watcher::FolderWatcher;
pub use stability_checker::{Stability, StabilityChecker};
