//! Per-file ingestion pipeline and archive reconciliation

pub mod dataset_index;
pub mod ingestor;
pub mod reconcile;
pub mod state;

pub use dataset_index::DatasetIndexEntry;
pub use ingestor::{IngestSettings, Ingestor};
pub use reconcile::{reconcile_archive, ReconcileReport};
pub use state::{Detected, Failure, Ingested, Outcome, Stored, Validated};
