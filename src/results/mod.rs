//! Results storage module
//!
//! Provides persistent storage and export of run reports.

mod storage;

pub use storage::{ExportFormat, ResultsStorage, StoredRun, StoredRunConfig};
