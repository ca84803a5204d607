//! Pass execution
//!
//! Runs a pass on a single worker context or fans one out across a fixed
//! number of partitions.

mod parallel;
mod runner;

pub use parallel::ParallelExecutor;
pub use runner::{PartitionRunner, RunPlan};

use thiserror::Error;

use crate::engine::EngineError;

/// Failure of one worker, isolated to its own slot
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("{worker}: failed to load package: {source}")]
    Load {
        worker: String,
        #[source]
        source: EngineError,
    },

    #[error("{worker}: run failed: {source}")]
    Engine {
        worker: String,
        #[source]
        source: EngineError,
    },

    #[error("{worker}: worker task panicked: {message}")]
    Panicked { worker: String, message: String },
}

impl WorkerError {
    /// Label of the worker that failed
    pub fn worker(&self) -> &str {
        match self {
            WorkerError::Load { worker, .. }
            | WorkerError::Engine { worker, .. }
            | WorkerError::Panicked { worker, .. } => worker,
        }
    }
}
