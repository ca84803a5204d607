//! Single-worker pass runner
//!
//! Loads a fresh context for a pass, runs it under the plan's filter and
//! unloads it again.

use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info};

use super::WorkerError;
use crate::engine::{CapturingListener, ProgressListener, TestEngine, TestPackage};
use crate::filter::UnitFilter;
use crate::models::ResultNode;

/// One execution pass on one worker
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub label: String,
    pub filter: UnitFilter,
    pub capture_output: bool,
}

impl RunPlan {
    pub fn new(label: impl Into<String>, filter: UnitFilter) -> Self {
        Self {
            label: label.into(),
            filter,
            capture_output: true,
        }
    }

    pub fn with_capture(mut self, capture_output: bool) -> Self {
        self.capture_output = capture_output;
        self
    }
}

/// Runs plans against a package on independent worker contexts
#[derive(Clone)]
pub struct PartitionRunner {
    engine: Arc<dyn TestEngine>,
    package: TestPackage,
}

impl PartitionRunner {
    pub fn new(engine: Arc<dyn TestEngine>, package: TestPackage) -> Self {
        Self { engine, package }
    }

    /// Run a plan on a freshly loaded context
    pub async fn run(&self, plan: RunPlan) -> Result<ResultNode, WorkerError> {
        debug!("[{}] loading {}", plan.label, self.package.path.display());

        let suite = self
            .engine
            .load(&self.package)
            .await
            .map_err(|source| WorkerError::Load {
                worker: plan.label.clone(),
                source,
            })?;

        let mut listener =
            CapturingListener::new(ProgressListener::new(&plan.label), plan.capture_output);
        let result = suite.run(&mut listener, &plan.filter).await;
        suite.unload();

        let tree = result.map_err(|source| WorkerError::Engine {
            worker: plan.label.clone(),
            source,
        })?;

        info!(
            "[{}] completed {} test(s) in {}ms",
            plan.label,
            tree.leaves().len(),
            tree.duration_ms
        );
        Ok(tree)
    }

    /// Run a plan on its own task so a panic stays inside this worker
    pub async fn run_isolated(&self, plan: RunPlan) -> Result<ResultNode, WorkerError> {
        let label = plan.label.clone();
        let runner = self.clone();
        tokio::spawn(async move { runner.run(plan).await })
            .await
            .unwrap_or_else(|e| Err(panicked(label, e)))
    }
}

pub(super) fn panicked(worker: String, error: JoinError) -> WorkerError {
    let message = match error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(e) => e.to_string(),
    };
    WorkerError::Panicked { worker, message }
}
