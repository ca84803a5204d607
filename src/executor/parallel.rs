//! Parallel pass execution
//!
//! Fans one pass out over `degree_of_parallelism` workers, each restricted
//! to its own partition, and joins them back in worker order.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::runner::{panicked, PartitionRunner, RunPlan};
use super::WorkerError;
use crate::filter::{PartitionAssignor, UnitFilter};
use crate::models::ResultNode;

/// Parallel pass executor
pub struct ParallelExecutor {
    runner: PartitionRunner,
    assignor: Arc<PartitionAssignor>,
    capture_output: bool,
}

impl ParallelExecutor {
    pub fn new(runner: PartitionRunner, assignor: Arc<PartitionAssignor>) -> Self {
        Self {
            runner,
            assignor,
            capture_output: true,
        }
    }

    pub fn with_capture(mut self, capture_output: bool) -> Self {
        self.capture_output = capture_output;
        self
    }

    pub fn degree_of_parallelism(&self) -> usize {
        self.assignor.degree_of_parallelism()
    }

    /// Filter a worker runs with: `base_filter` restricted to its partition
    pub fn worker_filter(&self, base_filter: &UnitFilter, partition: usize) -> UnitFilter {
        base_filter
            .clone()
            .and(UnitFilter::partition(partition, Arc::clone(&self.assignor)))
    }

    /// Run every partition concurrently under `base_filter`.
    ///
    /// Returns one entry per worker, in worker order. A failed worker only
    /// fills its own slot.
    pub async fn run(&self, base_filter: &UnitFilter) -> Vec<Result<ResultNode, WorkerError>> {
        let degree = self.degree_of_parallelism();
        info!("Running parallel pass on {} workers", degree);

        let start = Instant::now();
        let mut labels = Vec::with_capacity(degree);
        let mut handles = Vec::with_capacity(degree);

        for partition in 0..degree {
            let label = format!("worker-{partition}");
            let filter = self.worker_filter(base_filter, partition);
            let plan = RunPlan::new(label.clone(), filter).with_capture(self.capture_output);
            let runner = self.runner.clone();

            handles.push(tokio::spawn(async move { runner.run(plan).await }));
            labels.push(label);
        }

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .zip(labels)
            .map(|(joined, label)| joined.unwrap_or_else(|e| Err(panicked(label, e))))
            .collect();

        for failure in results.iter().filter_map(|r| r.as_ref().err()) {
            warn!("Worker failed: {}", failure);
        }

        info!(
            "Parallel pass completed in {}ms ({} of {} workers succeeded)",
            start.elapsed().as_millis(),
            results.iter().filter(|r| r.is_ok()).count(),
            degree
        );

        results
    }
}
