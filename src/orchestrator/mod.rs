//! Run orchestration
//!
//! Sequences a run: synchronous pass, parallel pass, merge, and an optional
//! retry of failed units whose recoveries are spliced back into the tree.

mod report;

pub use report::{PassTiming, RunReport, WorkerFailure};

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{errored_result_tree, EngineError, TestEngine, TestPackage};
use crate::executor::{ParallelExecutor, PartitionRunner, RunPlan, WorkerError};
use crate::filter::{PartitionAssignor, UnitFilter};
use crate::merge::{MergeError, ResultTreeMerger};
use crate::models::{ResultNode, ResultSummary, TestNode};
use crate::utils::Timer;

/// Degree of parallelism used when none is configured
pub const DEFAULT_DEGREE_OF_PARALLELISM: usize = 4;

/// Fatal run errors. Unit failures and worker failures are never fatal.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to load test package: {0}")]
    Load(#[from] EngineError),

    #[error("Result merge failed: {0}")]
    Merge(#[from] MergeError),
}

/// States a run moves through
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    SyncPass,
    ParallelPass,
    Merge,
    RetryPass,
    RetryMerge,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::SyncPass => "synchronous pass",
            RunPhase::ParallelPass => "parallel pass",
            RunPhase::Merge => "merge",
            RunPhase::RetryPass => "retry pass",
            RunPhase::RetryMerge => "retry merge",
            RunPhase::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Run options
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Number of parallel workers; zero selects the default
    pub degree_of_parallelism: usize,
    pub retest_failures: bool,
    pub capture_output: bool,
    /// Re-sum ancestor durations and states after retry replacements
    pub recompute_durations_after_retry: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            degree_of_parallelism: DEFAULT_DEGREE_OF_PARALLELISM,
            retest_failures: false,
            capture_output: true,
            recompute_durations_after_retry: false,
        }
    }
}

impl RunConfig {
    pub fn effective_degree(&self) -> usize {
        normalize_degree(self.degree_of_parallelism)
    }
}

/// Zero means "not configured"
pub fn normalize_degree(degree: usize) -> usize {
    if degree == 0 {
        DEFAULT_DEGREE_OF_PARALLELISM
    } else {
        degree
    }
}

/// Drives one complete run of a package
pub struct Orchestrator {
    engine: Arc<dyn TestEngine>,
    package: TestPackage,
    config: RunConfig,
}

/// Mutable state of a run in progress
struct RunState {
    phases: Vec<RunPhase>,
    passes: Vec<PassTiming>,
    worker_failures: Vec<WorkerFailure>,
}

impl RunState {
    fn enter(&mut self, phase: RunPhase) {
        info!("Phase: {}", phase);
        self.phases.push(phase);
    }

    fn record_pass(&mut self, timer: Timer, phase: RunPhase, tests: usize) {
        let label = timer.label().to_string();
        let duration_ms = timer.stop().as_millis() as u64;
        self.passes.push(PassTiming {
            phase,
            label,
            tests,
            duration_ms,
        });
    }

    fn record_failure(&mut self, phase: RunPhase, error: &WorkerError) {
        warn!("{}", error);
        self.worker_failures.push(WorkerFailure::new(phase, error));
    }
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn TestEngine>, package: TestPackage, config: RunConfig) -> Self {
        Self {
            engine,
            package,
            config,
        }
    }

    /// Run every unit selected by `caller_filter`
    pub async fn run(&self, caller_filter: UnitFilter) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let mut state = RunState {
            phases: Vec::new(),
            passes: Vec::new(),
            worker_failures: Vec::new(),
        };

        state.enter(RunPhase::Init);
        let degree = self.config.effective_degree();
        info!("Degree of parallelism: {}", degree);

        // Probe load; the definition outlives every worker context
        let probe = self.engine.load(&self.package).await?;
        let definition = probe.definition();
        probe.unload();
        info!(
            "Loaded {} ({} tests)",
            definition.full_name,
            definition.unit_count()
        );

        let runner = PartitionRunner::new(Arc::clone(&self.engine), self.package.clone());

        state.enter(RunPhase::SyncPass);
        let sync_tree = self
            .sync_pass(&runner, &caller_filter, &definition, &mut state)
            .await;

        state.enter(RunPhase::ParallelPass);
        let mut trees = vec![sync_tree];
        let parallel_trees = self
            .parallel_pass(runner.clone(), &caller_filter, &definition, degree, &mut state)
            .await;
        trees.extend(parallel_trees);

        state.enter(RunPhase::Merge);
        let mut tree = ResultTreeMerger::merge(&definition, trees);

        let mut retried = Vec::new();
        let mut recovered = Vec::new();
        if self.config.retest_failures {
            retried = tree.failed_leaf_names();
            if retried.is_empty() {
                info!("No failed tests to retry");
            } else {
                state.enter(RunPhase::RetryPass);
                if let Some(retry_tree) = self
                    .retry_pass(&runner, &caller_filter, &retried, &mut state)
                    .await
                {
                    state.enter(RunPhase::RetryMerge);
                    recovered = ResultTreeMerger::splice_retry(
                        &mut tree,
                        &retried,
                        retry_tree,
                        self.config.recompute_durations_after_retry,
                    )?;
                    info!("{} of {} retried tests recovered", recovered.len(), retried.len());
                }
            }
        }

        state.enter(RunPhase::Done);
        tree.duration_ms = state.passes.iter().map(|p| p.duration_ms).sum();
        let summary = ResultSummary::new(&tree);
        info!("{}", summary);

        Ok(RunReport {
            suite: definition.full_name.clone(),
            started_at,
            degree_of_parallelism: degree,
            phases: state.phases,
            passes: state.passes,
            worker_failures: state.worker_failures,
            retried,
            recovered,
            summary,
            tree,
        })
    }

    async fn sync_pass(
        &self,
        runner: &PartitionRunner,
        caller_filter: &UnitFilter,
        definition: &Arc<TestNode>,
        state: &mut RunState,
    ) -> ResultNode {
        let timer = Timer::start("synchronous pass");
        let filter = caller_filter.clone().and(UnitFilter::BySynchronousFlag);
        let plan = RunPlan::new("sync", filter.clone()).with_capture(self.config.capture_output);

        let tree = match runner.run_isolated(plan).await {
            Ok(tree) => tree,
            Err(e) => {
                state.record_failure(RunPhase::SyncPass, &e);
                errored_result_tree(definition, &filter, &e.to_string())
            }
        };
        state.record_pass(timer, RunPhase::SyncPass, tree.leaves().len());
        tree
    }

    async fn parallel_pass(
        &self,
        runner: PartitionRunner,
        caller_filter: &UnitFilter,
        definition: &Arc<TestNode>,
        degree: usize,
        state: &mut RunState,
    ) -> Vec<ResultNode> {
        let timer = Timer::start("parallel pass");
        let assignor = Arc::new(PartitionAssignor::new(degree));
        let executor =
            ParallelExecutor::new(runner, assignor).with_capture(self.config.capture_output);

        let mut trees = Vec::with_capacity(degree);
        let results = executor.run(caller_filter).await;
        for (partition, result) in results.into_iter().enumerate() {
            match result {
                Ok(tree) => trees.push(tree),
                Err(e) => {
                    state.record_failure(RunPhase::ParallelPass, &e);
                    // The partition's units still count, as errors
                    let filter = executor.worker_filter(caller_filter, partition);
                    trees.push(errored_result_tree(definition, &filter, &e.to_string()));
                }
            }
        }

        let tests = trees.iter().map(|t| t.leaves().len()).sum();
        state.record_pass(timer, RunPhase::ParallelPass, tests);
        trees
    }

    async fn retry_pass(
        &self,
        runner: &PartitionRunner,
        caller_filter: &UnitFilter,
        failed: &[String],
        state: &mut RunState,
    ) -> Option<ResultNode> {
        info!("Retrying {} failed test(s)", failed.len());
        let timer = Timer::start("retry pass");
        let filter = caller_filter
            .clone()
            .and(UnitFilter::names(failed.iter().cloned()));
        let plan = RunPlan::new("retry", filter).with_capture(self.config.capture_output);

        match runner.run_isolated(plan).await {
            Ok(tree) => {
                state.record_pass(timer, RunPhase::RetryPass, tree.leaves().len());
                Some(tree)
            }
            Err(e) => {
                state.record_failure(RunPhase::RetryPass, &e);
                state.record_pass(timer, RunPhase::RetryPass, 0);
                None
            }
        }
    }
}
