//! Run report
//!
//! Everything a finished run hands to the reporting and storage layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RunPhase;
use crate::executor::WorkerError;
use crate::models::{ResultNode, ResultSummary};

/// Wall-clock time of one pass
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PassTiming {
    pub phase: RunPhase,
    pub label: String,
    /// Leaves the pass executed
    pub tests: usize,
    pub duration_ms: u64,
}

/// A worker that failed without producing a result tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub phase: RunPhase,
    pub worker: String,
    pub message: String,
}

impl WorkerFailure {
    pub fn new(phase: RunPhase, error: &WorkerError) -> Self {
        Self {
            phase,
            worker: error.worker().to_string(),
            message: error.to_string(),
        }
    }
}

/// Outcome of a complete run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// Full name of the root suite
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub degree_of_parallelism: usize,
    pub phases: Vec<RunPhase>,
    pub passes: Vec<PassTiming>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worker_failures: Vec<WorkerFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retried: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovered: Vec<String>,
    pub summary: ResultSummary,
    pub tree: ResultNode,
}

impl RunReport {
    /// Total wall-clock time across passes
    pub fn duration_ms(&self) -> u64 {
        self.passes.iter().map(|p| p.duration_ms).sum()
    }

    pub fn has_worker_failures(&self) -> bool {
        !self.worker_failures.is_empty()
    }

    /// No failed tests and no failed workers
    pub fn is_success(&self) -> bool {
        self.summary.is_all_passed() && !self.has_worker_failures()
    }

    /// Failed and errored leaves, in tree order
    pub fn failures(&self) -> Vec<&ResultNode> {
        self.tree
            .leaves()
            .into_iter()
            .filter(|leaf| leaf.state.is_failure())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::flat_suite;
    use crate::engine::EngineError;

    fn report() -> RunReport {
        let root = flat_suite(&[("a", false), ("b", false)]);
        let mut tree = ResultNode::for_definition(&root);
        tree.push_child(ResultNode::success(&root.children()[0], 3));
        tree.push_child(ResultNode::failure(&root.children()[1], 4, "exited with status 1"));
        tree.finish_group();

        RunReport {
            suite: "Root".to_string(),
            started_at: Utc::now(),
            degree_of_parallelism: 2,
            phases: vec![RunPhase::Init, RunPhase::Done],
            passes: vec![
                PassTiming {
                    phase: RunPhase::SyncPass,
                    label: "synchronous pass".to_string(),
                    tests: 0,
                    duration_ms: 2,
                },
                PassTiming {
                    phase: RunPhase::ParallelPass,
                    label: "parallel pass".to_string(),
                    tests: 2,
                    duration_ms: 9,
                },
            ],
            worker_failures: Vec::new(),
            retried: Vec::new(),
            recovered: Vec::new(),
            summary: ResultSummary::new(&tree),
            tree,
        }
    }

    #[test]
    fn test_report_accessors() {
        let mut report = report();
        assert_eq!(report.duration_ms(), 11);
        assert!(!report.is_success());
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].full_name, "Root.b");

        report.worker_failures.push(WorkerFailure::new(
            RunPhase::ParallelPass,
            &WorkerError::Engine {
                worker: "worker-1".to_string(),
                source: EngineError::Execution("boom".to_string()),
            },
        ));
        assert!(report.has_worker_failures());
        assert_eq!(report.worker_failures[0].worker, "worker-1");
        assert!(report.worker_failures[0].message.contains("boom"));
    }

    #[test]
    fn test_report_json_round_trip() {
        let report = report();
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("\"parallel_pass\""));

        let loaded: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.summary, report.summary);
        assert_eq!(loaded.tree.children.len(), 2);
        assert!(loaded.tree.definition().is_none());
    }
}
