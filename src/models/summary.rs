//! Result summarization
//!
//! Counts leaf outcomes of a merged result tree.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::result_node::{ResultNode, ResultState};

/// Counts of leaf outcomes in a result tree
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub tests_run: usize,
    pub passed: usize,
    pub failures: usize,
    pub errors: usize,
    pub inconclusive: usize,
    pub duration_ms: u64,
}

impl ResultSummary {
    pub fn new(tree: &ResultNode) -> Self {
        let mut summary = Self {
            duration_ms: tree.duration_ms,
            ..Self::default()
        };

        for leaf in tree.leaves() {
            summary.tests_run += 1;
            match leaf.state {
                ResultState::Success => summary.passed += 1,
                ResultState::Failure => summary.failures += 1,
                ResultState::Error => summary.errors += 1,
                ResultState::Inconclusive => summary.inconclusive += 1,
            }
        }

        summary
    }

    pub fn errors_and_failures(&self) -> usize {
        self.errors + self.failures
    }

    pub fn pass_rate(&self) -> f64 {
        if self.tests_run == 0 {
            0.0
        } else {
            (self.passed as f64 / self.tests_run as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.errors_and_failures() == 0
    }
}

impl fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tests run: {}, Errors: {}, Failures: {}, Inconclusive: {}, Time: {:.3} seconds",
            self.tests_run,
            self.errors,
            self.failures,
            self.inconclusive,
            self.duration_ms as f64 / 1000.0
        )
    }
}
