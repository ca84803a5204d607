//! Test execution engines
//!
//! The boundary between the run core and whatever actually discovers and
//! executes units. An engine loads a package into an independent worker
//! context; the context runs the units selected by a filter and returns a
//! result tree shaped like the definition tree.

mod command;
mod listener;
mod manifest;
#[cfg(test)]
pub(crate) mod scripted;

pub use command::CommandEngine;
pub use listener::{CapturingListener, EventListener, ProgressListener};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::filter::UnitFilter;
use crate::models::{ResultNode, TestNode};

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to read manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {path}: {message}")]
    ManifestParse { path: PathBuf, message: String },

    #[error("Unsupported manifest version: {0}")]
    UnsupportedVersion(String),

    #[error("Duplicate test name: {0}")]
    DuplicateName(String),

    #[error("Test {0} has an empty command")]
    EmptyCommand(String),

    #[error("Unable to locate fixture {0}")]
    FixtureNotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

/// What to load: a manifest, optionally narrowed to one fixture
#[derive(Clone, Debug)]
pub struct TestPackage {
    pub path: PathBuf,
    pub fixture: Option<String>,
    /// Timeout for units that do not declare their own
    pub default_timeout_secs: u64,
}

impl TestPackage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fixture: None,
            default_timeout_secs: 300,
        }
    }

    pub fn with_fixture(mut self, fixture: Option<String>) -> Self {
        self.fixture = fixture;
        self
    }

    pub fn with_default_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }
}

/// Loads packages into worker contexts
#[async_trait]
pub trait TestEngine: Send + Sync {
    /// Load the units of `package` into a fresh, independent context
    async fn load(&self, package: &TestPackage) -> Result<Box<dyn LoadedSuite>, EngineError>;
}

/// One worker's loaded copy of a package
#[async_trait]
pub trait LoadedSuite: Send + Sync {
    /// Root of the loaded definition tree
    fn definition(&self) -> Arc<TestNode>;

    /// Execute one selected unit and report its output to `listener`
    async fn execute(&self, unit: &Arc<TestNode>, listener: &mut dyn EventListener) -> ResultNode;

    /// Run every unit `filter` selects, one at a time, in discovery order
    async fn run(
        &self,
        listener: &mut dyn EventListener,
        filter: &UnitFilter,
    ) -> Result<ResultNode, EngineError> {
        Ok(run_selected(self, listener, filter).await)
    }

    /// Release the context
    fn unload(self: Box<Self>) {}
}

/// Execute the units `filter` selects one at a time and assemble the tree
pub async fn run_selected<S: LoadedSuite + ?Sized>(
    suite: &S,
    listener: &mut dyn EventListener,
    filter: &UnitFilter,
) -> ResultNode {
    let definition = suite.definition();
    let selected = select_units(&definition, filter);
    listener.run_started(&definition.full_name, selected.len());

    let mut outcomes = HashMap::with_capacity(selected.len());
    for unit in selected {
        listener.test_started(&unit);
        let mut result = suite.execute(&unit, listener).await;
        listener.test_finished(&mut result);
        outcomes.insert(unit.full_name.clone(), result);
    }

    let tree = build_result_tree(&definition, &mut outcomes);
    listener.run_finished(&tree);
    tree
}

/// Units selected by `filter`, in discovery order. Suites the filter
/// rejects are pruned with everything below them.
pub fn select_units(root: &Arc<TestNode>, filter: &UnitFilter) -> Vec<Arc<TestNode>> {
    let mut selected = Vec::new();
    collect_selected(root, filter, &mut selected);
    selected
}

fn collect_selected(node: &Arc<TestNode>, filter: &UnitFilter, out: &mut Vec<Arc<TestNode>>) {
    if !filter.matches(node) {
        return;
    }
    if node.is_suite() {
        for child in node.children() {
            collect_selected(child, filter, out);
        }
    } else {
        out.push(Arc::clone(node));
    }
}

/// Arrange unit outcomes under the definition hierarchy. Suites without an
/// executed descendant are left out.
pub fn build_result_tree(
    definition: &Arc<TestNode>,
    outcomes: &mut HashMap<String, ResultNode>,
) -> ResultNode {
    if !definition.is_suite() {
        return outcomes
            .remove(&definition.full_name)
            .unwrap_or_else(|| ResultNode::for_definition(definition));
    }

    let mut node = ResultNode::for_definition(definition);
    for child in definition.children() {
        let result = build_result_tree(child, outcomes);
        if result.executed {
            node.push_child(result);
        }
    }
    node.finish_group();
    node
}

/// Result tree for a worker that never produced one: every unit `filter`
/// selects is reported as an error carrying `message`.
pub fn errored_result_tree(
    definition: &Arc<TestNode>,
    filter: &UnitFilter,
    message: &str,
) -> ResultNode {
    let mut outcomes: HashMap<String, ResultNode> = select_units(definition, filter)
        .iter()
        .map(|unit| (unit.full_name.clone(), ResultNode::error(unit, 0, message)))
        .collect();
    build_result_tree(definition, &mut outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::PartitionAssignor;
    use crate::models::{ResultState, Unit};

    fn tree() -> Arc<TestNode> {
        let case = |suite: &str, name: &str, sync: bool| {
            let full = format!("Root.{suite}.{name}");
            Arc::new(TestNode::case(
                name,
                Unit::new(format!("[t]{full}"), full)
                    .synchronous(sync)
                    .with_category(suite.to_lowercase()),
            ))
        };
        let alpha = Arc::new(TestNode::suite(
            "Alpha",
            "Root.Alpha",
            vec![case("Alpha", "a1", false), case("Alpha", "a2", true)],
        ));
        let beta = Arc::new(TestNode::suite(
            "Beta",
            "Root.Beta",
            vec![case("Beta", "b1", false)],
        ));
        Arc::new(TestNode::suite("Root", "Root", vec![alpha, beta]))
    }

    #[test]
    fn test_select_units_in_order() {
        let root = tree();
        let names: Vec<_> = select_units(&root, &UnitFilter::AlwaysTrue)
            .iter()
            .map(|n| n.full_name.clone())
            .collect();
        assert_eq!(names, vec!["Root.Alpha.a1", "Root.Alpha.a2", "Root.Beta.b1"]);
    }

    #[test]
    fn test_select_units_with_partition() {
        let root = tree();
        let assignor = Arc::new(PartitionAssignor::new(2));
        let p0 = select_units(&root, &UnitFilter::partition(0, Arc::clone(&assignor)));
        let p1 = select_units(&root, &UnitFilter::partition(1, Arc::clone(&assignor)));
        assert_eq!(p0.len(), 1);
        assert_eq!(p0[0].full_name, "Root.Alpha.a1");
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0].full_name, "Root.Beta.b1");
    }

    #[test]
    fn test_nested_not_prunes_suites() {
        let root = tree();
        let filter = UnitFilter::not(UnitFilter::categories(["alpha"]));
        assert!(select_units(&root, &filter).is_empty());

        let filter = UnitFilter::exclude(UnitFilter::categories(["alpha"]));
        let names: Vec<_> = select_units(&root, &filter)
            .iter()
            .map(|n| n.full_name.clone())
            .collect();
        assert_eq!(names, vec!["Root.Beta.b1"]);
    }

    #[test]
    fn test_errored_result_tree_covers_selection() {
        let root = tree();
        let tree = errored_result_tree(
            &root,
            &UnitFilter::categories(["alpha"]),
            "worker-0: run failed",
        );

        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 2);
        assert!(leaves.iter().all(|l| l.state == ResultState::Error));
        assert_eq!(leaves[0].message.as_deref(), Some("worker-0: run failed"));
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.state, ResultState::Failure);
    }

    #[test]
    fn test_build_result_tree_drops_unexecuted_suites() {
        let root = tree();
        let a1 = root.find("Root.Alpha.a1").unwrap();
        let mut outcomes = HashMap::new();
        outcomes.insert(a1.full_name.clone(), ResultNode::success(&a1, 40));

        let result = build_result_tree(&root, &mut outcomes);
        assert!(result.executed);
        assert_eq!(result.children.len(), 1);
        assert_eq!(result.children[0].full_name, "Root.Alpha");
        assert_eq!(result.children[0].children.len(), 1);
        assert_eq!(result.duration_ms, 40);
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_build_result_tree_empty() {
        let root = tree();
        let result = build_result_tree(&root, &mut HashMap::new());
        assert!(!result.executed);
        assert!(result.children.is_empty());
    }
}
