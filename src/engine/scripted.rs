//! Scripted engine for tests
//!
//! Every unit follows a queue of predetermined outcomes; the last step
//! repeats once the queue runs dry. Executions are recorded per context.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    run_selected, select_units, EngineError, EventListener, LoadedSuite, TestEngine, TestPackage,
};
use crate::filter::UnitFilter;
use crate::models::{ResultNode, ResultState, TestNode, Unit};

#[derive(Clone, Debug)]
pub struct Step {
    pub state: ResultState,
    pub duration_ms: u64,
    pub delay_ms: u64,
    pub output: Option<String>,
}

impl Step {
    fn new(state: ResultState, duration_ms: u64) -> Self {
        Self {
            state,
            duration_ms,
            delay_ms: 0,
            output: None,
        }
    }

    pub fn pass(duration_ms: u64) -> Self {
        Self::new(ResultState::Success, duration_ms)
    }

    pub fn fail(duration_ms: u64) -> Self {
        Self::new(ResultState::Failure, duration_ms)
    }

    pub fn error(duration_ms: u64) -> Self {
        Self::new(ResultState::Error, duration_ms)
    }

    pub fn inconclusive(duration_ms: u64) -> Self {
        Self::new(ResultState::Inconclusive, duration_ms)
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// One recorded unit execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub context: usize,
    pub full_name: String,
}

#[derive(Debug)]
pub struct ScriptedEngine {
    root: Arc<TestNode>,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    executions: Mutex<Vec<Execution>>,
    contexts: AtomicUsize,
    failing_runs: HashSet<String>,
    panicking_runs: HashSet<String>,
    fail_loads: bool,
}

impl ScriptedEngine {
    pub fn new(root: Arc<TestNode>) -> Self {
        Self {
            root,
            scripts: Mutex::new(HashMap::new()),
            executions: Mutex::new(Vec::new()),
            contexts: AtomicUsize::new(0),
            failing_runs: HashSet::new(),
            panicking_runs: HashSet::new(),
            fail_loads: false,
        }
    }

    pub fn script(self, full_name: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .insert(full_name.to_string(), steps.into_iter().collect());
        self
    }

    /// Any run whose selection contains `full_name` fails before executing
    pub fn fail_runs_with(mut self, full_name: &str) -> Self {
        self.failing_runs.insert(full_name.to_string());
        self
    }

    /// Any run whose selection contains `full_name` panics
    pub fn panic_runs_with(mut self, full_name: &str) -> Self {
        self.panicking_runs.insert(full_name.to_string());
        self
    }

    pub fn fail_loads(mut self) -> Self {
        self.fail_loads = true;
        self
    }

    /// Handle for inspection plus the engine as the run core sees it
    pub fn shared(self) -> (Arc<ScriptedEngine>, Arc<dyn TestEngine>) {
        let engine = Arc::new(self);
        let dynamic: Arc<dyn TestEngine> = Arc::new(Arc::clone(&engine));
        (engine, dynamic)
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.executions.lock().clone()
    }

    /// How often a unit was executed across all contexts
    pub fn execution_count(&self, full_name: &str) -> usize {
        self.executions
            .lock()
            .iter()
            .filter(|e| e.full_name == full_name)
            .count()
    }

    pub fn contexts_loaded(&self) -> usize {
        self.contexts.load(Ordering::SeqCst)
    }

    fn next_step(&self, full_name: &str) -> Step {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(full_name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| Step::pass(1)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Step::pass(1)),
            None => Step::pass(1),
        }
    }
}

#[async_trait]
impl TestEngine for Arc<ScriptedEngine> {
    async fn load(&self, _package: &TestPackage) -> Result<Box<dyn LoadedSuite>, EngineError> {
        if self.fail_loads {
            return Err(EngineError::Execution("scripted load failure".to_string()));
        }
        let context = self.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSuite {
            engine: Arc::clone(self),
            context,
        }))
    }
}

struct ScriptedSuite {
    engine: Arc<ScriptedEngine>,
    context: usize,
}

#[async_trait]
impl LoadedSuite for ScriptedSuite {
    fn definition(&self) -> Arc<TestNode> {
        Arc::clone(&self.engine.root)
    }

    async fn execute(&self, unit: &Arc<TestNode>, listener: &mut dyn EventListener) -> ResultNode {
        let step = self.engine.next_step(&unit.full_name);
        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }

        self.engine.executions.lock().push(Execution {
            context: self.context,
            full_name: unit.full_name.clone(),
        });

        if let Some(output) = &step.output {
            listener.test_output(unit, output);
        }

        let message = step
            .state
            .is_failure()
            .then(|| format!("scripted {}", step.state));
        ResultNode::outcome(unit, step.state, step.duration_ms, message)
    }

    async fn run(
        &self,
        listener: &mut dyn EventListener,
        filter: &UnitFilter,
    ) -> Result<ResultNode, EngineError> {
        let selected = select_units(&self.engine.root, filter);
        for unit in &selected {
            if self.engine.panicking_runs.contains(&unit.full_name) {
                panic!("scripted panic while running {}", unit.full_name);
            }
            if self.engine.failing_runs.contains(&unit.full_name) {
                return Err(EngineError::Execution(format!(
                    "scripted failure while running {}",
                    unit.full_name
                )));
            }
        }
        Ok(run_selected(self, listener, filter).await)
    }
}

/// `Root` holding one case per `(name, synchronous)` pair
pub fn flat_suite(units: &[(&str, bool)]) -> Arc<TestNode> {
    let children = units
        .iter()
        .map(|(name, sync)| case(&format!("Root.{name}"), name, *sync))
        .collect();
    Arc::new(TestNode::suite("Root", "Root", children))
}

/// `Root` holding one suite per distinct first element of `(suite, case,
/// synchronous)`, in first-seen order
pub fn nested_suite(cases: &[(&str, &str, bool)]) -> Arc<TestNode> {
    let mut suites: Vec<(&str, Vec<Arc<TestNode>>)> = Vec::new();
    for (suite, name, sync) in cases {
        let node = case(&format!("Root.{suite}.{name}"), name, *sync);
        match suites.iter_mut().find(|(s, _)| s == suite) {
            Some((_, children)) => children.push(node),
            None => suites.push((*suite, vec![node])),
        }
    }
    let children = suites
        .into_iter()
        .map(|(suite, cases)| Arc::new(TestNode::suite(suite, format!("Root.{suite}"), cases)))
        .collect();
    Arc::new(TestNode::suite("Root", "Root", children))
}

fn case(full_name: &str, name: &str, synchronous: bool) -> Arc<TestNode> {
    Arc::new(TestNode::case(
        name,
        Unit::new(format!("[scripted]{full_name}"), full_name).synchronous(synchronous),
    ))
}

pub fn package() -> TestPackage {
    TestPackage::new("scripted.yaml")
}
