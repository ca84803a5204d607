//! Command-backed engine
//!
//! Runs every case of a manifest as a shell command. Manifests are parsed
//! once per path and default timeout, and shared by all worker contexts
//! loaded from them.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, warn};

use super::manifest::{CommandSpec, LoadedManifest, SuiteManifest};
use super::{
    run_selected, select_units, EngineError, EventListener, LoadedSuite, TestEngine, TestPackage,
};
use crate::filter::UnitFilter;
use crate::models::{ResultNode, ResultState, TestNode};

/// Environment variable carrying the full name of the running case
pub const UNIT_ENV_VAR: &str = "PARTEST_UNIT";

/// Engine executing manifest cases through a shell
#[derive(Debug, Default)]
pub struct CommandEngine {
    /// Built manifests by path and default timeout
    cache: Mutex<HashMap<(PathBuf, u64), Arc<LoadedManifest>>>,
}

impl CommandEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn manifest(&self, package: &TestPackage) -> Result<Arc<LoadedManifest>, EngineError> {
        let key = (package.path.clone(), package.default_timeout_secs);
        if let Some(loaded) = self.cache.lock().get(&key) {
            return Ok(Arc::clone(loaded));
        }

        let manifest = SuiteManifest::load(&package.path)?;
        let loaded = Arc::new(manifest.build(
            manifest_dir(&package.path),
            package.default_timeout_secs,
        )?);
        debug!(
            "Loaded manifest {} ({} cases)",
            package.path.display(),
            loaded.commands.len()
        );

        Ok(Arc::clone(
            self.cache
                .lock()
                .entry(key)
                .or_insert(loaded),
        ))
    }
}

fn manifest_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

#[async_trait]
impl TestEngine for CommandEngine {
    async fn load(&self, package: &TestPackage) -> Result<Box<dyn LoadedSuite>, EngineError> {
        let manifest = self.manifest(package)?;

        let root = match &package.fixture {
            Some(fixture) => find_fixture(&manifest.root, fixture)
                .ok_or_else(|| EngineError::FixtureNotFound(fixture.clone()))?,
            None => Arc::clone(&manifest.root),
        };

        Ok(Box::new(CommandSuite { root, manifest }))
    }
}

/// Fixtures may be named by full name or relative to the root suite
fn find_fixture(root: &Arc<TestNode>, fixture: &str) -> Option<Arc<TestNode>> {
    root.find(fixture)
        .or_else(|| root.find(&format!("{}.{}", root.full_name, fixture)))
}

/// One worker's view of a loaded manifest
struct CommandSuite {
    root: Arc<TestNode>,
    manifest: Arc<LoadedManifest>,
}

#[async_trait]
impl LoadedSuite for CommandSuite {
    fn definition(&self) -> Arc<TestNode> {
        Arc::clone(&self.root)
    }

    async fn run(
        &self,
        listener: &mut dyn EventListener,
        filter: &UnitFilter,
    ) -> Result<ResultNode, EngineError> {
        let missing = select_units(&self.root, filter)
            .iter()
            .filter_map(|unit| self.manifest.commands.get(&unit.full_name))
            .map(|spec| &spec.working_dir)
            .find(|dir| !dir.is_dir())
            .cloned();
        if let Some(dir) = missing {
            return Err(EngineError::Execution(format!(
                "working directory {} does not exist",
                dir.display()
            )));
        }
        Ok(run_selected(self, listener, filter).await)
    }

    async fn execute(&self, unit: &Arc<TestNode>, listener: &mut dyn EventListener) -> ResultNode {
        let Some(spec) = self.manifest.commands.get(&unit.full_name) else {
            return ResultNode::error(unit, 0, "No command registered for this test");
        };

        let start = Instant::now();
        let outcome = run_command(spec, &unit.full_name).await;
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(finished) => {
                if !finished.output.is_empty() {
                    listener.test_output(unit, &finished.output);
                }
                let (state, message) = classify(spec, &finished);
                ResultNode::outcome(unit, state, elapsed, message)
            }
            Err(e) => {
                warn!("Failed to run {}: {}", unit.full_name, e);
                ResultNode::error(unit, elapsed, e.to_string())
            }
        }
    }
}

/// How a command ended
#[derive(Debug)]
struct Finished {
    /// Exit code, `None` when killed by a signal or timed out
    code: Option<i32>,
    timed_out: bool,
    output: String,
}

async fn run_command(spec: &CommandSpec, full_name: &str) -> Result<Finished, std::io::Error> {
    debug!("{}: {} -c {:?}", full_name, spec.shell, spec.command);

    let child = Command::new(&spec.shell)
        .arg("-c")
        .arg(&spec.command)
        .current_dir(&spec.working_dir)
        .envs(&spec.env)
        .env(UNIT_ENV_VAR, full_name)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            Ok(Finished {
                code: output.status.code(),
                timed_out: false,
                output: text,
            })
        }
        // Dropping the future kills the child
        Err(_) => Ok(Finished {
            code: None,
            timed_out: true,
            output: String::new(),
        }),
    }
}

fn classify(spec: &CommandSpec, finished: &Finished) -> (ResultState, Option<String>) {
    if finished.timed_out {
        return (
            ResultState::Failure,
            Some(format!("timed out after {}s", spec.timeout.as_secs())),
        );
    }
    match finished.code {
        Some(0) => (ResultState::Success, None),
        Some(code) if Some(code) == spec.inconclusive_exit_code => (
            ResultState::Inconclusive,
            Some(format!("exited with status {code}")),
        ),
        Some(code) => (
            ResultState::Failure,
            Some(format!("exited with status {code}")),
        ),
        None => (
            ResultState::Error,
            Some("terminated by signal".to_string()),
        ),
    }
}
