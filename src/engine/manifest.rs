//! Suite manifests
//!
//! A manifest describes a tree of suites and command-backed cases. It is
//! read from YAML (`.yaml`/`.yml`) or JSON and turned into a definition tree
//! plus the command specification of every case.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::EngineError;
use crate::models::{TestNode, Unit};

const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

fn default_version() -> String {
    "1.0".to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

/// Top-level manifest
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteManifest {
    #[serde(default = "default_version")]
    pub version: String,

    /// Name of the root suite
    pub name: String,

    /// Base directory for cases, relative to the manifest
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Timeout for cases that do not declare one
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Shell used to run case commands
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Environment for every case
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub synchronous: bool,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub suites: Vec<SuiteSpec>,

    #[serde(default)]
    pub cases: Vec<CaseSpec>,
}

/// A nested suite
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteSpec {
    pub name: String,

    /// Every case below runs synchronously
    #[serde(default)]
    pub synchronous: bool,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub suites: Vec<SuiteSpec>,

    #[serde(default)]
    pub cases: Vec<CaseSpec>,
}

/// A command-backed case
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseSpec {
    pub name: String,

    pub command: String,

    #[serde(default)]
    pub synchronous: bool,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Directory to run in, relative to the manifest working directory
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Exit code reported as inconclusive rather than failed
    #[serde(default)]
    pub inconclusive_exit_code: Option<i32>,
}

/// Everything needed to run one case
#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub shell: String,
    pub command: String,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
    pub inconclusive_exit_code: Option<i32>,
}

/// A parsed manifest: definition tree plus commands keyed by full name
#[derive(Debug)]
pub struct LoadedManifest {
    pub root: Arc<TestNode>,
    pub commands: HashMap<String, CommandSpec>,
}

/// Inherited attributes while walking the manifest
struct Scope<'a> {
    prefix: String,
    synchronous: bool,
    categories: BTreeSet<String>,
    manifest: &'a SuiteManifest,
    base_dir: &'a Path,
    default_timeout: Duration,
}

impl Scope<'_> {
    fn enter<'b>(&'b self, name: &str, synchronous: bool, categories: &[String]) -> Scope<'b> {
        let mut inherited = self.categories.clone();
        inherited.extend(categories.iter().cloned());
        Scope {
            prefix: format!("{}.{}", self.prefix, name),
            synchronous: self.synchronous || synchronous,
            categories: inherited,
            manifest: self.manifest,
            base_dir: self.base_dir,
            default_timeout: self.default_timeout,
        }
    }
}

impl SuiteManifest {
    /// Read a manifest from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| EngineError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed = if is_yaml_file(path) {
            serde_yaml::from_str::<Self>(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<Self>(&content).map_err(|e| e.to_string())
        };

        let manifest = parsed.map_err(|message| EngineError::ManifestParse {
            path: path.to_path_buf(),
            message,
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(EngineError::UnsupportedVersion(self.version.clone()));
        }
        Ok(())
    }

    /// Build the definition tree. `manifest_dir` anchors relative paths.
    pub fn build(
        &self,
        manifest_dir: &Path,
        default_timeout_secs: u64,
    ) -> Result<LoadedManifest, EngineError> {
        let base_dir = match &self.working_dir {
            Some(dir) => manifest_dir.join(dir),
            None => manifest_dir.to_path_buf(),
        };
        let timeout_secs = self.default_timeout_secs.unwrap_or(default_timeout_secs);

        let scope = Scope {
            prefix: self.name.clone(),
            synchronous: self.synchronous,
            categories: self.categories.iter().cloned().collect(),
            manifest: self,
            base_dir: &base_dir,
            default_timeout: Duration::from_secs(timeout_secs),
        };

        let mut commands = HashMap::new();
        let mut names = HashSet::new();
        let children = build_children(
            &scope,
            &self.suites,
            &self.cases,
            &mut commands,
            &mut names,
        )?;
        let root = Arc::new(TestNode::suite(&self.name, &self.name, children));

        Ok(LoadedManifest { root, commands })
    }
}

fn build_children(
    scope: &Scope<'_>,
    suites: &[SuiteSpec],
    cases: &[CaseSpec],
    commands: &mut HashMap<String, CommandSpec>,
    names: &mut HashSet<String>,
) -> Result<Vec<Arc<TestNode>>, EngineError> {
    let mut children = Vec::with_capacity(suites.len() + cases.len());

    // Suites and cases share one namespace
    for suite in suites {
        let inner = scope.enter(&suite.name, suite.synchronous, &suite.categories);
        if !names.insert(inner.prefix.clone()) {
            return Err(EngineError::DuplicateName(inner.prefix));
        }
        let grandchildren =
            build_children(&inner, &suite.suites, &suite.cases, commands, names)?;
        children.push(Arc::new(TestNode::suite(
            &suite.name,
            inner.prefix.clone(),
            grandchildren,
        )));
    }

    for case in cases {
        let inner = scope.enter(&case.name, case.synchronous, &case.categories);
        let full_name = inner.prefix.clone();

        if !names.insert(full_name.clone()) {
            return Err(EngineError::DuplicateName(full_name));
        }
        if case.command.trim().is_empty() {
            return Err(EngineError::EmptyCommand(full_name));
        }

        let mut env = scope.manifest.env.clone();
        env.extend(case.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let spec = CommandSpec {
            shell: scope.manifest.shell.clone(),
            command: case.command.clone(),
            working_dir: match &case.working_dir {
                Some(dir) => scope.base_dir.join(dir),
                None => scope.base_dir.to_path_buf(),
            },
            env,
            timeout: case
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(scope.default_timeout),
            inconclusive_exit_code: case.inconclusive_exit_code,
        };

        commands.insert(full_name.clone(), spec);

        let mut unit = Unit::new(
            format!("[{}]{}", scope.manifest.name, full_name),
            full_name,
        )
        .synchronous(inner.synchronous);
        unit.categories = inner.categories;

        children.push(Arc::new(TestNode::case(&case.name, unit)));
    }

    Ok(children)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
