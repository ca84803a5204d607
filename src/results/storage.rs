//! Results storage and retrieval
//!
//! Provides persistent storage for run reports in JSON format.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::orchestrator::RunReport;

/// Stored run: a report plus the context it was produced in
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRun {
    /// Unique run ID
    pub id: String,

    /// Root suite of the run
    pub suite: String,

    /// Manifest the run was loaded from
    pub manifest: String,

    /// Timestamp when the report was stored
    pub completed_at: DateTime<Utc>,

    /// Run configuration
    pub config: StoredRunConfig,

    /// Environment info
    pub environment: EnvironmentInfo,

    pub report: RunReport,
}

/// Configuration a run was executed with
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoredRunConfig {
    pub degree_of_parallelism: usize,
    pub retest_failures: bool,
    pub capture_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture: Option<String>,
}

/// Environment information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Operating system
    pub os: String,

    /// Architecture
    pub arch: String,

    /// Tool version
    pub tool_version: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl StoredRun {
    /// Wrap a finished report
    pub fn new(report: RunReport, manifest: &Path, config: StoredRunConfig) -> Self {
        Self {
            id: generate_run_id(),
            suite: report.suite.clone(),
            manifest: manifest.display().to_string(),
            completed_at: Utc::now(),
            config,
            environment: EnvironmentInfo::default(),
            report,
        }
    }
}

/// Generate unique run ID
fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Directory name for a suite
fn suite_dir_name(suite: &str) -> String {
    suite
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Results storage manager
pub struct ResultsStorage {
    /// Base directory for results
    base_dir: PathBuf,
}

impl ResultsStorage {
    /// Create a new results storage
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create with default directory
    pub fn default_dir() -> Result<Self> {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("partest")
            .join("results");
        Ok(Self::new(base_dir))
    }

    /// Use `dir` when configured, the default location otherwise
    pub fn open(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Ok(Self::new(dir)),
            None => Self::default_dir(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get path for a suite's results
    fn suite_dir(&self, suite: &str) -> PathBuf {
        self.base_dir.join(suite_dir_name(suite))
    }

    /// Get path for a specific run
    fn run_path(&self, suite: &str, run_id: &str) -> PathBuf {
        self.suite_dir(suite).join(format!("{run_id}.json"))
    }

    /// Save a run
    pub fn save(&self, run: &StoredRun) -> Result<PathBuf> {
        let suite_dir = self.suite_dir(&run.suite);
        fs::create_dir_all(&suite_dir)
            .with_context(|| format!("Failed to create directory: {}", suite_dir.display()))?;

        let path = self.run_path(&run.suite, &run.id);
        let file = File::create(&path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, run).context("Failed to write results")?;

        info!("Saved run results to {}", path.display());
        Ok(path)
    }

    /// Load a run
    pub fn load(&self, suite: &str, run_id: &str) -> Result<StoredRun> {
        let path = self.run_path(suite, run_id);
        let run = self
            .load_from_path(&path)
            .with_context(|| format!("Run {run_id} not found for suite {suite}"))?;

        debug!("Loaded run results from {}", path.display());
        Ok(run)
    }

    /// Load from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<StoredRun> {
        let file = File::open(path).context("Failed to open results file")?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse results")
    }

    /// Load all runs for a suite, newest first
    pub fn load_suite(&self, suite: &str) -> Result<Vec<StoredRun>> {
        let suite_dir = self.suite_dir(suite);
        if !suite_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&suite_dir)? {
            let path = entry?.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match self.load_from_path(&path) {
                    Ok(run) => runs.push(run),
                    Err(e) => {
                        debug!("Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        runs.sort_by(|a, b| b.report.started_at.cmp(&a.report.started_at));
        Ok(runs)
    }

    /// List all suites with results
    pub fn list_suites(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut suites = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    suites.push(name.to_string());
                }
            }
        }

        suites.sort();
        Ok(suites)
    }

    /// List all runs for a suite
    pub fn list_runs(&self, suite: &str) -> Result<Vec<RunInfo>> {
        Ok(self
            .load_suite(suite)?
            .into_iter()
            .map(|run| RunInfo {
                id: run.id,
                started_at: run.report.started_at,
                tests_run: run.report.summary.tests_run,
                pass_rate: run.report.summary.pass_rate(),
                worker_failures: run.report.worker_failures.len(),
            })
            .collect())
    }

    /// Get latest run for a suite
    pub fn latest(&self, suite: &str) -> Result<Option<StoredRun>> {
        let runs = self.load_suite(suite)?;
        Ok(runs.into_iter().next())
    }

    /// Delete a run
    pub fn delete(&self, suite: &str, run_id: &str) -> Result<bool> {
        let path = self.run_path(suite, run_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        info!("Deleted results: {}", path.display());
        Ok(true)
    }

    /// Delete all runs for a suite
    pub fn delete_suite(&self, suite: &str) -> Result<()> {
        let suite_dir = self.suite_dir(suite);
        if suite_dir.exists() {
            fs::remove_dir_all(&suite_dir)?;
            info!("Deleted all results for suite: {suite}");
        }
        Ok(())
    }

    /// Export run to a file
    pub fn export(&self, run: &StoredRun, path: &Path, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Json => {
                let file = File::create(path)?;
                let writer = BufWriter::new(file);
                serde_json::to_writer_pretty(writer, run)?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)?;

                writer.write_record(["full_name", "state", "duration_ms", "retried", "message"])?;

                for leaf in run.report.tree.leaves() {
                    let retried = run.report.retried.contains(&leaf.full_name);
                    writer.write_record([
                        leaf.full_name.clone(),
                        leaf.state.to_string(),
                        leaf.duration_ms.to_string(),
                        retried.to_string(),
                        leaf.message.clone().unwrap_or_default(),
                    ])?;
                }
                writer.flush()?;
            }
        }

        info!("Exported results to {}", path.display());
        Ok(())
    }
}

/// Brief run information
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub tests_run: usize,
    pub pass_rate: f64,
    pub worker_failures: usize,
}

/// Export format
#[derive(Clone, Copy, Debug)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_str)
    }
}
