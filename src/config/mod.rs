//! Configuration module
//!
//! Handles loading and managing configuration. Values resolve in the order
//! command line, environment, config file, defaults.

pub mod env;
pub mod file;

pub use env::EnvConfig;
pub use file::ConfigFile;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::orchestrator::{RunConfig, DEFAULT_DEGREE_OF_PARALLELISM};

/// Application configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Number of parallel workers (0 selects the default)
    pub degree_of_parallelism: usize,

    /// Re-run failed tests once after the parallel pass
    pub retest_failures: bool,

    /// Attach test output to results instead of streaming it
    pub capture_output: bool,

    /// Re-sum suite durations after retried tests recover
    pub recompute_durations_after_retry: bool,

    /// Timeout for tests that declare none
    pub default_timeout_secs: u64,

    /// Default output format
    pub format: String,

    /// Where run results are saved
    pub results_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            degree_of_parallelism: DEFAULT_DEGREE_OF_PARALLELISM,
            retest_failures: false,
            capture_output: true,
            recompute_durations_after_retry: false,
            default_timeout_secs: 300,
            format: "table".to_string(),
            results_dir: None,
        }
    }
}

impl AppConfig {
    /// Apply environment overrides
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(dop) = env.degree_of_parallelism {
            self.degree_of_parallelism = dop;
        }
        if let Some(retest) = env.retest_failures {
            self.retest_failures = retest;
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
        if let Some(no_capture) = env.no_capture {
            self.capture_output = !no_capture;
        }
        if let Some(dir) = &env.results_dir {
            self.results_dir = Some(PathBuf::from(dir));
        }
    }

    /// Options for the orchestrator
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            degree_of_parallelism: self.degree_of_parallelism,
            retest_failures: self.retest_failures,
            capture_output: self.capture_output,
            recompute_durations_after_retry: self.recompute_durations_after_retry,
        }
    }
}

/// Resolve configuration from an explicit or discovered config file plus the
/// environment. Command-line overrides are applied by the caller.
pub fn resolve(explicit: Option<&Path>, env: &EnvConfig) -> Result<AppConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env.config_file.as_ref().map(PathBuf::from));

    let file = match path {
        Some(path) => ConfigFile::load(&path)?,
        None => ConfigFile::load_default()?,
    };

    let mut app = file.app;
    app.apply_env(env);
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.degree_of_parallelism, 4);
        assert!(!config.retest_failures);
        assert!(config.capture_output);
        assert_eq!(config.format, "table");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("retest_failures: true\n").unwrap();
        assert!(config.retest_failures);
        assert_eq!(config.degree_of_parallelism, 4);
        assert_eq!(config.default_timeout_secs, 300);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = AppConfig {
            degree_of_parallelism: 2,
            format: "tree".to_string(),
            ..AppConfig::default()
        };
        config.apply_env(&EnvConfig {
            degree_of_parallelism: Some(8),
            no_capture: Some(true),
            ..EnvConfig::default()
        });

        assert_eq!(config.degree_of_parallelism, 8);
        assert_eq!(config.format, "tree");
        assert!(!config.capture_output);
    }

    #[test]
    fn test_resolve_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partest.yaml");
        std::fs::write(
            &path,
            "version: \"1.0\"\napp:\n  degree_of_parallelism: 3\n  retest_failures: true\n",
        )
        .unwrap();

        let env = EnvConfig {
            retest_failures: Some(false),
            ..EnvConfig::default()
        };
        let config = resolve(Some(&path), &env).unwrap();
        assert_eq!(config.degree_of_parallelism, 3);
        assert!(!config.retest_failures);

        let run = config.run_config();
        assert_eq!(run.effective_degree(), 3);
    }
}
