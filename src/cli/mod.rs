//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Partitioned parallel test runner
#[derive(Parser, Debug)]
#[command(name = "partest")]
#[command(version)]
#[command(about = "Run a test package across parallel partitions and merge the results")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the tests of a suite manifest
    Run(RunArgs),

    /// List the tests of a suite manifest and their partitions
    List(ListArgs),

    /// View stored run results
    Results(ResultsArgs),

    /// Show or create configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite manifest (YAML or JSON)
    pub manifest: PathBuf,

    /// Run only this sub-suite
    #[arg(long)]
    pub fixture: Option<String>,

    /// Tests to run by full name (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub run: Vec<String>,

    /// Categories to include (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Categories to exclude (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Number of parallel workers
    #[arg(short = 'j', long)]
    pub dop: Option<usize>,

    /// Re-run failed tests once
    #[arg(long)]
    pub retest: bool,

    /// Stream test output instead of attaching it to results
    #[arg(long)]
    pub no_capture: bool,

    /// Re-sum suite durations after retried tests recover
    #[arg(long)]
    pub recompute_durations: bool,

    /// Output format (table, tree, json, json-pretty, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Save results to the results directory
    #[arg(short, long)]
    pub save: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Suite manifest (YAML or JSON)
    pub manifest: PathBuf,

    /// Only list this sub-suite
    #[arg(long)]
    pub fixture: Option<String>,

    /// Number of partitions to preview
    #[arg(short = 'j', long)]
    pub dop: Option<usize>,
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub action: ResultsAction,
}

#[derive(Subcommand, Debug)]
pub enum ResultsAction {
    /// List stored runs
    List {
        /// Only runs of this suite
        suite: Option<String>,
    },

    /// Show a stored run
    Show {
        suite: String,

        /// Run ID (latest when omitted)
        run_id: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Export a stored run
    Export {
        suite: String,

        run_id: String,

        /// Output file; the format follows its extension
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Delete stored runs
    Delete {
        suite: String,

        /// Run ID to delete
        run_id: Option<String>,

        /// Delete every run of the suite
        #[arg(short, long)]
        all: bool,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(default_value = "partest.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show supported environment variables
    Env,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let args = Args::parse_from([
            "partest",
            "run",
            "suite.yaml",
            "--run",
            "Root.a,Root.b",
            "--exclude",
            "slow",
            "-j",
            "8",
            "--retest",
        ]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.manifest, PathBuf::from("suite.yaml"));
                assert_eq!(run.run, vec!["Root.a", "Root.b"]);
                assert!(run.include.is_empty());
                assert_eq!(run.exclude, vec!["slow"]);
                assert_eq!(run.dop, Some(8));
                assert!(run.retest);
                assert!(!run.save);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = Args::parse_from(["partest", "list", "suite.json", "--verbose", "-c", "x.yaml"]);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("x.yaml")));
        match args.command {
            Command::List(list) => assert_eq!(list.dop, None),
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_results_args() {
        let args = Args::parse_from(["partest", "results", "delete", "root", "--all"]);
        match args.command {
            Command::Results(ResultsArgs {
                action: ResultsAction::Delete { suite, run_id, all },
            }) => {
                assert_eq!(suite, "root");
                assert!(run_id.is_none());
                assert!(all);
            }
            _ => panic!("Expected Results delete"),
        }
    }
}
