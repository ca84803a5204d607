//! partest - partitioned parallel test runner
//!
//! Runs the tests of a suite manifest across a fixed number of workers. Every
//! worker loads its own copy of the package and runs the units its partition
//! owns; synchronous units run alone first. The per-worker result trees are
//! merged into one tree shaped like the definition, and failed units may be
//! retried once.
//!
//! ## Usage
//!
//! ```bash
//! # Run a manifest with 8 workers
//! partest run suite.yaml -j 8
//!
//! # Run two tests and retry failures
//! partest run suite.yaml --run Root.Api.get,Root.Api.put --retest
//!
//! # Preview partitions
//! partest list suite.yaml -j 4
//!
//! # Stored results
//! partest results list
//! partest results show root
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

mod cli;
mod config;
mod engine;
mod executor;
mod filter;
mod merge;
mod models;
mod orchestrator;
mod output;
mod results;
mod utils;

use cli::Args;
use config::{AppConfig, ConfigFile, EnvConfig};
use engine::{CommandEngine, EngineError, TestEngine, TestPackage};
use orchestrator::{Orchestrator, RunError, RunReport};
use output::{OutputFormat, ReportFormatter};
use results::{ExportFormat, ResultsStorage, StoredRun, StoredRunConfig};
use utils::{init_logger, LogLevel};

const EXIT_FAILURES: u8 = 1;
const EXIT_WORKER_FAILURES: u8 = 2;
const EXIT_FIXTURE_NOT_FOUND: u8 = 3;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let level = match args.log_level.as_deref() {
        Some(level) => LogLevel::from_str(level)
            .ok_or_else(|| anyhow::anyhow!("Unknown log level: {level}"))?,
        None => LogLevel::for_verbosity(args.verbose || env.verbose.unwrap_or(false)),
    };
    init_logger(level);

    let config = config::resolve(args.config.as_deref(), &env)?;

    match args.command {
        cli::Command::Run(run_args) => run_tests(run_args, config).await,
        cli::Command::List(list_args) => {
            list_tests(list_args, &config).await?;
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Results(results_args) => {
            show_results(results_args, &config)?;
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &config, &env)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_tests(args: cli::RunArgs, mut config: AppConfig) -> Result<ExitCode> {
    if let Some(dop) = args.dop {
        config.degree_of_parallelism = dop;
    }
    if args.retest {
        config.retest_failures = true;
    }
    if args.no_capture {
        config.capture_output = false;
    }
    if args.recompute_durations {
        config.recompute_durations_after_retry = true;
    }
    if let Some(format) = &args.format {
        config.format = format.clone();
    }

    let format = OutputFormat::from_str(&config.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {}", config.format))?;

    let package = TestPackage::new(&args.manifest)
        .with_fixture(args.fixture.clone())
        .with_default_timeout(config.default_timeout_secs);
    let engine: Arc<dyn TestEngine> = Arc::new(CommandEngine::new());
    let orchestrator = Orchestrator::new(engine, package, config.run_config());

    info!("Running {}", args.manifest.display());
    let caller = filter::caller_filter(&args.run, &args.include, &args.exclude);

    let report = match orchestrator.run(caller).await {
        Ok(report) => report,
        Err(RunError::Load(EngineError::FixtureNotFound(fixture))) => {
            error!("Unable to locate fixture {fixture}");
            return Ok(ExitCode::from(EXIT_FIXTURE_NOT_FOUND));
        }
        Err(e) => return Err(e.into()),
    };

    let mut formatter = ReportFormatter::new(format);
    if args.no_color {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_report(&report));

    let code = exit_code(&report);

    if args.save {
        let storage = ResultsStorage::open(config.results_dir.as_deref())?;
        let stored = StoredRun::new(
            report,
            &args.manifest,
            StoredRunConfig {
                degree_of_parallelism: config.run_config().effective_degree(),
                retest_failures: config.retest_failures,
                capture_output: config.capture_output,
                fixture: args.fixture,
            },
        );
        let path = storage.save(&stored)?;
        println!("Results saved: {} ({})", stored.id, path.display());
    }

    Ok(code)
}

/// Exit status for a finished run
fn exit_code(report: &RunReport) -> ExitCode {
    if report.has_worker_failures() {
        ExitCode::from(EXIT_WORKER_FAILURES)
    } else if !report.is_success() {
        ExitCode::from(EXIT_FAILURES)
    } else {
        ExitCode::SUCCESS
    }
}

async fn list_tests(args: cli::ListArgs, config: &AppConfig) -> Result<()> {
    let package = TestPackage::new(&args.manifest)
        .with_fixture(args.fixture)
        .with_default_timeout(config.default_timeout_secs);
    let engine = CommandEngine::new();
    let suite = engine
        .load(&package)
        .await
        .with_context(|| format!("Failed to load {}", args.manifest.display()))?;

    let degree = orchestrator::normalize_degree(args.dop.unwrap_or(config.degree_of_parallelism));
    print!("{}", output::format_listing(&suite.definition(), degree));
    suite.unload();
    Ok(())
}

fn show_results(args: cli::ResultsArgs, config: &AppConfig) -> Result<()> {
    let storage = ResultsStorage::open(config.results_dir.as_deref())?;

    match args.action {
        cli::ResultsAction::List { suite: Some(suite) } => {
            let runs = storage.list_runs(&suite)?;
            if runs.is_empty() {
                println!("No stored results for {suite}.");
                return Ok(());
            }

            println!("{:24} {:20} {:>6} {:>8} {:>8}", "Run", "Started", "Tests", "Passed", "Workers");
            println!("{:-<70}", "");
            for run in runs {
                println!(
                    "{:24} {:20} {:>6} {:>7.1}% {:>8}",
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.tests_run,
                    run.pass_rate,
                    if run.worker_failures == 0 {
                        "ok".to_string()
                    } else {
                        format!("{} failed", run.worker_failures)
                    }
                );
            }
        }

        cli::ResultsAction::List { suite: None } => {
            let suites = storage.list_suites()?;
            if suites.is_empty() {
                println!("No stored results found.");
                println!("Save a run with: partest run <manifest> --save");
                return Ok(());
            }

            println!("Stored results in {}:", storage.base_dir().display());
            for suite in &suites {
                let runs = storage.list_runs(suite)?;
                if let Some(latest) = runs.first() {
                    println!(
                        "  {:30} {:3} run(s), latest {:.1}% passed",
                        suite,
                        runs.len(),
                        latest.pass_rate
                    );
                }
            }
        }

        cli::ResultsAction::Show {
            suite,
            run_id,
            format,
        } => {
            let run = match run_id {
                Some(id) => storage.load(&suite, &id)?,
                None => storage
                    .latest(&suite)?
                    .ok_or_else(|| anyhow::anyhow!("No stored results for {suite}"))?,
            };
            let format = OutputFormat::from_str(&format)
                .ok_or_else(|| anyhow::anyhow!("Unknown output format: {format}"))?;

            println!("Run {} from {}", run.id, run.manifest);
            println!("{}", ReportFormatter::new(format).format_report(&run.report));
        }

        cli::ResultsAction::Export {
            suite,
            run_id,
            output,
        } => {
            let run = storage.load(&suite, &run_id)?;
            let format = ExportFormat::from_extension(&output).ok_or_else(|| {
                anyhow::anyhow!("Cannot export to {}: use .json or .csv", output.display())
            })?;
            storage.export(&run, &output, format)?;
            println!("Exported {} to {}", run.id, output.display());
        }

        cli::ResultsAction::Delete { suite, run_id, all } => match (run_id, all) {
            (_, true) => {
                storage.delete_suite(&suite)?;
                println!("Deleted all results for {suite}");
            }
            (Some(id), false) => {
                if storage.delete(&suite, &id)? {
                    println!("Deleted {id}");
                } else {
                    anyhow::bail!("Run {id} not found for suite {suite}");
                }
            }
            (None, false) => anyhow::bail!("Specify a run ID or --all"),
        },
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, config: &AppConfig, env: &EnvConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show => {
            if let Some(path) = ConfigFile::find() {
                println!("# Loaded from {}", path.display());
            }
            print!("{}", serde_yaml::to_string(config)?);
        }

        cli::ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            ConfigFile::example().save(&path)?;
            println!("Configuration file created: {}", path.display());
        }

        cli::ConfigAction::Env => {
            config::env::print_env_help();
            if env.has_any() {
                println!();
                env.print_summary();
            }
        }
    }

    Ok(())
}
