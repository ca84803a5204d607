//! Output formatters for run reports
//!
//! Provides table, tree, JSON and summary output formats.

use std::sync::Arc;

use crate::filter::PartitionAssignor;
use crate::models::{ResultNode, ResultState, TestNode};
use crate::orchestrator::RunReport;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Tree,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "tree" => Some(OutputFormat::Tree),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Run report formatter
pub struct ReportFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ReportFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a finished run
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Table => self.format_table(report),
            OutputFormat::Tree => self.format_tree(report),
            OutputFormat::Json => serde_json::to_string(report).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Summary => self.format_brief(report),
        }
    }

    fn paint(&self, text: &str, state: ResultState) -> String {
        if !self.colorize {
            return text.to_string();
        }
        let color = match state {
            ResultState::Success => "32",
            ResultState::Failure | ResultState::Error => "31",
            ResultState::Inconclusive => "33",
        };
        format!("\x1b[{color}m{text}\x1b[0m")
    }

    fn format_table(&self, report: &RunReport) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "\n{} - {} worker(s), started {}\n",
            report.suite,
            report.degree_of_parallelism,
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&"─".repeat(64));
        output.push('\n');

        for pass in &report.passes {
            output.push_str(&format!(
                "  {:20} {:>5} test(s) {:>8}ms\n",
                pass.label, pass.tests, pass.duration_ms
            ));
        }
        output.push_str(&"─".repeat(64));
        output.push('\n');

        let state = if report.summary.is_all_passed() {
            ResultState::Success
        } else {
            ResultState::Failure
        };
        output.push_str(&self.paint(&report.summary.to_string(), state));
        output.push('\n');

        if !report.retried.is_empty() {
            output.push_str(&format!(
                "Retried: {}, Recovered: {}\n",
                report.retried.len(),
                report.recovered.len()
            ));
        }

        if report.has_worker_failures() {
            output.push_str("\nWorker Failures:\n");
            for failure in &report.worker_failures {
                output.push_str(&format!(
                    "  {} ({}): {}\n",
                    failure.worker, failure.phase, failure.message
                ));
            }
        }

        let failures = report.failures();
        if !failures.is_empty() {
            output.push_str("\nErrors and Failures:\n");
            for (i, leaf) in failures.iter().enumerate() {
                output.push_str(&format!(
                    "{}) {} : {}\n",
                    i + 1,
                    self.paint(&leaf.full_name, leaf.state),
                    leaf.message.as_deref().unwrap_or("")
                ));
                if let Some(captured) = &leaf.output {
                    output.push_str("Full Output:\n");
                    for line in captured.lines() {
                        output.push_str(&format!("    {line}\n"));
                    }
                }
            }
        }

        output
    }

    fn format_tree(&self, report: &RunReport) -> String {
        let mut output = String::new();
        self.write_node(&report.tree, 0, &mut output);
        output.push_str(&report.summary.to_string());
        output.push('\n');
        output
    }

    fn write_node(&self, node: &ResultNode, depth: usize, output: &mut String) {
        let line = format!(
            "{}{} {} [{}ms]",
            "  ".repeat(depth),
            node.state.symbol(),
            node.name,
            node.duration_ms
        );
        output.push_str(&self.paint(&line, node.state));
        if node.is_leaf() {
            if let Some(message) = &node.message {
                output.push_str(&format!(" - {message}"));
            }
        }
        output.push('\n');
        for child in &node.children {
            self.write_node(child, depth + 1, output);
        }
    }

    fn format_brief(&self, report: &RunReport) -> String {
        let mut line = format!(
            "{}: {}/{} passed ({:.1}%) in {}ms",
            report.suite,
            report.summary.passed,
            report.summary.tests_run,
            report.summary.pass_rate(),
            report.duration_ms()
        );
        if report.has_worker_failures() {
            line.push_str(&format!(", {} worker(s) failed", report.worker_failures.len()));
        }
        line
    }
}

/// Render a definition tree, marking synchronous units and previewing the
/// partition every other unit would land in.
pub fn format_listing(root: &Arc<TestNode>, degree_of_parallelism: usize) -> String {
    let assignor = PartitionAssignor::new(degree_of_parallelism);
    let mut output = String::new();
    write_definition(root, 0, &assignor, &mut output);

    let synchronous = root.units().iter().filter(|u| u.synchronous).count();
    output.push_str(&format!(
        "\n{} test(s), {} synchronous, {} partition(s)\n",
        root.unit_count(),
        synchronous,
        assignor.degree_of_parallelism()
    ));
    output
}

fn write_definition(
    node: &Arc<TestNode>,
    depth: usize,
    assignor: &PartitionAssignor,
    output: &mut String,
) {
    let indent = "  ".repeat(depth);
    match node.unit() {
        None => {
            output.push_str(&format!("{indent}{}/\n", node.name));
            for child in node.children() {
                write_definition(child, depth + 1, assignor, output);
            }
        }
        Some(unit) if unit.synchronous => {
            output.push_str(&format!("{indent}{} [sync]\n", node.name));
        }
        Some(unit) => {
            let partition = assignor.assign(&unit.unique_name);
            output.push_str(&format!("{indent}{} [p{partition}]\n", node.name));
        }
    }
}
