//! Output formatting module
//!
//! Provides various output formats for run reports.

mod formatter;

pub use formatter::{format_listing, OutputFormat, ReportFormatter};
