//! Data models for partitioned test runs
//!
//! Definition trees discovered by an engine, the result trees produced by a
//! pass, and the summary computed over a merged tree.

mod definition;
mod result_node;
mod summary;

pub use definition::{TestNode, Unit};
pub use result_node::{ResultNode, ResultState};
pub use summary::ResultSummary;
