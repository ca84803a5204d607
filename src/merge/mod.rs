//! Result tree merging
//!
//! Reassembles the trees of independent passes over disjoint leaf sets into
//! one tree shaped like the definition hierarchy, and splices retried leaves
//! back into it.

mod merger;
mod retry;

pub use merger::ResultTreeMerger;

use thiserror::Error;

/// Merge invariant violations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MergeError {
    #[error("Retried test {0} has no counterpart in the retry results")]
    MissingCounterpart(String),

    #[error("Failed test {0} is no longer present in the merged results")]
    MissingLeaf(String),
}
