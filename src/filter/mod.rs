//! Unit selection
//!
//! Partition assignment and the filter algebra used to split a run into
//! synchronous, parallel and retry passes.

mod assignor;
mod unit_filter;

pub use assignor::PartitionAssignor;
pub use unit_filter::{caller_filter, UnitFilter};
