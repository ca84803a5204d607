//! Unit filter algebra
//!
//! Composable predicates deciding which units a worker or pass runs.
//! Suites pass through every filter except a nested `Not`, so selection
//! always happens at the leaves.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::assignor::PartitionAssignor;
use crate::models::{TestNode, Unit};

/// Predicate over definition nodes
#[derive(Clone, Debug)]
pub enum UnitFilter {
    /// Matches everything
    AlwaysTrue,
    /// Units assigned to one partition, never synchronous units
    ByPartition {
        partition: usize,
        assignor: Arc<PartitionAssignor>,
    },
    /// Units that must run synchronously
    BySynchronousFlag,
    /// Units whose full name is in the set
    ByExplicitNameSet(Arc<HashSet<String>>),
    /// Units carrying any of the categories
    ByCategory(BTreeSet<String>),
    And(Box<UnitFilter>, Box<UnitFilter>),
    /// Negation. A top-level `Not` never rejects a suite.
    Not {
        inner: Box<UnitFilter>,
        top_level: bool,
    },
}

impl UnitFilter {
    pub fn partition(partition: usize, assignor: Arc<PartitionAssignor>) -> Self {
        UnitFilter::ByPartition {
            partition,
            assignor,
        }
    }

    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UnitFilter::ByExplicitNameSet(Arc::new(names.into_iter().map(Into::into).collect()))
    }

    pub fn categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UnitFilter::ByCategory(categories.into_iter().map(Into::into).collect())
    }

    /// Conjunction; `AlwaysTrue` on either side is dropped
    pub fn and(self, other: UnitFilter) -> Self {
        match (self, other) {
            (UnitFilter::AlwaysTrue, other) => other,
            (this, UnitFilter::AlwaysTrue) => this,
            (this, other) => UnitFilter::And(Box::new(this), Box::new(other)),
        }
    }

    /// Plain negation, applied to suites as well as units
    #[cfg(test)]
    pub fn not(inner: UnitFilter) -> Self {
        UnitFilter::Not {
            inner: Box::new(inner),
            top_level: false,
        }
    }

    /// Negation used for category exclusion: only ever rejects units
    pub fn exclude(inner: UnitFilter) -> Self {
        UnitFilter::Not {
            inner: Box::new(inner),
            top_level: true,
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        matches!(self, UnitFilter::AlwaysTrue)
    }

    /// Whether `node` is selected by this filter
    pub fn matches(&self, node: &TestNode) -> bool {
        match node.unit() {
            Some(unit) => self.matches_unit(unit),
            None => self.matches_suite(),
        }
    }

    fn matches_suite(&self) -> bool {
        match self {
            UnitFilter::And(a, b) => a.matches_suite() && b.matches_suite(),
            UnitFilter::Not { inner, top_level } => *top_level || !inner.matches_suite(),
            _ => true,
        }
    }

    fn matches_unit(&self, unit: &Unit) -> bool {
        match self {
            UnitFilter::AlwaysTrue => true,
            UnitFilter::ByPartition {
                partition,
                assignor,
            } => !unit.synchronous && assignor.assign(&unit.unique_name) == *partition,
            UnitFilter::BySynchronousFlag => {
                if unit.synchronous {
                    info!("Running {} synchronously", unit.full_name);
                }
                unit.synchronous
            }
            UnitFilter::ByExplicitNameSet(names) => names.contains(&unit.full_name),
            UnitFilter::ByCategory(categories) => {
                unit.categories.iter().any(|c| categories.contains(c))
            }
            UnitFilter::And(a, b) => a.matches_unit(unit) && b.matches_unit(unit),
            UnitFilter::Not { inner, .. } => !inner.matches_unit(unit),
        }
    }
}

impl Default for UnitFilter {
    fn default() -> Self {
        UnitFilter::AlwaysTrue
    }
}

impl fmt::Display for UnitFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitFilter::AlwaysTrue => write!(f, "all"),
            UnitFilter::ByPartition { partition, .. } => write!(f, "partition({partition})"),
            UnitFilter::BySynchronousFlag => write!(f, "synchronous"),
            UnitFilter::ByExplicitNameSet(names) => write!(f, "names({})", names.len()),
            UnitFilter::ByCategory(categories) => {
                let list: Vec<&str> = categories.iter().map(String::as_str).collect();
                write!(f, "category({})", list.join(","))
            }
            UnitFilter::And(a, b) => write!(f, "{a} & {b}"),
            UnitFilter::Not { inner, .. } => write!(f, "!({inner})"),
        }
    }
}

/// Build the caller's filter from name and category selections
pub fn caller_filter(run: &[String], include: &[String], exclude: &[String]) -> UnitFilter {
    let mut filter = UnitFilter::AlwaysTrue;

    if !run.is_empty() {
        info!("Selected test(s): {}", run.join(", "));
        filter = filter.and(UnitFilter::names(run.iter().cloned()));
    }

    if !include.is_empty() {
        info!("Included categories: {}", include.join(", "));
        filter = filter.and(UnitFilter::categories(include.iter().cloned()));
    }

    if !exclude.is_empty() {
        info!("Excluded categories: {}", exclude.join(", "));
        filter = filter.and(UnitFilter::exclude(UnitFilter::categories(
            exclude.iter().cloned(),
        )));
    }

    filter
}
