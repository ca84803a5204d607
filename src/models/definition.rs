//! Test definition tree
//!
//! The logical hierarchy of suites and units as discovered by an engine.
//! Definitions are immutable once loaded and shared behind `Arc` so that
//! result nodes can hold weak back-references to them.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A single executable unit of work
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Unit {
    /// Stable unique name, used for partition assignment
    pub unique_name: String,
    /// Human-readable full name, used as the merge and retry key
    pub full_name: String,
    /// Must never run concurrently with other units
    pub synchronous: bool,
    /// Categories, including those inherited from enclosing suites
    pub categories: BTreeSet<String>,
}

impl Unit {
    pub fn new(unique_name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            full_name: full_name.into(),
            synchronous: false,
            categories: BTreeSet::new(),
        }
    }

    pub fn synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }
}

/// Kind of definition node
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Suite { children: Vec<Arc<TestNode>> },
    Case(Unit),
}

/// A node of the definition tree
#[derive(Clone, Debug, Serialize)]
pub struct TestNode {
    pub name: String,
    pub full_name: String,
    pub kind: TestKind,
}

impl TestNode {
    pub fn suite(
        name: impl Into<String>,
        full_name: impl Into<String>,
        children: Vec<Arc<TestNode>>,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            kind: TestKind::Suite { children },
        }
    }

    pub fn case(name: impl Into<String>, unit: Unit) -> Self {
        Self {
            name: name.into(),
            full_name: unit.full_name.clone(),
            kind: TestKind::Case(unit),
        }
    }

    /// The unit behind a leaf, `None` for suites
    pub fn unit(&self) -> Option<&Unit> {
        match &self.kind {
            TestKind::Case(unit) => Some(unit),
            TestKind::Suite { .. } => None,
        }
    }

    pub fn is_suite(&self) -> bool {
        matches!(self.kind, TestKind::Suite { .. })
    }

    pub fn children(&self) -> &[Arc<TestNode>] {
        match &self.kind {
            TestKind::Suite { children } => children,
            TestKind::Case(_) => &[],
        }
    }

    /// All units below this node, in discovery order
    pub fn units(&self) -> Vec<&Unit> {
        let mut units = Vec::new();
        self.collect_units(&mut units);
        units
    }

    fn collect_units<'a>(&'a self, out: &mut Vec<&'a Unit>) {
        match &self.kind {
            TestKind::Case(unit) => out.push(unit),
            TestKind::Suite { children } => {
                for child in children {
                    child.collect_units(out);
                }
            }
        }
    }

    pub fn unit_count(&self) -> usize {
        match &self.kind {
            TestKind::Case(_) => 1,
            TestKind::Suite { children } => children.iter().map(|c| c.unit_count()).sum(),
        }
    }

    /// Find a descendant (or self) by full name
    pub fn find(self: &Arc<Self>, full_name: &str) -> Option<Arc<TestNode>> {
        if self.full_name == full_name {
            return Some(Arc::clone(self));
        }
        self.children().iter().find_map(|c| c.find(full_name))
    }
}

impl fmt::Display for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TestKind::Suite { children } => {
                write!(f, "{} ({} children)", self.full_name, children.len())
            }
            TestKind::Case(unit) if unit.synchronous => write!(f, "{} [sync]", self.full_name),
            TestKind::Case(_) => write!(f, "{}", self.full_name),
        }
    }
}
