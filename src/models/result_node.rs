//! Result tree models
//!
//! Defines result states and the hierarchical result node produced by a pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

use super::definition::TestNode;

/// Outcome state of a result node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultState {
    Success,
    Failure,
    Error,
    Inconclusive,
}

impl ResultState {
    pub fn symbol(&self) -> &'static str {
        match self {
            ResultState::Success => "✓",
            ResultState::Failure => "✗",
            ResultState::Error => "!",
            ResultState::Inconclusive => "?",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultState::Success)
    }

    /// Failures and errors both count as failed for reporting and retry
    pub fn is_failure(&self) -> bool {
        matches!(self, ResultState::Failure | ResultState::Error)
    }

    /// State of a group derived from its children
    pub fn aggregate<'a>(children: impl IntoIterator<Item = &'a ResultNode>) -> Self {
        let mut any = false;
        let mut all_success = true;
        for child in children {
            any = true;
            if child.state.is_failure() {
                return ResultState::Failure;
            }
            all_success &= child.state.is_success();
        }
        if any && all_success {
            ResultState::Success
        } else {
            ResultState::Inconclusive
        }
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultState::Success => write!(f, "Success"),
            ResultState::Failure => write!(f, "Failure"),
            ResultState::Error => write!(f, "Error"),
            ResultState::Inconclusive => write!(f, "Inconclusive"),
        }
    }
}

/// One node of a result tree: a suite with children or a unit outcome
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultNode {
    pub name: String,
    pub full_name: String,
    pub is_suite: bool,
    pub executed: bool,
    pub state: ResultState,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ResultNode>,
    #[serde(skip)]
    definition: Weak<TestNode>,
}

impl ResultNode {
    /// Empty, not-yet-executed node for a definition
    pub fn for_definition(definition: &Arc<TestNode>) -> Self {
        Self {
            name: definition.name.clone(),
            full_name: definition.full_name.clone(),
            is_suite: definition.is_suite(),
            executed: false,
            state: ResultState::Inconclusive,
            duration_ms: 0,
            message: None,
            output: None,
            children: Vec::new(),
            definition: Arc::downgrade(definition),
        }
    }

    /// Empty node sharing the identity of another node
    pub fn shell_of(other: &ResultNode) -> Self {
        Self {
            name: other.name.clone(),
            full_name: other.full_name.clone(),
            is_suite: other.is_suite,
            executed: false,
            state: ResultState::Inconclusive,
            duration_ms: 0,
            message: None,
            output: None,
            children: Vec::new(),
            definition: other.definition.clone(),
        }
    }

    /// Executed leaf outcome
    pub fn outcome(
        definition: &Arc<TestNode>,
        state: ResultState,
        duration_ms: u64,
        message: Option<String>,
    ) -> Self {
        let mut node = Self::for_definition(definition);
        node.executed = true;
        node.state = state;
        node.duration_ms = duration_ms;
        node.message = message;
        node
    }

    pub fn success(definition: &Arc<TestNode>, duration_ms: u64) -> Self {
        Self::outcome(definition, ResultState::Success, duration_ms, None)
    }

    pub fn failure(definition: &Arc<TestNode>, duration_ms: u64, message: impl Into<String>) -> Self {
        Self::outcome(
            definition,
            ResultState::Failure,
            duration_ms,
            Some(message.into()),
        )
    }

    pub fn error(definition: &Arc<TestNode>, duration_ms: u64, message: impl Into<String>) -> Self {
        Self::outcome(
            definition,
            ResultState::Error,
            duration_ms,
            Some(message.into()),
        )
    }

    /// The definition this node was produced from, while it is still loaded
    pub fn definition(&self) -> Option<Arc<TestNode>> {
        self.definition.upgrade()
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_suite
    }

    /// Append a child and mark this node executed if the child was
    pub fn push_child(&mut self, child: ResultNode) {
        self.executed |= child.executed;
        self.children.push(child);
    }

    /// Attach captured output to this result
    pub fn attach_output(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match &mut self.output {
            Some(existing) => existing.push_str(text),
            None => self.output = Some(text.to_string()),
        }
    }

    /// Recompute duration and state of this node from its children
    pub fn finish_group(&mut self) {
        self.duration_ms = self.children.iter().map(|c| c.duration_ms).sum();
        self.state = ResultState::aggregate(&self.children);
        self.message = if self.state.is_failure() {
            Some("One or more child tests failed".to_string())
        } else {
            None
        };
    }

    /// Recursively recompute every group below and including this node
    pub fn recompute(&mut self) {
        if self.is_leaf() {
            return;
        }
        for child in &mut self.children {
            child.recompute();
        }
        self.finish_group();
    }

    /// Executed leaves in tree order
    pub fn leaves(&self) -> Vec<&ResultNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ResultNode>) {
        if self.is_leaf() {
            if self.executed {
                out.push(self);
            }
            return;
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }

    /// Consume the tree, yielding its executed leaves in tree order
    pub fn into_leaves(self) -> Vec<ResultNode> {
        let mut out = Vec::new();
        self.collect_owned_leaves(&mut out);
        out
    }

    fn collect_owned_leaves(self, out: &mut Vec<ResultNode>) {
        if self.is_leaf() {
            if self.executed {
                out.push(self);
            }
            return;
        }
        for child in self.children {
            child.collect_owned_leaves(out);
        }
    }

    /// Full names of executed leaves that failed or errored
    pub fn failed_leaf_names(&self) -> Vec<String> {
        self.leaves()
            .into_iter()
            .filter(|leaf| leaf.state.is_failure())
            .map(|leaf| leaf.full_name.clone())
            .collect()
    }

    /// Find a leaf by full name
    pub fn find_leaf(&self, full_name: &str) -> Option<&ResultNode> {
        if self.is_leaf() {
            return (self.full_name == full_name).then_some(self);
        }
        self.children.iter().find_map(|c| c.find_leaf(full_name))
    }

    /// Replace a leaf in its parent's child list, keeping its position.
    /// Returns the node that was replaced.
    pub fn replace_leaf(&mut self, full_name: &str, replacement: ResultNode) -> Option<ResultNode> {
        let mut replacement = Some(replacement);
        self.replace_leaf_inner(full_name, &mut replacement)
    }

    fn replace_leaf_inner(
        &mut self,
        full_name: &str,
        replacement: &mut Option<ResultNode>,
    ) -> Option<ResultNode> {
        for child in &mut self.children {
            if child.is_leaf() && child.full_name == full_name {
                let new = replacement.take()?;
                return Some(std::mem::replace(child, new));
            }
            if child.is_suite {
                if let Some(old) = child.replace_leaf_inner(full_name, replacement) {
                    return Some(old);
                }
            }
        }
        None
    }
}

impl fmt::Display for ResultNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.state.symbol(),
            self.full_name,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}
