//! Run event listeners
//!
//! Engines report progress through an [`EventListener`]. Each worker owns
//! its own listener, so captured output never crosses workers.

use tracing::{debug, info, warn};

use crate::models::{ResultNode, TestNode};

/// Receives events while a suite runs
pub trait EventListener: Send {
    fn run_started(&mut self, _name: &str, _unit_count: usize) {}

    fn run_finished(&mut self, _result: &ResultNode) {}

    fn test_started(&mut self, _unit: &TestNode) {}

    /// Output produced by a running unit
    fn test_output(&mut self, _unit: &TestNode, _text: &str) {}

    /// A unit finished; listeners may annotate the result
    fn test_finished(&mut self, _result: &mut ResultNode) {}
}

/// Logs progress of one worker
#[derive(Debug)]
pub struct ProgressListener {
    label: String,
    expected: usize,
    completed: usize,
}

impl ProgressListener {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            expected: 0,
            completed: 0,
        }
    }
}

impl EventListener for ProgressListener {
    fn run_started(&mut self, name: &str, unit_count: usize) {
        self.expected = unit_count;
        debug!("[{}] starting {} ({} units)", self.label, name, unit_count);
    }

    fn run_finished(&mut self, _result: &ResultNode) {
        debug!(
            "[{}] finished {}/{} units",
            self.label, self.completed, self.expected
        );
    }

    fn test_started(&mut self, unit: &TestNode) {
        debug!("[{}] running {}", self.label, unit.full_name);
    }

    fn test_finished(&mut self, result: &mut ResultNode) {
        self.completed += 1;
        if result.state.is_failure() {
            warn!("[{}] {}", self.label, result);
        } else {
            info!("[{}] {}", self.label, result);
        }
    }
}

/// Captures a unit's output and attaches it to the unit's result
#[derive(Debug)]
pub struct CapturingListener<L> {
    inner: L,
    capture: bool,
    buffer: String,
}

impl<L: EventListener> CapturingListener<L> {
    pub fn new(inner: L, capture: bool) -> Self {
        Self {
            inner,
            capture,
            buffer: String::new(),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: EventListener> EventListener for CapturingListener<L> {
    fn run_started(&mut self, name: &str, unit_count: usize) {
        self.inner.run_started(name, unit_count);
    }

    fn run_finished(&mut self, result: &ResultNode) {
        self.inner.run_finished(result);
    }

    fn test_started(&mut self, unit: &TestNode) {
        self.buffer.clear();
        self.inner.test_started(unit);
    }

    fn test_output(&mut self, unit: &TestNode, text: &str) {
        if self.capture {
            self.buffer.push_str(text);
        } else {
            for line in text.lines() {
                println!("[{}] {line}", unit.full_name);
            }
        }
        self.inner.test_output(unit, text);
    }

    fn test_finished(&mut self, result: &mut ResultNode) {
        if self.capture {
            result.attach_output(&self.buffer);
            self.buffer.clear();
        }
        self.inner.test_finished(result);
    }
}
