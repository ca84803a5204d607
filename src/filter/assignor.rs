//! Partition assignment
//!
//! Round-robin assignment of units to partitions in first-seen order. One
//! assignor is shared by every worker of a run.

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Memoizing, thread-safe mapping from unit name to partition index
#[derive(Debug)]
pub struct PartitionAssignor {
    degree_of_parallelism: usize,
    partitions: Mutex<IndexMap<String, usize>>,
}

impl PartitionAssignor {
    /// Create an assignor for `degree_of_parallelism` partitions.
    ///
    /// A degree of zero is treated as one partition; callers normalize the
    /// configured value before getting here.
    pub fn new(degree_of_parallelism: usize) -> Self {
        Self {
            degree_of_parallelism: degree_of_parallelism.max(1),
            partitions: Mutex::new(IndexMap::new()),
        }
    }

    pub fn degree_of_parallelism(&self) -> usize {
        self.degree_of_parallelism
    }

    /// Partition for `name`, reserving the next slot on first sight.
    pub fn assign(&self, name: &str) -> usize {
        // Lookup and insert must happen under one lock: the slot is the
        // number of names seen so far.
        let mut partitions = self.partitions.lock();
        if let Some(&partition) = partitions.get(name) {
            return partition;
        }
        let partition = partitions.len() % self.degree_of_parallelism;
        partitions.insert(name.to_string(), partition);
        partition
    }

    /// Number of slots reserved so far
    #[cfg(test)]
    pub fn assigned_count(&self) -> usize {
        self.partitions.lock().len()
    }

    /// Snapshot of all assignments in first-seen order
    #[cfg(test)]
    pub fn assignments(&self) -> Vec<(String, usize)> {
        self.partitions
            .lock()
            .iter()
            .map(|(name, partition)| (name.clone(), *partition))
            .collect()
    }
}
