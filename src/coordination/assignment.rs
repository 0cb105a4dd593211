//! Deterministic partition assignment
//!
//! Slices an ordered partition space across the sorted member list. Every
//! member computes the same answer from the same inputs, so no partition
//! map has to be agreed on through the backend.

use std::collections::HashMap;
use tracing::debug;

/// Contiguous-slice partition assigner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssigner {
    /// The full ordered partition space
    partitions: Vec<u32>,
}

impl PartitionAssigner {
    /// Create an assigner over `partitions`
    pub fn new(partitions: Vec<u32>) -> Self {
        Self { partitions }
    }

    /// Assigner over `0..count`
    pub fn with_count(count: u32) -> Self {
        Self::new((0..count).collect())
    }

    pub fn partitions(&self) -> &[u32] {
        &self.partitions
    }

    /// Compute the assignment of every member.
    ///
    /// Members are sorted first; each gets `ceil(len / n)` partitions in
    /// order, so the last members may get fewer (or none).
    pub fn assign<S: AsRef<str>>(&self, members: &[S]) -> HashMap<String, Vec<u32>> {
        let sorted = sorted_members(members);
        let assignments: HashMap<String, Vec<u32>> = sorted
            .iter()
            .enumerate()
            .map(|(index, member)| (member.to_string(), self.slice(index, sorted.len()).to_vec()))
            .collect();

        debug!(
            "Assigned {} partitions to {} members",
            self.partitions.len(),
            sorted.len()
        );

        assignments
    }

    /// Partitions owned by `member`; empty if it is not in `members`.
    pub fn partitions_for<S: AsRef<str>>(&self, member: &str, members: &[S]) -> Vec<u32> {
        let sorted = sorted_members(members);
        match sorted.iter().position(|m| *m == member) {
            Some(index) => self.slice(index, sorted.len()).to_vec(),
            None => Vec::new(),
        }
    }

    /// Member owning `partition`, if it is part of the space
    pub fn owner_of<'a, S: AsRef<str>>(&self, partition: u32, members: &'a [S]) -> Option<&'a str> {
        if members.is_empty() {
            return None;
        }
        let position = self.partitions.iter().position(|&p| p == partition)?;
        let sorted = sorted_members(members);
        let size = slice_size(self.partitions.len(), sorted.len());
        sorted.get(position / size).copied()
    }

    fn slice(&self, index: usize, member_count: usize) -> &[u32] {
        let size = slice_size(self.partitions.len(), member_count);
        let len = self.partitions.len();
        let start = (index * size).min(len);
        let end = ((index + 1) * size).min(len);
        &self.partitions[start..end]
    }
}

fn slice_size(partition_count: usize, member_count: usize) -> usize {
    partition_count.div_ceil(member_count.max(1)).max(1)
}

fn sorted_members<S: AsRef<str>>(members: &[S]) -> Vec<&str> {
    let mut sorted: Vec<&str> = members.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}
