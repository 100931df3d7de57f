//! Offset commit bookkeeping for acknowledged deliveries.

use std::collections::BTreeMap;

use crate::consumer::messages::MessageOffset;

/// Decides which acknowledged offsets may be committed.
///
/// Once a delivery fails, no offset at or past the failed one is committed on
/// its partition, so the consumer group resumes at the failed message.
#[derive(Debug, Default)]
pub struct CommitGate {
    /// Lowest failed offset per (topic, partition).
    failed: BTreeMap<(String, i32), i64>,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an acknowledgment and return the offsets that may be committed.
    pub fn acknowledge(&mut self, offsets: &[MessageOffset], success: bool) -> Vec<MessageOffset> {
        if !success {
            self.reject(offsets);
            return Vec::new();
        }

        offsets
            .iter()
            .filter(|(topic, partition, offset)| {
                self.failed
                    .get(&(topic.clone(), *partition))
                    .map_or(true, |failed| offset < failed)
            })
            .cloned()
            .collect()
    }

    /// Record offsets that must be read again.
    pub fn reject(&mut self, offsets: &[MessageOffset]) {
        for (topic, partition, offset) in offsets {
            self.failed
                .entry((topic.clone(), *partition))
                .and_modify(|failed| *failed = (*failed).min(*offset))
                .or_insert(*offset);
        }
    }

    /// Whether any delivery failed.
    pub fn is_blocked(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Lowest failed position of every blocked partition.
    pub fn failed_positions(&self) -> Vec<MessageOffset> {
        self.failed
            .iter()
            .map(|((topic, partition), offset)| (topic.clone(), *partition, *offset))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(partition: i32, offset: i64) -> MessageOffset {
        ("entity.changes".to_string(), partition, offset)
    }

    #[test]
    fn test_successful_deliveries_are_committed() {
        let mut gate = CommitGate::new();

        assert_eq!(gate.acknowledge(&[at(0, 5), at(1, 2)], true), vec![at(0, 5), at(1, 2)]);
        assert!(!gate.is_blocked());
    }

    #[test]
    fn test_nothing_past_a_failure_is_committed() {
        let mut gate = CommitGate::new();

        assert!(gate.acknowledge(&[at(0, 5)], false).is_empty());
        assert!(gate.acknowledge(&[at(0, 6)], true).is_empty());
        assert_eq!(gate.failed_positions(), vec![at(0, 5)]);
    }

    #[test]
    fn test_other_partitions_keep_committing() {
        let mut gate = CommitGate::new();
        gate.acknowledge(&[at(0, 5)], false);

        assert_eq!(gate.acknowledge(&[at(0, 4), at(0, 7), at(1, 9)], true), vec![at(0, 4), at(1, 9)]);
    }

    #[test]
    fn test_lowest_failed_offset_is_kept() {
        let mut gate = CommitGate::new();
        gate.reject(&[at(0, 8)]);
        gate.reject(&[at(0, 3)]);
        gate.reject(&[at(0, 6)]);

        assert_eq!(gate.failed_positions(), vec![at(0, 3)]);
        assert!(gate.acknowledge(&[at(0, 3)], true).is_empty());
    }
}
