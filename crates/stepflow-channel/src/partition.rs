//! Key-to-partition mapping and partition ownership.

/// Partition of `key` in a topic with `partitions` partitions.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    crc32fast::hash(key.as_bytes()) % partitions.max(1)
}

/// Which partitions one member of a consumer group reads.
///
/// Member `i` of `n` owns every partition `p` with `p % n == i`, so members
/// of the same group never share a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionAssignment {
    pub member_index: u32,
    pub member_count: u32,
}

impl PartitionAssignment {
    pub fn new(member_index: u32, member_count: u32) -> Self {
        Self {
            member_index,
            member_count: member_count.max(1),
        }
    }

    /// The only member of its group.
    pub fn sole() -> Self {
        Self::new(0, 1)
    }

    pub fn owns(&self, partition: u32) -> bool {
        partition % self.member_count == self.member_index
    }

    /// Owned partitions out of `0..partitions`.
    pub fn partitions(&self, partitions: u32) -> Vec<u32> {
        (0..partitions).filter(|p| self.owns(*p)).collect()
    }
}

impl Default for PartitionAssignment {
    fn default() -> Self {
        Self::sole()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_is_stable_per_key() {
        let first = partition_for("exec-42", 8);
        for _ in 0..10 {
            assert_eq!(partition_for("exec-42", 8), first);
        }
        assert!(first < 8);
    }

    #[test]
    fn test_single_partition() {
        assert_eq!(partition_for("anything", 1), 0);
        assert_eq!(partition_for("anything", 0), 0);
    }

    #[test]
    fn test_keys_spread_across_partitions() {
        let used: std::collections::HashSet<u32> =
            (0..200).map(|i| partition_for(&format!("exec-{i}"), 4)).collect();
        assert_eq!(used.len(), 4);
    }

    #[test]
    fn test_sole_member_owns_everything() {
        assert_eq!(PartitionAssignment::sole().partitions(4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_members_are_disjoint_and_complete() {
        let members: Vec<Vec<u32>> = (0..3)
            .map(|i| PartitionAssignment::new(i, 3).partitions(8))
            .collect();
        assert_eq!(members[0], vec![0, 3, 6]);
        assert_eq!(members[1], vec![1, 4, 7]);
        assert_eq!(members[2], vec![2, 5]);

        let mut all: Vec<u32> = members.concat();
        all.sort_unstable();
        assert_eq!(all, (0..8).collect::<Vec<_>>());
    }
}
