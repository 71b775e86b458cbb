use ethereum_types::{BigEndianHash, H256, U256};

use crate::constants::MAX_SLOT;

/// Inclusive range of hashed storage keys, i.e. `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub start: H256,
    pub end: H256,
}

/// Splits the keyspace into `count` partitions and returns partition `index`.
///
/// The maximum key is divided by `count` and scaled by `index`; the last partition absorbs
/// the remainder by ending at the maximum key. Adjacent ranges share their boundary key, so a
/// key sitting exactly on a boundary is visited by two workers and must be deduplicated
/// downstream.
///
/// # Panics
///
/// Panics if `count` is zero or `index >= count`.
pub fn partition_keyspace(index: usize, count: usize) -> KeyRange {
    assert!(count > 0, "partition count must be greater than 0");
    assert!(
        index < count,
        "partition index {index} must be less than count {count}"
    );

    let max = MAX_SLOT.into_uint();
    let part_size = max / U256::from(count);

    let start = part_size * U256::from(index);
    let end = if index < count - 1 {
        part_size * U256::from(index + 1)
    } else {
        max
    };

    KeyRange {
        start: H256::from_uint(&start),
        end: H256::from_uint(&end),
    }
}

/// Splits the keyspace into `count` partitions, in key order.
///
/// # Panics
///
/// Panics if `count` is zero.
pub fn split_keyspace(count: usize) -> Vec<KeyRange> {
    assert!(count > 0, "partition count must be greater than 0");
    (0..count)
        .map(|index| partition_keyspace(index, count))
        .collect()
}
