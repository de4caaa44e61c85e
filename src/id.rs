// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Shard number, assigned once and never reused
#[allow(clippy::module_name_repetitions)]
pub type ShardNumber = u64;

/// Shard number column value that marks the categories descriptor
pub const CATEGORIES_MARKER: i64 = -1;

/// Returns the number the next shard gets, given the existing ones.
///
/// Numbering starts at 1 and continues one above the current maximum.
pub fn next_shard_number<I: IntoIterator<Item = ShardNumber>>(existing: I) -> ShardNumber {
    existing.into_iter().max().unwrap_or(0) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn next_number_starts_at_one() {
        assert_eq!(1, next_shard_number([]));
    }

    #[test]
    fn next_number_follows_maximum() {
        assert_eq!(8, next_shard_number([3, 7, 1]));
    }
}
