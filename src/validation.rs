// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::id::ShardNumber;

/// Row validator trait
///
/// Every shard row passes through the validator when a shard is
/// loaded and again before a shard is published.
pub trait Validator: Send + Sync {
    /// Checks a raw shard row.
    ///
    /// # Errors
    ///
    /// Returns the reason if the row is not valid for the domain.
    fn validate(&self, row: &[String], shard: ShardNumber) -> Result<(), String>;
}

impl<F> Validator for F
where
    F: Fn(&[String], ShardNumber) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, row: &[String], shard: ShardNumber) -> Result<(), String> {
        self(row, shard)
    }
}

/// Validator that accepts every row
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _: &[String], _: ShardNumber) -> Result<(), String> {
        Ok(())
    }
}
