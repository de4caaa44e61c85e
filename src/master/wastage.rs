// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::patch::PatchLog;

/// Estimate of how much of the patch log is dead weight
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Wastage {
    /// Patches whose effect is superseded or cancelled
    pub wasted: u64,

    /// Distinct keys across all patches
    pub distinct_keys: u64,

    /// Patches inspected
    pub total_patches: u64,
}

impl Wastage {
    /// Returns `round(100 * wasted / distinct_keys)`.
    ///
    /// Returns 0 if there are no keys. The result can exceed 100 when
    /// keys are rewritten many times.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn percent(&self) -> u64 {
        if self.distinct_keys == 0 {
            return 0;
        }

        (100.0 * self.wasted as f64 / self.distinct_keys as f64).round() as u64
    }
}

/// Counts, per key, how many of its patches are wasted.
///
/// A key seen once is live. A key seen an even amount of times is
/// assumed to end up cancelled, so all of its patches are wasted.
/// A key seen an odd amount of times (more than once) keeps only its
/// last patch.
pub fn estimate<'a, I: IntoIterator<Item = &'a PatchLog>>(logs: I) -> Wastage {
    let mut occurrences = ahash::AHashMap::<&str, u64>::default();
    let mut total_patches = 0;

    for log in logs {
        for patch in log {
            *occurrences.entry(patch.key()).or_default() += 1;
            total_patches += 1;
        }
    }

    let wasted = occurrences
        .values()
        .map(|&n| match n {
            0 | 1 => 0,
            n if n % 2 == 0 => n,
            n => n - 1,
        })
        .sum();

    Wastage {
        wasted,
        distinct_keys: occurrences.len() as u64,
        total_patches,
    }
}
