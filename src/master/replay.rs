// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{patch::PatchLog, Action};

/// Logical key → values mapping materialized by replay
pub type CompiledList = std::collections::HashMap<String, Vec<String>, ahash::RandomState>;

/// Replays patch logs, in the given order, into the logical mapping.
///
/// Returns the mapping and the amount of patches applied.
pub fn replay<'a, I: IntoIterator<Item = &'a PatchLog>>(logs: I) -> (CompiledList, usize) {
    let mut list = CompiledList::default();
    let mut total = 0;

    for log in logs {
        total += log.len();

        for patch in log {
            match patch.action() {
                Action::Set => {
                    list.insert(patch.key().into(), patch.values().to_vec());
                }
                Action::Delete => {
                    list.remove(patch.key());
                }
                Action::ClearAll => {
                    list.clear();
                }
            }
        }
    }

    (list, total)
}
