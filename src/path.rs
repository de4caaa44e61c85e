// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub const MASTER_FILE_NAME: &str = "master.csv";
pub const CATEGORIES_STEM: &str = "categories";

/// Joins a remote directory and an object name with `/`.
///
/// An empty directory means the bucket root.
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');

    if dir.is_empty() {
        name.into()
    } else {
        format!("{dir}/{name}")
    }
}

/// Object name a mutated artifact is published under.
pub fn timestamped_name(unix: i64, local_name: &str) -> String {
    format!("{unix}-{local_name}")
}

/// Listing prefix covering everything below a remote directory.
pub fn remote_prefix(dir: &str) -> String {
    let dir = dir.trim_end_matches('/');

    if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    }
}
