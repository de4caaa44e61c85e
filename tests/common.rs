// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use chrono::{DateTime, Utc};
use patch_store::{CompiledList, Config, MemoryStorage};
use std::{path::Path, sync::Arc};

pub const BUCKET: &str = "lists";
pub const REMOTE_DIR: &str = "patches";

/// Config for a master working in `dir` on top of `storage`
pub fn config(storage: &MemoryStorage, dir: &Path) -> Config {
    Config::new(Arc::new(storage.clone()), BUCKET, dir).remote_dir(REMOTE_DIR)
}

/// Fixed publish clock
#[allow(unused)]
pub fn at(unix: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix, 0).expect("should be valid timestamp")
}

#[allow(unused)]
pub fn values<'a>(list: &'a CompiledList, key: &str) -> Option<Vec<&'a str>> {
    list.get(key)
        .map(|values| values.iter().map(String::as_str).collect())
}

#[allow(unused)]
pub fn remote(name: &str) -> String {
    format!("{REMOTE_DIR}/{name}")
}
