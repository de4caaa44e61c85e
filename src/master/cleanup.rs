// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::Master;
use crate::{path::remote_prefix, Shard};
use chrono::{DateTime, Utc};
use std::{collections::HashSet, path::PathBuf};

impl Master {
    fn referenced_remote_paths(&self) -> HashSet<String> {
        let mut referenced = HashSet::new();
        referenced.insert(self.remote_path());

        if let Some(categories) = &self.categories {
            referenced.insert(categories.remote_path().to_owned());
        }

        for shard in &self.shards {
            referenced.insert(shard.remote_path().to_owned());
        }

        referenced.remove("");
        referenced
    }

    fn referenced_local_paths(&self) -> HashSet<PathBuf> {
        let mut referenced = HashSet::new();
        referenced.insert(self.path.clone());

        if let Some(categories) = &self.categories {
            referenced.extend(categories.local_paths());
        }

        referenced.extend(self.shards.iter().flat_map(Shard::local_paths));
        referenced
    }

    /// Deletes remote objects the master does not reference.
    ///
    /// See [`Master::cleanup_remote_at`].
    ///
    /// # Errors
    ///
    /// Will return `Err` if listing or deleting fails.
    pub fn cleanup_remote(&self) -> crate::Result<Vec<String>> {
        self.cleanup_remote_at(Utc::now())
    }

    /// Deletes remote objects under the remote directory that the master
    /// does not reference and that were created before `now` minus the
    /// orphan grace period.
    ///
    /// The grace period keeps objects alive for readers still holding an
    /// older master. Returns the deleted object names.
    ///
    /// # Errors
    ///
    /// Will return `Err` if listing or deleting fails.
    pub fn cleanup_remote_at(&self, now: DateTime<Utc>) -> crate::Result<Vec<String>> {
        self.sweep_remote(now)
            .inspect_err(|e| log::error!("Remote cleanup failed: {e}"))
    }

    fn sweep_remote(&self, now: DateTime<Utc>) -> crate::Result<Vec<String>> {
        let storage = self.config.storage.as_ref();
        let bucket = &self.config.storage_bucket;

        let referenced = self.referenced_remote_paths();
        let cutoff = now - self.config.orphan_grace;

        let prefix = remote_prefix(&self.config.remote_dir);
        log::debug!("Cleaning up remote objects under {bucket}/{prefix}");

        let mut deleted = Vec::new();

        for object in storage.list(bucket, &prefix)? {
            if referenced.contains(&object.name) {
                continue;
            }

            if object.created_at >= cutoff {
                log::trace!("Keeping recent unreferenced object: {}", object.name);
                continue;
            }

            log::debug!("Deleting unreferenced object: {}", object.name);
            storage.delete(bucket, &object.name)?;
            deleted.push(object.name);
        }

        log::info!("Deleted {} remote objects", deleted.len());

        Ok(deleted)
    }

    /// Deletes regular files in the local directory that the master
    /// does not reference.
    ///
    /// Failing to delete a file is logged and skipped.
    /// Returns the deleted paths.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the local directory cannot be listed.
    pub fn cleanup_local(&self) -> crate::Result<Vec<PathBuf>> {
        self.sweep_local()
            .inspect_err(|e| log::error!("Local cleanup failed: {e}"))
    }

    fn sweep_local(&self) -> crate::Result<Vec<PathBuf>> {
        let referenced = self.referenced_local_paths();
        log::debug!("Cleaning up local files in {}", self.config.dir.display());

        let mut deleted = Vec::new();

        for entry in std::fs::read_dir(&self.config.dir)? {
            let entry = entry?;

            if !entry.file_type()?.is_file() {
                continue;
            }

            let path = entry.path();

            if referenced.contains(&path) {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    log::debug!("Deleted unreferenced file: {}", path.display());
                    deleted.push(path);
                }
                Err(e) => {
                    log::warn!("Failed to delete {}: {e}", path.display());
                }
            }
        }

        Ok(deleted)
    }
}
