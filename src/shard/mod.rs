// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod reader;

use crate::{
    artifact::Artifact,
    checksum::Checksum,
    id::ShardNumber,
    patch::PatchLog,
    path::{join_remote, timestamped_name},
    storage::Storage,
    Codec, Error, Patch, Validator,
};
use std::path::{Path, PathBuf};

/// Default size after which a shard stops accepting patches
pub const DEFAULT_SHARD_SIZE_BYTES: u64 = 2_048_000;

/// A shard is an append-only, size-bounded log of patches.
///
/// Locally it is a plaintext CSV staging file plus its compressed copy.
/// Remotely only the compressed copy is stored, under a new name
/// every time the shard is published.
#[derive(Debug)]
pub struct Shard {
    number: ShardNumber,
    codec: Codec,
    dir: PathBuf,

    relative_path: String,
    remote_path: String,

    zipped_checksum: Option<Checksum>,
    unzipped_checksum: Option<Checksum>,

    /// Entry count recorded in the master document
    recorded_count: Option<usize>,

    changed: bool,
    deleted: bool,

    patches: PatchLog,
    loaded: bool,

    artifact: Option<Artifact>,
}

impl Shard {
    /// Creates a new, never published shard.
    pub(crate) fn new(number: ShardNumber, codec: Codec, dir: &Path) -> Self {
        Self {
            number,
            codec,
            dir: dir.into(),
            relative_path: String::new(),
            remote_path: String::new(),
            zipped_checksum: None,
            unzipped_checksum: None,
            recorded_count: None,
            changed: false,
            deleted: false,
            patches: PatchLog::default(),
            loaded: true,
            artifact: None,
        }
    }

    /// Creates a shard from a master document descriptor row.
    ///
    /// Its content is not available before it is downloaded or verified locally.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_descriptor(
        number: ShardNumber,
        codec: Codec,
        dir: &Path,
        remote_dir: &str,
        relative_path: String,
        zipped_checksum: Option<Checksum>,
        unzipped_checksum: Option<Checksum>,
        recorded_count: usize,
    ) -> Self {
        Self {
            remote_path: join_remote(remote_dir, &relative_path),
            relative_path,
            zipped_checksum,
            unzipped_checksum,
            recorded_count: Some(recorded_count),
            loaded: false,
            ..Self::new(number, codec, dir)
        }
    }

    /// Returns the shard number.
    #[must_use]
    pub fn number(&self) -> ShardNumber {
        self.number
    }

    /// Returns the codec of the compressed artifact.
    #[must_use]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns the patches, in log order.
    #[must_use]
    pub fn patches(&self) -> &PatchLog {
        &self.patches
    }

    /// Object name relative to the remote directory, empty if never published.
    #[must_use]
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Full remote object name, empty if never published.
    #[must_use]
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Checksum of the compressed artifact at last hashing.
    #[must_use]
    pub fn zipped_checksum(&self) -> Option<Checksum> {
        self.zipped_checksum
    }

    /// Checksum of the staging log at last hashing.
    #[must_use]
    pub fn unzipped_checksum(&self) -> Option<Checksum> {
        self.unzipped_checksum
    }

    /// Returns `true` if patches were appended since the last publish.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Returns `true` if the shard was marked as deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns `true` if the shard content is verified and usable.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Marks the shard as deleted.
    ///
    /// A deleted shard is skipped by replay and is left out of the next publish.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Local file name of the staging log.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.number)
    }

    /// Local file name of the compressed artifact.
    #[must_use]
    pub fn zipped_file_name(&self) -> String {
        format!("{}.csv.{}", self.number, self.codec)
    }

    /// Local paths of the staging log and compressed artifact.
    pub(crate) fn local_paths(&self) -> [PathBuf; 2] {
        [
            self.dir.join(self.file_name()),
            self.dir.join(self.zipped_file_name()),
        ]
    }

    pub(crate) fn recorded_count(&self) -> Option<usize> {
        self.recorded_count
    }

    /// Path used in error messages.
    fn display_path(&self) -> String {
        if self.remote_path.is_empty() {
            self.file_name()
        } else {
            self.remote_path.clone()
        }
    }

    fn artifact(&mut self) -> crate::Result<&mut Artifact> {
        let path = self.display_path();
        self.artifact.as_mut().ok_or(Error::NotLoaded(path))
    }

    /// Opens the local staging and compressed files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn init(&mut self) -> crate::Result<()> {
        if self.artifact.is_none() {
            let [staging, compressed] = self.local_paths();

            // Leftovers of an unpublished shard with the same number are not ours
            self.artifact = Some(if self.remote_path.is_empty() {
                Artifact::create(staging, compressed)?
            } else {
                Artifact::open(staging, compressed)?
            });
        }
        Ok(())
    }

    /// Releases the local files.
    pub fn close(&mut self) {
        self.artifact = None;
    }

    /// Fetches the compressed artifact, verifies it, inflates it and loads the patches.
    ///
    /// A missing remote object is treated as empty, which then fails
    /// verification unless the recorded checksum is that of no bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O, storage, integrity or validation failure.
    pub fn download(
        &mut self,
        storage: &dyn Storage,
        bucket: &str,
        validator: &dyn Validator,
    ) -> crate::Result<()> {
        let remote_path = self.remote_path.clone();
        let codec = self.codec;
        let expected = self.zipped_checksum;

        let artifact = self.artifact()?;
        artifact.fetch(storage, bucket, &remote_path)?;
        artifact.inflate_verified(codec, expected, &remote_path)?;

        self.verify_staging(validator)
    }

    /// Checks the staging log against the recorded checksum, validates
    /// every row and loads the patches in file order.
    ///
    /// On failure the previously loaded patches are kept.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O, integrity or validation failure.
    pub fn verify_staging(&mut self, validator: &dyn Validator) -> crate::Result<()> {
        let path = self.display_path();
        let expected = self.unzipped_checksum;
        let number = self.number;

        let artifact = self.artifact()?;
        artifact.verify_staging(expected, &path)?;

        log::debug!("Verifying shard {number}");
        let rows = artifact.staging_rows()?;
        self.patches = reader::parse_rows(rows, validator, number, &path)?;
        self.loaded = true;

        Ok(())
    }

    /// Appends a patch to the end of the staging log.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn add_patch(&mut self, patch: Patch) -> crate::Result<()> {
        if !self.loaded {
            return Err(Error::NotLoaded(self.display_path()));
        }

        self.artifact()?.append_row(&patch.to_row())?;

        self.changed = true;
        self.patches.push(patch);

        Ok(())
    }

    /// Returns `true` if the staging log exceeds `threshold` bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn is_full(&mut self, threshold: u64) -> crate::Result<bool> {
        Ok(self.artifact()?.staging_len()? > threshold)
    }

    /// Regenerates the compressed artifact from the current staging log.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn compress(&mut self) -> crate::Result<()> {
        let codec = self.codec;
        self.artifact()?.compress(codec)
    }

    /// Decodes the freshly compressed artifact and runs every row
    /// through the validator again.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the artifact does not decode to valid rows
    /// or the row count does not match the patch log.
    pub fn verify_compressed(&mut self, validator: &dyn Validator) -> crate::Result<()> {
        let codec = self.codec;
        let number = self.number;
        let expected = self.patches.len();
        let path = self.display_path();

        log::debug!("Verifying compressed shard {number}");

        let rows = self.artifact()?.compressed_rows(codec)?;
        reader::validate_rows(&rows, validator, number)?;

        if rows.len() != expected {
            return Err(Error::MalformedRow {
                path,
                reason: format!(
                    "compressed artifact has {} rows, expected {expected}",
                    rows.len()
                ),
            });
        }

        Ok(())
    }

    /// Recomputes both checksums from the files on disk.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn hash(&mut self) -> crate::Result<()> {
        let artifact = self.artifact()?;
        let unzipped = artifact.staging_checksum()?;
        let zipped = artifact.compressed_checksum()?;

        self.unzipped_checksum = Some(unzipped);
        self.zipped_checksum = Some(zipped);

        Ok(())
    }

    /// Points the shard at a new remote name derived from the publish timestamp.
    pub(crate) fn relocate(&mut self, remote_dir: &str, unix: i64) {
        self.relative_path = timestamped_name(unix, &self.zipped_file_name());
        self.remote_path = join_remote(remote_dir, &self.relative_path);
    }

    /// Uploads the compressed artifact to the current remote path.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O or storage failure.
    pub fn upload(&mut self, storage: &dyn Storage, bucket: &str, public: bool) -> crate::Result<()> {
        let remote_path = self.remote_path.clone();
        self.artifact()?
            .upload(storage, bucket, &remote_path, public)?;

        self.changed = false;

        Ok(())
    }
}
