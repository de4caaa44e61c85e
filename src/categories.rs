// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    artifact::{Artifact, Row},
    checksum::Checksum,
    path::{join_remote, timestamped_name, CATEGORIES_STEM},
    storage::Storage,
    Codec, Error,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Amount of columns of a categories row
const COLUMNS: usize = 4;

/// A classification item
///
/// Only `id`, `category`, `subcategory` and `description` are persisted.
pub trait CategoryItem: Send + Sync {
    /// Numeric ID
    fn id(&self) -> i64;

    /// Top level category name
    fn category(&self) -> &str;

    /// Second level category name
    fn subcategory(&self) -> &str;

    /// External identifier
    fn identifier(&self) -> &str;

    /// Human readable description
    fn description(&self) -> &str;

    /// Top level category code
    fn tlc(&self) -> &str;

    /// Second level category code
    fn slc(&self) -> &str;
}

/// Plain [`CategoryItem`]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub struct Category {
    pub id: i64,
    pub category: String,
    pub subcategory: String,
    pub identifier: String,
    pub description: String,
    pub tlc: String,
    pub slc: String,
}

impl CategoryItem for Category {
    fn id(&self) -> i64 {
        self.id
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn subcategory(&self) -> &str {
        &self.subcategory
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn tlc(&self) -> &str {
        &self.tlc
    }

    fn slc(&self) -> &str {
        &self.slc
    }
}

fn to_row(item: &dyn CategoryItem) -> [String; COLUMNS] {
    [
        item.id().to_string(),
        item.category().into(),
        item.subcategory().into(),
        item.description().into(),
    ]
}

/// Classification snapshot stored next to the shards
///
/// Unlike a shard, the snapshot is rewritten from the configured items
/// on every publish and is only uploaded when its content changed.
pub struct Categories {
    codec: Codec,
    dir: PathBuf,

    relative_path: String,
    remote_path: String,

    zipped_checksum: Option<Checksum>,
    unzipped_checksum: Option<Checksum>,

    items: Vec<Arc<dyn CategoryItem>>,
    rows: Vec<Row>,

    /// Hashed but not yet uploaded
    pending_upload: bool,

    artifact: Option<Artifact>,
}

impl std::fmt::Debug for Categories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Categories<{:?}, {} items>",
            self.remote_path,
            self.items.len()
        )
    }
}

impl Categories {
    /// Creates a never published snapshot.
    pub(crate) fn new(codec: Codec, dir: &Path, items: Vec<Arc<dyn CategoryItem>>) -> Self {
        Self {
            codec,
            dir: dir.into(),
            relative_path: String::new(),
            remote_path: String::new(),
            zipped_checksum: None,
            unzipped_checksum: None,
            items,
            rows: Vec::new(),
            pending_upload: false,
            artifact: None,
        }
    }

    /// Creates a snapshot from a master document descriptor row.
    pub(crate) fn from_descriptor(
        codec: Codec,
        dir: &Path,
        remote_dir: &str,
        relative_path: String,
        zipped_checksum: Option<Checksum>,
        unzipped_checksum: Option<Checksum>,
        items: Vec<Arc<dyn CategoryItem>>,
    ) -> Self {
        Self {
            remote_path: join_remote(remote_dir, &relative_path),
            relative_path,
            zipped_checksum,
            unzipped_checksum,
            ..Self::new(codec, dir, items)
        }
    }

    /// Local file name of the snapshot.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{CATEGORIES_STEM}.csv")
    }

    /// Local file name of the compressed snapshot.
    #[must_use]
    pub fn zipped_file_name(&self) -> String {
        format!("{CATEGORIES_STEM}.csv.{}", self.codec)
    }

    pub(crate) fn local_paths(&self) -> [PathBuf; 2] {
        [
            self.dir.join(self.file_name()),
            self.dir.join(self.zipped_file_name()),
        ]
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

    /// Returns the codec of the compressed snapshot.
    #[must_use]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Checksum of the compressed snapshot at last hashing.
    #[must_use]
    pub fn zipped_checksum(&self) -> Option<Checksum> {
        self.zipped_checksum
    }

    /// Checksum of the snapshot at last hashing.
    #[must_use]
    pub fn unzipped_checksum(&self) -> Option<Checksum> {
        self.unzipped_checksum
    }

    /// Configured items.
    #[must_use]
    pub fn items(&self) -> &[Arc<dyn CategoryItem>] {
        &self.items
    }

    /// Rows of the last downloaded or written snapshot:
    /// `id, category, subcategory, description`.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn artifact(&mut self) -> crate::Result<&mut Artifact> {
        let path = self.file_name();
        self.artifact.as_mut().ok_or(Error::NotLoaded(path))
    }

    /// Creates the local files, discarding previous content.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn init(&mut self) -> crate::Result<()> {
        let [staging, compressed] = self.local_paths();
        self.artifact = Some(Artifact::create(staging, compressed)?);
        Ok(())
    }

    /// Releases the local files.
    pub fn close(&mut self) {
        self.artifact = None;
    }

    /// Fetches the compressed snapshot, verifies both checksums and
    /// checks every row has exactly four columns.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O, storage, integrity or format failure.
    pub fn download(&mut self, storage: &dyn Storage, bucket: &str) -> crate::Result<()> {
        let remote_path = self.remote_path.clone();
        let codec = self.codec;
        let zipped = self.zipped_checksum;
        let unzipped = self.unzipped_checksum;

        let artifact = self.artifact()?;
        artifact.fetch(storage, bucket, &remote_path)?;
        artifact.inflate_verified(codec, zipped, &remote_path)?;
        artifact.verify_staging(unzipped, &remote_path)?;

        log::debug!("Verifying categories");
        let rows = artifact.staging_rows()?;
        check_columns(&rows, &remote_path)?;

        self.rows = rows;

        Ok(())
    }

    /// Rewrites the snapshot from the configured items, in configured order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn write(&mut self) -> crate::Result<()> {
        let rows = self
            .items
            .iter()
            .map(|item| to_row(item.as_ref()))
            .collect::<Vec<_>>();

        self.artifact()?.rewrite_staging(&rows)?;
        self.rows = rows.into_iter().map(Vec::from).collect();

        Ok(())
    }

    /// Returns `true` if the snapshot differs from the one last hashed,
    /// or if the last hashed snapshot never made it to storage.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn is_changed(&mut self) -> crate::Result<bool> {
        if self.pending_upload {
            return Ok(true);
        }

        let computed = self.artifact()?.staging_checksum()?;
        Ok(Some(computed) != self.unzipped_checksum)
    }

    /// Regenerates the compressed snapshot.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn compress(&mut self) -> crate::Result<()> {
        let codec = self.codec;
        self.artifact()?.compress(codec)
    }

    /// Decodes the freshly compressed snapshot and checks its shape.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the snapshot does not decode to the written rows.
    pub fn verify_compressed(&mut self) -> crate::Result<()> {
        let codec = self.codec;
        let path = self.file_name();

        let rows = self.artifact()?.compressed_rows(codec)?;
        check_columns(&rows, &path)?;

        if rows != self.rows {
            return Err(Error::MalformedRow {
                path,
                reason: "compressed snapshot does not match written rows".into(),
            });
        }

        Ok(())
    }

    /// Recomputes both checksums.
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
        self.pending_upload = true;

        Ok(())
    }

    pub(crate) fn relocate(&mut self, remote_dir: &str, unix: i64) {
        self.relative_path = timestamped_name(unix, &self.zipped_file_name());
        self.remote_path = join_remote(remote_dir, &self.relative_path);
    }

    /// Uploads the compressed snapshot to the current remote path.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O or storage failure.
    pub fn upload(&mut self, storage: &dyn Storage, bucket: &str, public: bool) -> crate::Result<()> {
        let remote_path = self.remote_path.clone();
        self.artifact()?
            .upload(storage, bucket, &remote_path, public)?;

        self.pending_upload = false;

        Ok(())
    }
}

fn check_columns(rows: &[Row], path: &str) -> crate::Result<()> {
    if let Some(row) = rows.iter().find(|row| row.len() != COLUMNS) {
        return Err(Error::MalformedRow {
            path: path.into(),
            reason: format!("categories row has {} columns, expected {COLUMNS}", row.len()),
        });
    }

    Ok(())
}
