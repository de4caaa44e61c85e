// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod cleanup;
mod descriptor;
pub mod replay;
pub mod wastage;

use crate::{
    artifact::{read_rows, write_rows},
    file::rewrite_atomic,
    id::{next_shard_number, ShardNumber},
    path::join_remote,
    storage::StorageError,
    version::Version,
    Categories, Config, Error, Patch, Shard,
};
use chrono::{DateTime, Utc};
use descriptor::{Descriptor, Header, Line, Target};
use path_absolutize::Absolutize;
use replay::CompiledList;
use std::{io::Write, path::PathBuf};
use wastage::Wastage;

/// Format of the human readable publish timestamp
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The master document indexes every live shard and the categories
/// snapshot of a store, together with their checksums.
///
/// It is republished, under a fixed name, after every write cycle.
/// Everything it references is immutable, so a reader holding an older
/// master can still fetch all of its artifacts.
///
/// A master assumes it is the only writer of its store.
pub struct Master {
    config: Config,

    /// Local copy of the master document
    path: PathBuf,

    /// Header of the last parsed or published document
    header: Option<Header>,

    /// Shards, in master document order
    shards: Vec<Shard>,

    categories: Option<Categories>,
}

impl std::fmt::Debug for Master {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Master<{}, {} shards>",
            self.remote_path(),
            self.shards.len()
        )
    }
}

impl Master {
    /// Creates a master working in the configured local directory.
    ///
    /// Nothing is fetched until [`Master::download`] is called.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the local directory cannot be created.
    pub fn new(mut config: Config) -> crate::Result<Self> {
        std::fs::create_dir_all(&config.dir)?;
        config.dir = config.dir.absolutize()?.into_owned();

        let path = config.dir.join(&config.file_name);
        log::debug!("Initializing master: {}", path.display());

        Ok(Self {
            config,
            path,
            header: None,
            shards: Vec::new(),
            categories: None,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Local path of the master document.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Remote object name of the master document.
    #[must_use]
    pub fn remote_path(&self) -> String {
        join_remote(&self.config.remote_dir, &self.config.file_name)
    }

    /// Format version of the last parsed or published document.
    #[must_use]
    pub fn version(&self) -> Option<Version> {
        self.header.as_ref().map(|x| x.version)
    }

    /// Unix timestamp of the last parsed or published document.
    #[must_use]
    pub fn published_at_unix(&self) -> Option<i64> {
        self.header.as_ref().map(|x| x.unix)
    }

    /// Human readable timestamp of the last parsed or published document.
    #[must_use]
    pub fn published_at(&self) -> Option<&str> {
        self.header.as_ref().map(|x| x.formatted.as_str())
    }

    /// Returns the shards, in master document order.
    #[must_use]
    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Returns the categories snapshot, if any.
    #[must_use]
    pub fn categories(&self) -> Option<&Categories> {
        self.categories.as_ref()
    }

    /// Marks a shard as deleted.
    ///
    /// Returns `false` if there is no shard with that number.
    pub fn mark_deleted(&mut self, number: ShardNumber) -> bool {
        self.shards
            .iter_mut()
            .find(|shard| shard.number() == number)
            .map(Shard::mark_deleted)
            .is_some()
    }

    fn live_shards(&self) -> impl Iterator<Item = &Shard> {
        self.shards.iter().filter(|shard| !shard.is_deleted())
    }

    fn ensure_loaded<'a, I: IntoIterator<Item = &'a Shard>>(shards: I) -> crate::Result<()> {
        match shards.into_iter().find(|shard| !shard.is_loaded()) {
            Some(shard) => Err(Error::NotLoaded(format!("shard {}", shard.number()))),
            None => Ok(()),
        }
    }

    /// Fetches the master document and parses it.
    ///
    /// A missing document means nothing was published yet, and leaves
    /// the master empty. The categories snapshot is downloaded and
    /// verified immediately, shards only get their descriptors parsed.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O, storage, format or categories integrity failure.
    pub fn download(&mut self) -> crate::Result<()> {
        self.download_document()
            .inspect_err(|e| log::error!("Downloading master failed: {e}"))
    }

    fn download_document(&mut self) -> crate::Result<()> {
        let bytes = self.fetch_document()?.unwrap_or_default();
        rewrite_atomic(&self.path, &bytes)?;

        self.parse(&bytes)
    }

    fn fetch_document(&self) -> crate::Result<Option<Vec<u8>>> {
        #[cfg(feature = "http")]
        {
            if self.config.public {
                return self.fetch_public_document();
            }
        }

        let remote_path = self.remote_path();
        log::debug!("Downloading master from: {remote_path}");

        let mut bytes = Vec::new();
        match self.config.storage.download_into(
            &self.config.storage_bucket,
            &remote_path,
            &mut bytes,
        ) {
            Ok(_) => Ok(Some(bytes)),
            Err(StorageError::NotFound(_)) => {
                log::info!("No master at {remote_path}, starting empty");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(feature = "http")]
    fn fetch_public_document(&self) -> crate::Result<Option<Vec<u8>>> {
        let url = format!(
            "{}/{}/{}?{}",
            self.config.public_base_url.trim_end_matches('/'),
            self.config.storage_bucket,
            self.remote_path(),
            Utc::now().timestamp(),
        );
        log::debug!("Downloading master from: {url}");

        let response = reqwest::blocking::get(&url)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            log::info!("No master at {url}, starting empty");
            return Ok(None);
        }

        let bytes = response.error_for_status()?.bytes()?;
        Ok(Some(bytes.to_vec()))
    }

    fn parse(&mut self, bytes: &[u8]) -> crate::Result<()> {
        self.header = None;
        self.shards.clear();
        self.categories = None;

        let remote_path = self.remote_path();
        let storage = self.config.storage.as_ref();
        let bucket = &self.config.storage_bucket;

        for row in read_rows(bytes)? {
            match descriptor::parse_line(&row, &remote_path)? {
                None => {}
                Some(Line::Header(header)) => {
                    log::debug!("Found remote master, datetime: {}", header.formatted);
                    self.header = Some(header);
                }
                Some(Line::Descriptor(descriptor)) => match descriptor.target {
                    Target::Categories => {
                        let mut categories = Categories::from_descriptor(
                            descriptor.codec,
                            &self.config.dir,
                            &self.config.remote_dir,
                            descriptor.relative_path,
                            descriptor.zipped,
                            descriptor.unzipped,
                            self.config.category_items.clone(),
                        );
                        categories.init()?;
                        categories.download(storage, bucket)?;
                        self.categories = Some(categories);
                    }
                    Target::Shard(number) => {
                        if self.shards.iter().any(|shard| shard.number() == number) {
                            return Err(Error::MalformedRow {
                                path: remote_path,
                                reason: format!("shard {number} is listed twice"),
                            });
                        }

                        let shard = Shard::from_descriptor(
                            number,
                            descriptor.codec,
                            &self.config.dir,
                            &self.config.remote_dir,
                            descriptor.relative_path,
                            descriptor.zipped,
                            descriptor.unzipped,
                            descriptor.count,
                        );
                        log::debug!(
                            "Found a remote shard ({number}): {bucket}/{}. Zipped: {}. Unzipped: {}",
                            shard.remote_path(),
                            crate::Checksum::to_column(shard.zipped_checksum()),
                            crate::Checksum::to_column(shard.unzipped_checksum()),
                        );
                        self.shards.push(shard);
                    }
                },
            }
        }

        Ok(())
    }

    /// Makes the content of every parsed shard available locally.
    ///
    /// A local copy that matches the recorded checksum is used as is,
    /// anything else is downloaded and verified.
    ///
    /// # Errors
    ///
    /// Will return `Err` if any shard fails to download or verify.
    pub fn download_shards(&mut self) -> crate::Result<()> {
        self.download_all_shards()
            .inspect_err(|e| log::error!("Downloading shards failed: {e}"))
    }

    fn download_all_shards(&mut self) -> crate::Result<()> {
        log::debug!("Downloading shards");

        let storage = self.config.storage.as_ref();
        let bucket = &self.config.storage_bucket;
        let validator = self.config.validator.as_ref();

        for shard in &mut self.shards {
            shard.init()?;

            match shard.verify_staging(validator) {
                Ok(()) => log::debug!("Shard {} verified from local copy", shard.number()),
                Err(e) => {
                    log::debug!("Local copy of shard {} is unusable: {e}", shard.number());
                    shard.download(storage, bucket, validator)?;
                }
            }

            if let Some(count) = shard.recorded_count() {
                if count != shard.patches().len() {
                    log::warn!(
                        "Shard {} has {} patches, master recorded {count}",
                        shard.number(),
                        shard.patches().len(),
                    );
                }
            }
        }

        Ok(())
    }

    /// Replays every live shard, in master order, into the logical mapping.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a live shard was never loaded.
    pub fn compile_list(&self) -> crate::Result<CompiledList> {
        log::debug!("Compiling shard list");

        Self::ensure_loaded(self.live_shards())?;

        let (list, total) = replay::replay(self.live_shards().map(Shard::patches));
        log::info!(
            "Total patches: {total}, total compiled length: {}",
            list.len()
        );

        Ok(list)
    }

    /// Estimates how much of the live shards is superseded.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a live shard was never loaded.
    pub fn calculate_wastage(&self) -> crate::Result<Wastage> {
        log::debug!("Calculating wastage");

        Self::ensure_loaded(self.live_shards())?;

        let wastage = wastage::estimate(self.live_shards().map(Shard::patches));
        log::debug!(
            "{} items wasted {}%",
            wastage.wasted,
            wastage.percent()
        );

        Ok(wastage)
    }

    fn latest_shard_mut(&mut self) -> Option<&mut Shard> {
        self.shards.iter_mut().max_by_key(|shard| shard.number())
    }

    /// Appends a patch to the newest shard.
    ///
    /// If there is no shard yet, or the newest one is full or deleted,
    /// a new shard numbered one above the current maximum is opened first.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or if the newest shard was never loaded.
    pub fn add_patch(&mut self, patch: Patch) -> crate::Result<()> {
        self.append(patch)
            .inspect_err(|e| log::error!("Adding patch failed: {e}"))
    }

    fn append(&mut self, patch: Patch) -> crate::Result<()> {
        let threshold = self.config.shard_size_bytes;

        let is_open = match self.latest_shard_mut() {
            Some(shard) if !shard.is_deleted() => !shard.is_full(threshold)?,
            _ => false,
        };

        if !is_open {
            let number = next_shard_number(self.shards.iter().map(Shard::number));
            log::debug!("Opening shard {number}");

            // Only a shard holding at least one patch joins the master
            let mut shard = Shard::new(number, self.config.codec, &self.config.dir);
            shard.init()?;
            shard.add_patch(patch)?;
            self.shards.push(shard);

            return Ok(());
        }

        match self.latest_shard_mut() {
            Some(shard) => shard.add_patch(patch),
            None => Err(Error::NotLoaded("no open shard".into())),
        }
    }

    /// Creates the categories snapshot if none was downloaded.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn init_categories(&mut self) -> crate::Result<()> {
        if self.categories.is_none() {
            let mut categories = Categories::new(
                self.config.codec,
                &self.config.dir,
                self.config.category_items.clone(),
            );
            categories.init()?;
            self.categories = Some(categories);
        }

        Ok(())
    }

    /// Publishes all changes and the master document.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O, storage or verification failure.
    pub fn upload_to_storage_bucket(&mut self) -> crate::Result<()> {
        self.publish_at(Utc::now())
    }

    /// Publishes all changes and the master document, stamped with `now`.
    ///
    /// Every changed artifact is compressed, checked, hashed and uploaded
    /// under a new name carrying the publish timestamp. Unchanged
    /// artifacts keep their name. The master document is uploaded last,
    /// so until then the previous one stays valid.
    ///
    /// The publish timestamp is always greater than the previous one.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O, storage or verification failure.
    pub fn publish_at(&mut self, now: DateTime<Utc>) -> crate::Result<()> {
        self.publish(now)
            .inspect_err(|e| log::error!("Publishing failed: {e}"))
    }

    fn publish(&mut self, now: DateTime<Utc>) -> crate::Result<()> {
        log::debug!("Uploading to storage bucket");

        let unix = match &self.header {
            Some(header) if header.unix >= now.timestamp() => header.unix + 1,
            _ => now.timestamp(),
        };
        let formatted = DateTime::<Utc>::from_timestamp(unix, 0)
            .unwrap_or(now)
            .format(DATE_TIME_FORMAT)
            .to_string();

        let header = Header {
            version: Version::V1,
            unix,
            formatted,
        };

        let storage = self.config.storage.as_ref();
        let bucket = &self.config.storage_bucket;
        let remote_dir = &self.config.remote_dir;
        let public = self.config.public;
        let validator = self.config.validator.as_ref();

        let mut rows = vec![header.to_row()];

        if let Some(categories) = &mut self.categories {
            categories.write()?;

            if categories.is_changed()? {
                log::debug!("Categories have changed, compressing and hashing");

                categories.compress()?;
                categories.verify_compressed()?;
                categories.hash()?;
                categories.relocate(remote_dir, unix);
                categories.upload(storage, bucket, public)?;
            }

            rows.push(
                Descriptor {
                    target: Target::Categories,
                    relative_path: categories.relative_path().into(),
                    codec: categories.codec(),
                    zipped: categories.zipped_checksum(),
                    unzipped: categories.unzipped_checksum(),
                    count: categories.items().len(),
                }
                .to_row(),
            );
        }

        for shard in self.shards.iter_mut().filter(|shard| !shard.is_deleted()) {
            if !shard.is_changed() && shard.zipped_checksum().is_none() {
                log::debug!("Skipping never written shard {}", shard.number());
                continue;
            }

            if shard.is_changed() {
                log::debug!(
                    "Shard has changed, compressing and hashing: {}",
                    shard.file_name()
                );

                shard.compress()?;
                shard.verify_compressed(validator)?;
                shard.hash()?;
                shard.relocate(remote_dir, unix);
                shard.upload(storage, bucket, public)?;
            }

            rows.push(
                Descriptor {
                    target: Target::Shard(shard.number()),
                    relative_path: shard.relative_path().into(),
                    codec: shard.codec(),
                    zipped: shard.zipped_checksum(),
                    unzipped: shard.unzipped_checksum(),
                    count: shard.patches().len(),
                }
                .to_row(),
            );
        }

        let mut document = Vec::new();
        write_rows(&mut document, &rows)?;
        rewrite_atomic(&self.path, &document)?;

        let remote_path = join_remote(remote_dir, &self.config.file_name);
        log::info!("Uploading: {remote_path}");

        let mut writer = storage.upload_writer(bucket, &remote_path)?;
        writer.write_all(&document)?;
        writer.finish()?;

        if public {
            storage.make_public(bucket, &remote_path)?;
        }

        self.header = Some(header);

        Ok(())
    }

    /// Releases the local files of every shard and the categories snapshot.
    pub fn close(&mut self) {
        for shard in &mut self.shards {
            shard.close();
        }

        if let Some(categories) = &mut self.categories {
            categories.close();
        }
    }
}
