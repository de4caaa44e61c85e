// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    path::MASTER_FILE_NAME, shard::DEFAULT_SHARD_SIZE_BYTES, storage::Storage,
    validation::AcceptAll, CategoryItem, Codec, Validator,
};
use std::{path::PathBuf, sync::Arc};

/// Patch store configuration
#[derive(Clone)]
pub struct Config {
    /// Storage backend
    pub(crate) storage: Arc<dyn Storage>,

    /// Bucket all objects live in
    pub(crate) storage_bucket: String,

    /// Remote directory inside the bucket
    pub(crate) remote_dir: String,

    /// Local working directory
    pub(crate) dir: PathBuf,

    /// File name of the master document, locally and remotely
    pub(crate) file_name: String,

    /// Whether uploaded objects are made publicly readable
    pub(crate) public: bool,

    /// Size after which the newest shard stops accepting patches
    pub(crate) shard_size_bytes: u64,

    /// Minimum age of an unreferenced remote object before it is deleted
    pub(crate) orphan_grace: chrono::Duration,

    /// Compression to use for new artifacts
    pub(crate) codec: Codec,

    /// Row validator
    pub(crate) validator: Arc<dyn Validator>,

    /// Items of the categories snapshot
    pub(crate) category_items: Vec<Arc<dyn CategoryItem>>,

    /// Base URL public objects are served from
    #[cfg(feature = "http")]
    pub(crate) public_base_url: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("storage_bucket", &self.storage_bucket)
            .field("remote_dir", &self.remote_dir)
            .field("dir", &self.dir)
            .field("file_name", &self.file_name)
            .field("public", &self.public)
            .field("shard_size_bytes", &self.shard_size_bytes)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates a new configuration builder.
    pub fn new<B: Into<String>, P: Into<PathBuf>>(
        storage: Arc<dyn Storage>,
        storage_bucket: B,
        dir: P,
    ) -> Self {
        Self {
            storage,
            storage_bucket: storage_bucket.into(),
            remote_dir: String::new(),
            dir: dir.into(),
            file_name: MASTER_FILE_NAME.into(),
            public: false,
            shard_size_bytes: DEFAULT_SHARD_SIZE_BYTES,
            orphan_grace: chrono::Duration::hours(24),
            codec: Codec::default(),
            validator: Arc::new(AcceptAll),
            category_items: Vec::new(),

            #[cfg(feature = "http")]
            public_base_url: "https://storage.googleapis.com".into(),
        }
    }

    /// Sets the remote directory objects are stored under.
    ///
    /// Default = bucket root
    #[must_use]
    pub fn remote_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.remote_dir = dir.into();
        self
    }

    /// Sets the master document file name.
    ///
    /// Default = `master.csv`
    #[must_use]
    pub fn file_name<S: Into<String>>(mut self, name: S) -> Self {
        self.file_name = name.into();
        self
    }

    /// Makes every uploaded object publicly readable.
    ///
    /// With the `http` feature, the master document is then also
    /// fetched over its public URL.
    #[must_use]
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Sets the size after which a shard is retired.
    ///
    /// The check happens before appending, so a shard may grow
    /// slightly past this size.
    ///
    /// Default = 2,048,000 bytes
    #[must_use]
    pub fn shard_size_bytes(mut self, bytes: u64) -> Self {
        self.shard_size_bytes = bytes;
        self
    }

    /// Sets how old an unreferenced remote object must be before
    /// the remote sweep deletes it.
    ///
    /// Default = 24 hours
    #[must_use]
    pub fn orphan_grace(mut self, grace: chrono::Duration) -> Self {
        self.orphan_grace = grace;
        self
    }

    /// Sets the compression used for newly published artifacts.
    #[must_use]
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the row validator.
    #[must_use]
    pub fn validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Sets the categories snapshot items.
    #[must_use]
    pub fn category_items(mut self, items: Vec<Arc<dyn CategoryItem>>) -> Self {
        self.category_items = items;
        self
    }

    /// Sets the base URL the public master document is fetched from.
    ///
    /// Default = `https://storage.googleapis.com`
    #[cfg(feature = "http")]
    #[must_use]
    pub fn public_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.public_base_url = url.into();
        self
    }
}
