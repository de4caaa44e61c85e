// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod memory;

use chrono::{DateTime, Utc};
use std::io::{Read, Write};

/// Error returned by a [`Storage`] backend
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum StorageError {
    /// Object does not exist
    ///
    /// This is benign when fetching an artifact for the first time.
    NotFound(String),

    /// I/O error while streaming object content
    Io(std::io::Error),

    /// Any other backend failure
    Backend(String),
}

impl StorageError {
    /// Returns `true` if the object did not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "object doesn't exist: {name}"),
            Self::Io(e) => write!(f, "storage I/O error: {e}"),
            Self::Backend(msg) => write!(f, "storage backend error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Listing entry of a remote object
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectMeta {
    /// Full object name, including the remote directory
    pub name: String,

    /// Creation time of the object
    pub created_at: DateTime<Utc>,
}

/// Streaming upload handle
///
/// Content written is only committed by [`ObjectWriter::finish`].
pub trait ObjectWriter: Write {
    /// Commits the upload.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the backend refuses the object.
    fn finish(self: Box<Self>) -> Result<(), StorageError>;
}

/// Object storage backend
///
/// All calls block the caller. Deadlines and retries belong to the
/// implementation.
pub trait Storage: Send + Sync {
    /// Streams an object into `writer`, returning the amount of bytes written.
    ///
    /// # Errors
    ///
    /// Will return [`StorageError::NotFound`] if the object does not exist.
    fn download_into(
        &self,
        bucket: &str,
        name: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, StorageError>;

    /// Opens an upload to `name`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the upload cannot be started.
    fn upload_writer<'a>(
        &'a self,
        bucket: &str,
        name: &str,
    ) -> Result<Box<dyn ObjectWriter + 'a>, StorageError>;

    /// Marks an object as publicly readable.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the object does not exist or the ACL cannot be changed.
    fn make_public(&self, bucket: &str, name: &str) -> Result<(), StorageError>;

    /// Opens a reader over an object.
    ///
    /// # Errors
    ///
    /// Will return [`StorageError::NotFound`] if the object does not exist.
    fn download_reader<'a>(
        &'a self,
        bucket: &str,
        name: &str,
    ) -> Result<Box<dyn Read + 'a>, StorageError>;

    /// Lists all objects whose name starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the listing fails.
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError>;

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the object cannot be deleted.
    fn delete(&self, bucket: &str, name: &str) -> Result<(), StorageError>;
}
