// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{checksum::Checksum, storage::StorageError};

/// Which half of an artifact pair failed verification
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArtifactForm {
    /// The compressed bytes, as stored remotely
    Compressed,

    /// The plaintext staging bytes
    Staging,
}

/// Represents errors that can occur in the patch store
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Storage backend error (anything but a benign "not found")
    Storage(StorageError),

    /// CSV encoding or decoding failed
    Csv(csv::Error),

    /// Decompression failed
    Decompress(String),

    /// Checksum check failed
    ChecksumMismatch {
        /// Remote path of the artifact
        path: String,

        /// Which bytes were checked
        form: ArtifactForm,

        /// Checksum recorded in the master document
        expected: Option<Checksum>,

        /// Checksum of the bytes on disk
        actual: Checksum,
    },

    /// A row did not have the expected shape
    MalformedRow {
        /// Artifact the row came from
        path: String,

        /// What was wrong with it
        reason: String,
    },

    /// The row validator refused a row
    Rejected {
        /// Shard number of the offending row
        shard: u64,

        /// Reason given by the validator
        reason: String,
    },

    /// A patch could not be built from the given parts
    InvalidPatch(String),

    /// Shard or categories files are not open, or their content was never verified
    NotLoaded(String),

    /// Invalid master document format version
    InvalidVersion(String),

    /// Descriptor names a codec this build cannot decode
    UnknownCodec(String),

    /// Public master fetch failed
    #[cfg(feature = "http")]
    Http(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PatchStoreError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Returns `true` if the error is an integrity failure.
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<StorageError> for Error {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<csv::Error> for Error {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

/// Patch store result
pub type Result<T> = std::result::Result<T, Error>;
