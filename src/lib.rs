//! Versioned, append-only key-value patch store on top of object storage.
//!
//! The store does not hold key-value pairs directly. Instead it holds an
//! ordered log of patches:
//!
//! - `+` sets a key to a list of values
//! - `-` deletes a key
//! - `*` clears everything before it
//!
//! Replaying all patches in order yields the current mapping.
//!
//! The log is split into size-bounded shards. Each shard is staged locally as
//! a plaintext CSV file, and published as a compressed, checksummed object.
//! A small master document indexes all shards (and an optional categories
//! snapshot) together with their checksums:
//!
//! ```text
//! V1,1700000000,2023-11-14 22:13:20
//! -1,1700000000-categories.csv.zlib,zlib,<zipped>,<unzipped>,12
//! 1,1699990000-1.csv.zlib,zlib,<zipped>,<unzipped>,48211
//! 2,1700000000-2.csv.zlib,zlib,<zipped>,<unzipped>,310
//! ```
//!
//! Published objects are never overwritten: every publish of a changed shard
//! gets a new name carrying the publish timestamp. Only the master document
//! lives under a fixed name, and it is uploaded last. Readers holding an older
//! master can therefore still resolve everything it references, until the
//! remote cleanup deletes unreferenced objects after a grace period.
//!
//! Every byte that is read back, from a local copy or from storage, is checked
//! against the checksum recorded in the master document. Mismatches are errors,
//! never silently tolerated.
//!
//! Checksums are XXH3-128 digests written as 32 lowercase hex characters.
//! They have the width of MD5 digests but not their values: a store whose
//! master document records MD5 checksums fails verification and has to be
//! republished by this crate first.
//!
//! There is no concurrency control: a master assumes it is the only writer.

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![deny(clippy::unwrap_used, clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]

mod artifact;
mod categories;
mod checksum;
mod compression;
mod config;
mod error;
mod file;
mod id;
mod master;
mod patch;
mod path;
mod shard;
mod storage;
mod validation;
mod version;

pub use {
    categories::{Categories, Category, CategoryItem},
    checksum::Checksum,
    compression::Codec,
    config::Config,
    error::{ArtifactForm, Error, Result},
    id::ShardNumber,
    master::{replay::CompiledList, wastage::Wastage, Master, DATE_TIME_FORMAT},
    patch::{Action, Patch, PatchLog},
    shard::{Shard, DEFAULT_SHARD_SIZE_BYTES},
    storage::{memory::MemoryStorage, ObjectMeta, ObjectWriter, Storage, StorageError},
    validation::{AcceptAll, Validator},
    version::Version,
};
