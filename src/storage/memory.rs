// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{ObjectMeta, ObjectWriter, Storage, StorageError};
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    io::{Cursor, Read, Write},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

#[derive(Clone, Debug)]
struct StoredObject {
    bytes: Arc<[u8]>,
    created_at: DateTime<Utc>,
    public: bool,
}

type ObjectKey = (String, String);

#[derive(Default)]
struct Inner {
    objects: RwLock<BTreeMap<ObjectKey, StoredObject>>,
    uploads: AtomicU64,
}

/// In-memory object storage
///
/// Clones share the same objects.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Default)]
pub struct MemoryStorage(Arc<Inner>);

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryStorage<uploads: {}>", self.uploads())
    }
}

fn key(bucket: &str, name: &str) -> ObjectKey {
    (bucket.into(), name.into())
}

impl MemoryStorage {
    /// Stores an object with an explicit creation time.
    pub fn insert_at(&self, bucket: &str, name: &str, bytes: &[u8], created_at: DateTime<Utc>) {
        self.0.objects.write().expect("lock is poisoned").insert(
            key(bucket, name),
            StoredObject {
                bytes: bytes.into(),
                created_at,
                public: false,
            },
        );
    }

    /// Returns the raw bytes of an object.
    #[must_use]
    pub fn get(&self, bucket: &str, name: &str) -> Option<Arc<[u8]>> {
        self.0
            .objects
            .read()
            .expect("lock is poisoned")
            .get(&key(bucket, name))
            .map(|x| x.bytes.clone())
    }

    /// Returns `true` if the object exists.
    #[must_use]
    pub fn contains(&self, bucket: &str, name: &str) -> bool {
        self.get(bucket, name).is_some()
    }

    /// Returns `true` if the object was marked public.
    #[must_use]
    pub fn is_public(&self, bucket: &str, name: &str) -> bool {
        self.0
            .objects
            .read()
            .expect("lock is poisoned")
            .get(&key(bucket, name))
            .is_some_and(|x| x.public)
    }

    /// Lists all object names in a bucket, sorted.
    #[must_use]
    pub fn names(&self, bucket: &str) -> Vec<String> {
        self.0
            .objects
            .read()
            .expect("lock is poisoned")
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Flips all bits of one byte of an object.
    ///
    /// Returns `false` if the object or offset does not exist.
    pub fn corrupt(&self, bucket: &str, name: &str, offset: usize) -> bool {
        let mut lock = self.0.objects.write().expect("lock is poisoned");

        let Some(object) = lock.get_mut(&key(bucket, name)) else {
            return false;
        };

        let mut bytes = object.bytes.to_vec();
        let Some(byte) = bytes.get_mut(offset) else {
            return false;
        };
        *byte = !*byte;
        object.bytes = bytes.into();

        true
    }

    /// Returns the amount of committed uploads.
    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.0.uploads.load(Ordering::Acquire)
    }

    fn lookup(&self, bucket: &str, name: &str) -> Result<Arc<[u8]>, StorageError> {
        self.get(bucket, name)
            .ok_or_else(|| StorageError::NotFound(name.into()))
    }
}

struct MemoryWriter<'a> {
    storage: &'a MemoryStorage,
    key: ObjectKey,
    buf: Vec<u8>,
}

impl Write for MemoryWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ObjectWriter for MemoryWriter<'_> {
    fn finish(self: Box<Self>) -> Result<(), StorageError> {
        let Self { storage, key, buf } = *self;

        storage.0.objects.write().expect("lock is poisoned").insert(
            key,
            StoredObject {
                bytes: buf.into(),
                created_at: Utc::now(),
                public: false,
            },
        );
        storage.0.uploads.fetch_add(1, Ordering::AcqRel);

        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn download_into(
        &self,
        bucket: &str,
        name: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, StorageError> {
        let bytes = self.lookup(bucket, name)?;
        writer.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    fn upload_writer<'a>(
        &'a self,
        bucket: &str,
        name: &str,
    ) -> Result<Box<dyn ObjectWriter + 'a>, StorageError> {
        Ok(Box::new(MemoryWriter {
            storage: self,
            key: key(bucket, name),
            buf: Vec::new(),
        }))
    }

    fn make_public(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        let mut lock = self.0.objects.write().expect("lock is poisoned");

        let object = lock
            .get_mut(&key(bucket, name))
            .ok_or_else(|| StorageError::NotFound(name.into()))?;
        object.public = true;

        Ok(())
    }

    fn download_reader<'a>(
        &'a self,
        bucket: &str,
        name: &str,
    ) -> Result<Box<dyn Read + 'a>, StorageError> {
        let bytes = self.lookup(bucket, name)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        Ok(self
            .0
            .objects
            .read()
            .expect("lock is poisoned")
            .iter()
            .filter(|((b, name), _)| b == bucket && name.starts_with(prefix))
            .map(|((_, name), object)| ObjectMeta {
                name: name.clone(),
                created_at: object.created_at,
            })
            .collect())
    }

    fn delete(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        self.0
            .objects
            .write()
            .expect("lock is poisoned")
            .remove(&key(bucket, name))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.into()))
    }
}
