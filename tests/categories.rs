mod common;

use common::{at, config, remote, values, BUCKET, REMOTE_DIR};
use patch_store::{
    Category, CategoryItem, Config, Error, Master, MemoryStorage, ObjectMeta, ObjectWriter,
    Patch, Storage, StorageError,
};
use std::{
    io::{Read, Write},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use test_log::test;

/// Refuses the first `failures` uploads of objects whose name contains `needle`
struct FailingUploads {
    inner: MemoryStorage,
    needle: &'static str,
    failures: AtomicUsize,
}

impl Storage for FailingUploads {
    fn download_into(
        &self,
        bucket: &str,
        name: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, StorageError> {
        self.inner.download_into(bucket, name, writer)
    }

    fn upload_writer<'a>(
        &'a self,
        bucket: &str,
        name: &str,
    ) -> Result<Box<dyn ObjectWriter + 'a>, StorageError> {
        if name.contains(self.needle)
            && self
                .failures
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StorageError::Backend(format!("refusing upload of {name}")));
        }

        self.inner.upload_writer(bucket, name)
    }

    fn make_public(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        self.inner.make_public(bucket, name)
    }

    fn download_reader<'a>(
        &'a self,
        bucket: &str,
        name: &str,
    ) -> Result<Box<dyn Read + 'a>, StorageError> {
        self.inner.download_reader(bucket, name)
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        self.inner.list(bucket, prefix)
    }

    fn delete(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        self.inner.delete(bucket, name)
    }
}

fn items(descriptions: &[&str]) -> Vec<Arc<dyn CategoryItem>> {
    descriptions
        .iter()
        .enumerate()
        .map(|(idx, description)| {
            Arc::new(Category {
                id: idx as i64 + 1,
                category: "Fruit".into(),
                subcategory: format!("Sub {idx}"),
                identifier: format!("fruit-{idx}"),
                description: (*description).into(),
                tlc: "FR".into(),
                slc: "SUB".into(),
            }) as Arc<dyn CategoryItem>
        })
        .collect()
}

#[test]
fn categories_round_trip() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();

    let writer_dir = tempfile::tempdir()?;
    let mut writer = Master::new(
        config(&storage, writer_dir.path()).category_items(items(&["Green, red", "Pear"])),
    )?;
    writer.download()?;
    writer.init_categories()?;
    writer.add_patch(Patch::set("a", ["1"]))?;
    writer.publish_at(at(1_700_000_000))?;

    assert!(storage.contains(BUCKET, &remote("1700000000-categories.csv.zlib")));
    assert_eq!(
        "1,Fruit,Sub 0,\"Green, red\"\n2,Fruit,Sub 1,Pear\n",
        std::fs::read_to_string(writer_dir.path().join("categories.csv"))?
    );

    let document = storage
        .get(BUCKET, &remote("master.csv"))
        .expect("master should exist");
    let document = String::from_utf8(document.to_vec()).expect("should be utf-8");
    let lines = document.lines().collect::<Vec<_>>();
    assert!(lines[1].starts_with("-1,1700000000-categories.csv.zlib,zlib,"));
    assert!(lines[1].ends_with(",2"));
    assert!(lines[2].starts_with("1,1700000000-1.csv.zlib,zlib,"));

    let reader_dir = tempfile::tempdir()?;
    let mut reader = Master::new(config(&storage, reader_dir.path()))?;
    reader.download()?;

    let categories = reader.categories().expect("should have categories");
    assert_eq!(
        vec![
            vec!["1", "Fruit", "Sub 0", "Green, red"],
            vec!["2", "Fruit", "Sub 1", "Pear"],
        ],
        categories.rows()
    );

    Ok(())
}

#[test]
fn categories_unchanged_are_not_reuploaded() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let mut master =
        Master::new(config(&storage, dir.path()).category_items(items(&["Apple"])))?;
    master.download()?;
    master.init_categories()?;
    master.publish_at(at(1_700_000_000))?;
    assert_eq!(2, storage.uploads());

    master.publish_at(at(1_700_000_100))?;
    assert_eq!(3, storage.uploads());

    let categories = master.categories().expect("should have categories");
    assert_eq!("1700000000-categories.csv.zlib", categories.relative_path());

    Ok(())
}

#[test]
fn categories_changed_are_republished() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();

    {
        let dir = tempfile::tempdir()?;
        let mut master =
            Master::new(config(&storage, dir.path()).category_items(items(&["Apple"])))?;
        master.download()?;
        master.init_categories()?;
        master.publish_at(at(1_700_000_000))?;
    }

    let dir = tempfile::tempdir()?;
    let mut master =
        Master::new(config(&storage, dir.path()).category_items(items(&["Apple", "Pear"])))?;
    master.download()?;

    // Downloaded snapshot still has the old content
    assert_eq!(
        1,
        master.categories().expect("should have categories").rows().len()
    );

    master.publish_at(at(1_700_000_100))?;

    let categories = master.categories().expect("should have categories");
    assert_eq!("1700000100-categories.csv.zlib", categories.relative_path());
    assert_eq!(2, categories.rows().len());
    assert!(storage.contains(BUCKET, &remote("1700000000-categories.csv.zlib")));
    assert!(storage.contains(BUCKET, &remote("1700000100-categories.csv.zlib")));

    Ok(())
}

#[test]
fn categories_corruption_fails_download() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();

    {
        let dir = tempfile::tempdir()?;
        let mut master =
            Master::new(config(&storage, dir.path()).category_items(items(&["Apple"])))?;
        master.download()?;
        master.init_categories()?;
        master.publish_at(at(1_700_000_000))?;
    }

    assert!(storage.corrupt(BUCKET, &remote("1700000000-categories.csv.zlib"), 2));

    let dir = tempfile::tempdir()?;
    let mut master = Master::new(config(&storage, dir.path()))?;

    let result = master.download();
    assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));

    Ok(())
}

#[test]
fn categories_are_optional() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let mut master = Master::new(config(&storage, dir.path()))?;
    master.download()?;
    master.add_patch(Patch::set("a", ["1"]))?;
    master.publish_at(at(1_700_000_000))?;

    assert!(master.categories().is_none());
    assert_eq!(2, storage.names(BUCKET).len());

    Ok(())
}

#[test]
fn categories_publish_retry_after_failed_upload() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let failing = FailingUploads {
        inner: storage.clone(),
        needle: "categories",
        failures: AtomicUsize::new(1),
    };

    let writer_dir = tempfile::tempdir()?;
    let writer_config = Config::new(Arc::new(failing), BUCKET, writer_dir.path())
        .remote_dir(REMOTE_DIR)
        .category_items(items(&["Apple"]));

    let mut writer = Master::new(writer_config)?;
    writer.download()?;
    writer.init_categories()?;
    writer.add_patch(Patch::set("a", ["1"]))?;

    assert!(matches!(
        writer.publish_at(at(1_700_000_000)),
        Err(Error::Storage(_))
    ));
    assert!(!storage.contains(BUCKET, &remote("master.csv")));

    writer.publish_at(at(1_700_000_100))?;

    let categories = writer.categories().expect("should have categories");
    assert_eq!("1700000100-categories.csv.zlib", categories.relative_path());
    assert!(storage.contains(BUCKET, categories.remote_path()));

    let reader_dir = tempfile::tempdir()?;
    let mut reader = Master::new(config(&storage, reader_dir.path()))?;
    reader.download()?;
    reader.download_shards()?;

    assert_eq!(
        1,
        reader.categories().expect("should have categories").rows().len()
    );
    assert_eq!(Some(vec!["1"]), values(&reader.compile_list()?, "a"));

    Ok(())
}
