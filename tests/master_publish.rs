mod common;

use chrono::Utc;
use common::{at, config, remote, values, BUCKET};
use patch_store::{Checksum, Master, MemoryStorage, Patch};
use std::sync::Arc;
use test_log::test;

#[test]
fn publish_master_document_format() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let mut master = Master::new(config(&storage, dir.path()))?;
    master.download()?;
    master.add_patch(Patch::set("a", ["1"]))?;
    master.add_patch(Patch::delete("a"))?;
    master.publish_at(at(1_700_000_000))?;

    let document = storage
        .get(BUCKET, &remote("master.csv"))
        .expect("master should exist");
    let document = std::str::from_utf8(&document).expect("should be utf-8");

    let lines = document.lines().collect::<Vec<_>>();
    assert_eq!(2, lines.len());
    assert_eq!("V1,1700000000,2023-11-14 22:13:20", lines[0]);

    let columns = lines[1].split(',').collect::<Vec<_>>();
    assert_eq!(6, columns.len());
    assert_eq!("1", columns[0]);
    assert_eq!("1700000000-1.csv.zlib", columns[1]);
    assert_eq!("zlib", columns[2]);
    assert_eq!(Checksum::HEX_LEN, columns[3].len());
    assert_eq!(Checksum::HEX_LEN, columns[4].len());
    assert_eq!("2", columns[5]);

    let shard = master.shards().first().expect("should have shard");
    assert_eq!(
        Some(columns[4]),
        shard.unzipped_checksum().map(|x| x.to_string()).as_deref()
    );

    // Local copy matches the remote one
    assert_eq!(document, std::fs::read_to_string(master.path())?);

    Ok(())
}

#[test]
fn publish_without_shards() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let mut master = Master::new(config(&storage, dir.path()))?;
    master.download()?;
    master.publish_at(at(1_700_000_000))?;

    assert_eq!(vec![remote("master.csv")], storage.names(BUCKET));

    let reader_dir = tempfile::tempdir()?;
    let mut reader = Master::new(config(&storage, reader_dir.path()))?;
    reader.download()?;
    assert_eq!(Some(1_700_000_000), reader.published_at_unix());
    assert!(reader.shards().is_empty());

    Ok(())
}

#[test]
fn publish_never_overwrites() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let mut master = Master::new(config(&storage, dir.path()))?;
    master.download()?;

    master.add_patch(Patch::set("a", ["1"]))?;
    master.publish_at(at(1_700_000_000))?;

    let old_document = storage
        .get(BUCKET, &remote("master.csv"))
        .expect("master should exist");
    let old_shard = master.shards()[0].remote_path().to_owned();

    master.add_patch(Patch::set("b", ["2"]))?;
    master.publish_at(at(1_700_000_100))?;

    let new_shard = master.shards()[0].remote_path().to_owned();
    assert_ne!(old_shard, new_shard);
    assert_eq!(remote("1700000100-1.csv.zlib"), new_shard);
    assert!(storage.contains(BUCKET, &old_shard));
    assert!(storage.contains(BUCKET, &new_shard));

    // A reader holding the old master still resolves everything it references
    let snapshot = MemoryStorage::default();
    for name in storage.names(BUCKET) {
        let bytes = storage.get(BUCKET, &name).expect("should exist");
        snapshot.insert_at(BUCKET, &name, &bytes, Utc::now());
    }
    snapshot.insert_at(BUCKET, &remote("master.csv"), &old_document, Utc::now());

    let reader_dir = tempfile::tempdir()?;
    let mut reader = Master::new(config(&snapshot, reader_dir.path()))?;
    reader.download()?;
    reader.download_shards()?;

    let list = reader.compile_list()?;
    assert_eq!(1, list.len());
    assert_eq!(Some(vec!["1"]), values(&list, "a"));

    Ok(())
}

#[test]
fn publish_timestamp_strictly_increases() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let mut master = Master::new(config(&storage, dir.path()))?;
    master.download()?;

    master.add_patch(Patch::set("a", ["1"]))?;
    master.publish_at(at(1_700_000_000))?;
    assert_eq!(Some(1_700_000_000), master.published_at_unix());

    master.add_patch(Patch::set("a", ["2"]))?;
    master.publish_at(at(1_700_000_000))?;
    assert_eq!(Some(1_700_000_001), master.published_at_unix());
    assert_eq!(Some("2023-11-14 22:13:21"), master.published_at());

    // Clock went backwards
    master.publish_at(at(1_600_000_000))?;
    assert_eq!(Some(1_700_000_002), master.published_at_unix());

    assert_eq!(
        remote("1700000001-1.csv.zlib"),
        master.shards()[0].remote_path()
    );

    Ok(())
}

#[test]
fn publish_timestamp_continues_after_reload() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    {
        let mut master = Master::new(config(&storage, dir.path()))?;
        master.download()?;
        master.add_patch(Patch::set("a", ["1"]))?;
        master.publish_at(at(1_700_000_000))?;
    }

    let mut master = Master::new(config(&storage, dir.path()))?;
    master.download()?;
    master.download_shards()?;
    master.add_patch(Patch::set("a", ["2"]))?;
    master.publish_at(at(1_700_000_000))?;

    assert_eq!(Some(1_700_000_001), master.published_at_unix());
    assert!(storage.contains(BUCKET, &remote("1700000000-1.csv.zlib")));
    assert!(storage.contains(BUCKET, &remote("1700000001-1.csv.zlib")));

    Ok(())
}

#[test]
fn publish_skips_unchanged_shards() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let mut master = Master::new(config(&storage, dir.path()).shard_size_bytes(5))?;
    master.download()?;

    master.add_patch(Patch::set("a", ["1"]))?;
    master.add_patch(Patch::set("b", ["2"]))?;
    master.publish_at(at(1_700_000_000))?;

    // Two shards and the master
    assert_eq!(3, storage.uploads());

    master.publish_at(at(1_700_000_100))?;
    assert_eq!(4, storage.uploads());

    master.add_patch(Patch::set("c", ["3"]))?;
    master.publish_at(at(1_700_000_200))?;

    // Only the new shard and the master
    assert_eq!(6, storage.uploads());

    let names = master
        .shards()
        .iter()
        .map(|shard| shard.relative_path().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(
        vec![
            "1700000000-1.csv.zlib",
            "1700000000-2.csv.zlib",
            "1700000200-3.csv.zlib",
        ],
        names
    );

    Ok(())
}

#[test]
fn publish_public_objects() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let mut master = Master::new(config(&storage, dir.path()).public(true))?;
    master.add_patch(Patch::set("a", ["1"]))?;
    master.publish_at(at(1_700_000_000))?;

    assert!(storage.is_public(BUCKET, &remote("master.csv")));
    assert!(storage.is_public(BUCKET, &remote("1700000000-1.csv.zlib")));

    Ok(())
}

#[test]
fn publish_private_objects() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let mut master = Master::new(config(&storage, dir.path()))?;
    master.add_patch(Patch::set("a", ["1"]))?;
    master.publish_at(at(1_700_000_000))?;

    assert!(!storage.is_public(BUCKET, &remote("master.csv")));
    assert!(!storage.is_public(BUCKET, &remote("1700000000-1.csv.zlib")));

    Ok(())
}

#[test]
fn publish_to_bucket_root() -> patch_store::Result<()> {
    let storage = MemoryStorage::default();
    let dir = tempfile::tempdir()?;

    let config = patch_store::Config::new(Arc::new(storage.clone()), BUCKET, dir.path())
        .file_name("index.csv");

    let mut master = Master::new(config)?;
    master.download()?;
    master.add_patch(Patch::set("a", ["1"]))?;
    master.upload_to_storage_bucket()?;

    let unix = master.published_at_unix().expect("should be published");
    assert_eq!(
        vec![format!("{unix}-1.csv.zlib"), "index.csv".to_owned()],
        storage.names(BUCKET)
    );
    assert!(dir.path().join("index.csv").try_exists()?);

    Ok(())
}
