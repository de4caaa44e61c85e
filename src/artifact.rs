// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    checksum::Checksum,
    error::ArtifactForm,
    storage::{Storage, StorageError},
    Codec, Error,
};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// A parsed CSV row
pub type Row = Vec<String>;

/// Parses CSV rows, allowing a varying amount of columns per row.
pub fn read_rows<R: Read>(reader: R) -> crate::Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    reader
        .records()
        .map(|record| {
            record
                .map(|record| record.iter().map(str::to_owned).collect())
                .map_err(Into::into)
        })
        .collect()
}

/// Writes CSV rows, allowing a varying amount of columns per row.
pub fn write_rows<W, I, R, S>(writer: W, rows: I) -> crate::Result<()>
where
    W: Write,
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    for row in rows {
        writer.write_record(row)?;
    }

    writer.flush()?;

    Ok(())
}

fn open_rw(path: &Path, truncate: bool) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(path)
}

fn truncate(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}

/// Local staging file and its compressed counterpart
///
/// Both files stay open for as long as the artifact lives and are
/// closed when it is dropped.
pub struct Artifact {
    staging_path: PathBuf,
    compressed_path: PathBuf,
    staging: File,
    compressed: File,
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Artifact<{}>", self.staging_path.display())
    }
}

impl Artifact {
    /// Opens (or creates) the file pair, keeping existing content.
    pub fn open(staging_path: PathBuf, compressed_path: PathBuf) -> std::io::Result<Self> {
        log::debug!(
            "Opening artifact files: staging: {}, compressed: {}",
            staging_path.display(),
            compressed_path.display(),
        );

        let staging = open_rw(&staging_path, false)?;
        let compressed = open_rw(&compressed_path, false)?;

        Ok(Self {
            staging_path,
            compressed_path,
            staging,
            compressed,
        })
    }

    /// Creates the file pair, discarding existing content.
    pub fn create(staging_path: PathBuf, compressed_path: PathBuf) -> std::io::Result<Self> {
        log::debug!(
            "Creating artifact files: staging: {}, compressed: {}",
            staging_path.display(),
            compressed_path.display(),
        );

        let staging = open_rw(&staging_path, true)?;
        let compressed = open_rw(&compressed_path, true)?;

        Ok(Self {
            staging_path,
            compressed_path,
            staging,
            compressed,
        })
    }

    /// Replaces the compressed file with the remote object.
    ///
    /// A missing object leaves the compressed file empty.
    pub fn fetch(
        &mut self,
        storage: &dyn Storage,
        bucket: &str,
        remote_path: &str,
    ) -> crate::Result<()> {
        log::debug!("Downloading artifact from {remote_path}");

        truncate(&mut self.compressed)?;

        match storage.download_into(bucket, remote_path, &mut self.compressed) {
            Ok(bytes) => {
                log::trace!("Downloaded {bytes} bytes from {remote_path}");
                Ok(())
            }
            Err(StorageError::NotFound(_)) => {
                log::debug!("{remote_path} does not exist yet");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Checks the compressed bytes against `expected`, then inflates
    /// them into the staging file.
    ///
    /// Nothing is written to the staging file if the checksum does not match.
    pub fn inflate_verified(
        &mut self,
        codec: Codec,
        expected: Option<Checksum>,
        remote_path: &str,
    ) -> crate::Result<()> {
        let actual = Checksum::of_reader(&mut self.compressed)?;

        if expected != Some(actual) {
            return Err(Error::ChecksumMismatch {
                path: remote_path.into(),
                form: ArtifactForm::Compressed,
                expected,
                actual,
            });
        }
        log::debug!("Compressed checksum of {remote_path} matched: {actual}");

        let bytes = codec.decompress(&self.read_compressed()?)?;

        truncate(&mut self.staging)?;
        self.staging.write_all(&bytes)?;

        Ok(())
    }

    /// Checks the staging bytes against `expected`.
    pub fn verify_staging(
        &mut self,
        expected: Option<Checksum>,
        remote_path: &str,
    ) -> crate::Result<()> {
        let actual = self.staging_checksum()?;

        if expected != Some(actual) {
            return Err(Error::ChecksumMismatch {
                path: remote_path.into(),
                form: ArtifactForm::Staging,
                expected,
                actual,
            });
        }
        log::debug!("Staging checksum of {remote_path} matched: {actual}");

        Ok(())
    }

    /// Parses all staging rows, in file order.
    pub fn staging_rows(&mut self) -> crate::Result<Vec<Row>> {
        self.staging.seek(SeekFrom::Start(0))?;
        read_rows(&mut self.staging)
    }

    /// Inflates the compressed file in memory and parses its rows.
    pub fn compressed_rows(&mut self, codec: Codec) -> crate::Result<Vec<Row>> {
        let bytes = codec.decompress(&self.read_compressed()?)?;
        read_rows(&*bytes)
    }

    /// Appends one row to the end of the staging file.
    pub fn append_row(&mut self, row: &[&str]) -> crate::Result<()> {
        self.staging.seek(SeekFrom::End(0))?;
        write_rows(&mut self.staging, [row])
    }

    /// Truncates the staging file and writes `rows` into it.
    pub fn rewrite_staging<I, R, S>(&mut self, rows: I) -> crate::Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        truncate(&mut self.staging)?;
        write_rows(&mut self.staging, rows)
    }

    /// Returns the size of the staging file in bytes.
    pub fn staging_len(&self) -> std::io::Result<u64> {
        Ok(self.staging.metadata()?.len())
    }

    /// Computes the checksum of the staging file.
    pub fn staging_checksum(&mut self) -> std::io::Result<Checksum> {
        Checksum::of_reader(&mut self.staging)
    }

    /// Computes the checksum of the compressed file.
    pub fn compressed_checksum(&mut self) -> std::io::Result<Checksum> {
        Checksum::of_reader(&mut self.compressed)
    }

    /// Regenerates the compressed file from the current staging content.
    pub fn compress(&mut self, codec: Codec) -> crate::Result<()> {
        let mut bytes = Vec::new();
        self.staging.seek(SeekFrom::Start(0))?;
        self.staging.read_to_end(&mut bytes)?;

        let compressed = codec.compress(&bytes);
        log::trace!(
            "Compressed {} into {} bytes ({codec})",
            self.staging_path.display(),
            compressed.len(),
        );

        truncate(&mut self.compressed)?;
        self.compressed.write_all(&compressed)?;
        self.compressed.sync_data()?;

        Ok(())
    }

    /// Streams the compressed file to `remote_path`.
    pub fn upload(
        &mut self,
        storage: &dyn Storage,
        bucket: &str,
        remote_path: &str,
        public: bool,
    ) -> crate::Result<()> {
        log::debug!("Uploading {} to {remote_path}", self.compressed_path.display());

        self.compressed.seek(SeekFrom::Start(0))?;

        let mut writer = storage.upload_writer(bucket, remote_path)?;
        std::io::copy(&mut self.compressed, writer.as_mut())?;
        writer.finish()?;

        if public {
            storage.make_public(bucket, remote_path)?;
        }

        Ok(())
    }

    fn read_compressed(&mut self) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.compressed.seek(SeekFrom::Start(0))?;
        self.compressed.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use test_log::test;

    fn artifact(dir: &Path) -> std::io::Result<Artifact> {
        Artifact::open(dir.join("1.csv"), dir.join("1.csv.zlib"))
    }

    #[test]
    fn artifact_rows_round_trip_through_compression() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut artifact = artifact(dir.path())?;

        artifact.append_row(&["+", "a", "x,y", "quoted \"z\""])?;
        artifact.append_row(&["-", "b"])?;
        artifact.compress(Codec::default())?;

        let expected = vec![
            vec!["+", "a", "x,y", "quoted \"z\""],
            vec!["-", "b"],
        ];
        assert_eq!(expected, artifact.staging_rows()?);
        assert_eq!(expected, artifact.compressed_rows(Codec::default())?);

        Ok(())
    }

    #[test]
    fn artifact_open_keeps_content() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        {
            let mut artifact = artifact(dir.path())?;
            artifact.append_row(&["+", "a", "1"])?;
        }

        let mut artifact = artifact(dir.path())?;
        assert_eq!(1, artifact.staging_rows()?.len());

        let mut created = Artifact::create(dir.path().join("1.csv"), dir.path().join("1.csv.zlib"))?;
        assert!(created.staging_rows()?.is_empty());

        Ok(())
    }

    #[test]
    fn artifact_inflate_refuses_unverified_bytes() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = MemoryStorage::default();

        let compressed = Codec::default().compress(b"+,a,1\n");
        storage.insert_at("bucket", "remote", &compressed, chrono::Utc::now());

        let mut artifact = artifact(dir.path())?;
        artifact.append_row(&["+", "local", "1"])?;
        artifact.fetch(&storage, "bucket", "remote")?;

        let result = artifact.inflate_verified(Codec::default(), Some(Checksum::of(b"nope")), "remote");
        assert!(result.is_err_and(|e| e.is_integrity()));

        // staging is untouched
        assert_eq!(vec![vec!["+", "local", "1"]], artifact.staging_rows()?);

        artifact.inflate_verified(Codec::default(), Some(Checksum::of(&compressed)), "remote")?;
        assert_eq!(vec![vec!["+", "a", "1"]], artifact.staging_rows()?);

        Ok(())
    }

    #[test]
    fn artifact_fetch_missing_object_is_empty() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = MemoryStorage::default();

        let mut artifact = artifact(dir.path())?;
        artifact.fetch(&storage, "bucket", "missing")?;

        assert_eq!(Checksum::of(b""), artifact.compressed_checksum()?);

        Ok(())
    }
}
