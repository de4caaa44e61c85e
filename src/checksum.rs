// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::io::{Read, Seek, SeekFrom};
use xxhash_rust::xxh3::Xxh3;

/// 128-bit content digest of an artifact, rendered as lowercase hex
///
/// The digest is XXH3-128, not MD5, even though both render as 32 hex
/// characters.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Checksum(u128);

impl Checksum {
    /// Hex length of a rendered checksum
    pub const HEX_LEN: usize = 32;

    /// Computes the checksum of a byte slice.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(bytes))
    }

    /// Rewinds the reader and streams all of its content through the hasher.
    ///
    /// The reader is left at its end.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn of_reader<R: Read + Seek>(reader: &mut R) -> std::io::Result<Self> {
        reader.seek(SeekFrom::Start(0))?;

        let mut hasher = Xxh3::new();
        let mut buf = [0; 8 * 1_024];

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }

            #[allow(clippy::indexing_slicing)]
            hasher.update(&buf[..n]);
        }

        Ok(Self(hasher.digest128()))
    }

    /// Parses a checksum column.
    ///
    /// An empty column means the artifact was never hashed and yields `Ok(None)`.
    pub(crate) fn parse_column(s: &str) -> Result<Option<Self>, String> {
        if s.is_empty() {
            return Ok(None);
        }

        if s.len() != Self::HEX_LEN || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(format!("invalid checksum {s:?}"));
        }

        u128::from_str_radix(s, 16)
            .map(|x| Some(Self(x)))
            .map_err(|e| e.to_string())
    }

    /// Renders an optional checksum as a master document column.
    pub(crate) fn to_column(checksum: Option<Self>) -> String {
        checksum.map(|x| x.to_string()).unwrap_or_default()
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}
