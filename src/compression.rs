// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Error;

/// Compression codec of an uploaded artifact
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Codec {
    /// Zlib/DEFLATE compression (space-optimized)
    Zlib(u8),

    /// LZ4 compression (speed-optimized)
    #[cfg(feature = "lz4")]
    Lz4,
}

impl Default for Codec {
    fn default() -> Self {
        Self::Zlib(6)
    }
}

impl Codec {
    /// Name written into the codec column of the master document,
    /// also used as the local file extension.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Zlib(_) => "zlib",

            #[cfg(feature = "lz4")]
            Self::Lz4 => "lz4",
        }
    }

    /// Parses a codec column.
    ///
    /// The compression level is not recorded, decoding does not need it.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the codec is unknown or not compiled in.
    pub fn parse(name: &str) -> crate::Result<Self> {
        match name {
            "zlib" => Ok(Self::default()),

            #[cfg(feature = "lz4")]
            "lz4" => Ok(Self::Lz4),

            other => Err(Error::UnknownCodec(other.into())),
        }
    }

    pub(crate) fn compress(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Self::Zlib(level) => miniz_oxide::deflate::compress_to_vec_zlib(bytes, *level),

            #[cfg(feature = "lz4")]
            Self::Lz4 => lz4_flex::compress_prepend_size(bytes),
        }
    }

    pub(crate) fn decompress(&self, bytes: &[u8]) -> crate::Result<Vec<u8>> {
        match self {
            Self::Zlib(_) => miniz_oxide::inflate::decompress_to_vec_zlib(bytes)
                .map_err(|e| Error::Decompress(format!("zlib: {e:?}"))),

            #[cfg(feature = "lz4")]
            Self::Lz4 => lz4_flex::decompress_size_prepended(bytes)
                .map_err(|e| Error::Decompress(format!("lz4: {e}"))),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
