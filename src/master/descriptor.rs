// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    checksum::Checksum,
    id::{ShardNumber, CATEGORIES_MARKER},
    version::Version,
    Codec, Error,
};

/// Publish timestamp, as stored in the master header
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub version: Version,
    pub unix: i64,
    pub formatted: String,
}

impl Header {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.version.to_string(),
            self.unix.to_string(),
            self.formatted.clone(),
        ]
    }
}

/// What a descriptor row points at
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Target {
    Categories,
    Shard(ShardNumber),
}

/// One artifact entry of the master document
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    pub target: Target,
    pub relative_path: String,
    pub codec: Codec,
    pub zipped: Option<Checksum>,
    pub unzipped: Option<Checksum>,
    pub count: usize,
}

impl Descriptor {
    pub fn to_row(&self) -> Vec<String> {
        let number = match self.target {
            Target::Categories => CATEGORIES_MARKER.to_string(),
            Target::Shard(number) => number.to_string(),
        };

        vec![
            number,
            self.relative_path.clone(),
            self.codec.name().into(),
            Checksum::to_column(self.zipped),
            Checksum::to_column(self.unzipped),
            self.count.to_string(),
        ]
    }
}

/// A row of the master document
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Line {
    Header(Header),
    Descriptor(Descriptor),
}

fn malformed(path: &str, reason: String) -> Error {
    Error::MalformedRow {
        path: path.into(),
        reason,
    }
}

/// Parses a master document row.
///
/// Rows with neither 3 nor 6 columns carry nothing and yield `Ok(None)`.
pub fn parse_line(row: &[String], path: &str) -> crate::Result<Option<Line>> {
    match row {
        [version, unix, formatted] => {
            let version =
                Version::parse(version).ok_or_else(|| Error::InvalidVersion(version.clone()))?;

            let unix = unix
                .parse::<i64>()
                .map_err(|e| malformed(path, format!("invalid unix timestamp {unix:?}: {e}")))?;

            Ok(Some(Line::Header(Header {
                version,
                unix,
                formatted: formatted.clone(),
            })))
        }
        [number, relative_path, codec, zipped, unzipped, count] => {
            let number = number
                .parse::<i64>()
                .map_err(|e| malformed(path, format!("invalid shard number {number:?}: {e}")))?;

            let target = if number == CATEGORIES_MARKER {
                Target::Categories
            } else if number == 0 {
                return Err(malformed(path, "shard numbers start at 1".into()));
            } else {
                let number = ShardNumber::try_from(number)
                    .map_err(|e| malformed(path, format!("invalid shard number {number}: {e}")))?;
                Target::Shard(number)
            };

            let count = count
                .parse::<usize>()
                .map_err(|e| malformed(path, format!("invalid entry count {count:?}: {e}")))?;

            Ok(Some(Line::Descriptor(Descriptor {
                target,
                relative_path: relative_path.clone(),
                codec: Codec::parse(codec)?,
                zipped: Checksum::parse_column(zipped).map_err(|e| malformed(path, e))?,
                unzipped: Checksum::parse_column(unzipped).map_err(|e| malformed(path, e))?,
                count,
            })))
        }
        _ => {
            log::warn!("Skipping master row with {} columns in {path}", row.len());
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn row(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|x| (*x).to_string()).collect()
    }

    #[test]
    fn parse_header() -> crate::Result<()> {
        let line = parse_line(&row(&["V1", "1700000000", "2023-11-14 22:13:20"]), "m")?;

        assert_eq!(
            Some(Line::Header(Header {
                version: Version::V1,
                unix: 1_700_000_000,
                formatted: "2023-11-14 22:13:20".into(),
            })),
            line
        );

        Ok(())
    }

    #[test]
    fn parse_header_unknown_version() {
        let line = parse_line(&row(&["V9", "1", "x"]), "m");
        assert!(matches!(line, Err(Error::InvalidVersion(v)) if v == "V9"));
    }

    #[test]
    fn descriptor_row_round_trip() -> crate::Result<()> {
        let descriptor = Descriptor {
            target: Target::Shard(12),
            relative_path: "1700000000-12.csv.zlib".into(),
            codec: Codec::default(),
            zipped: Some(Checksum::of(b"zipped")),
            unzipped: Some(Checksum::of(b"unzipped")),
            count: 5,
        };

        let line = parse_line(&descriptor.to_row(), "m")?;
        assert_eq!(Some(Line::Descriptor(descriptor)), line);

        Ok(())
    }

    #[test]
    fn categories_marker() -> crate::Result<()> {
        let line = parse_line(&row(&["-1", "1-categories.csv.zlib", "zlib", "", "", "0"]), "m")?;

        let Some(Line::Descriptor(descriptor)) = line else {
            panic!("expected descriptor");
        };
        assert_eq!(Target::Categories, descriptor.target);
        assert_eq!("-1", descriptor.to_row()[0]);

        Ok(())
    }

    #[test]
    fn negative_shard_number_is_malformed() {
        let line = parse_line(&row(&["-2", "x", "zlib", "", "", "0"]), "m");
        assert!(matches!(line, Err(Error::MalformedRow { .. })));
    }

    #[test]
    fn zero_shard_number_is_malformed() {
        let line = parse_line(&row(&["0", "x", "zlib", "", "", "0"]), "m");
        assert!(matches!(line, Err(Error::MalformedRow { .. })));
    }

    #[test]
    fn other_widths_are_skipped() -> crate::Result<()> {
        assert_eq!(None, parse_line(&row(&["a", "b"]), "m")?);
        Ok(())
    }
}
