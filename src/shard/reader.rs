// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{artifact::Row, id::ShardNumber, patch::PatchLog, Error, Patch, Validator};

/// Turns shard rows into a patch log, in row order.
///
/// Every row is passed through the validator first. Rows with fewer
/// than two columns are malformed.
pub fn parse_rows(
    rows: Vec<Row>,
    validator: &dyn Validator,
    shard: ShardNumber,
    path: &str,
) -> crate::Result<PatchLog> {
    rows.into_iter()
        .map(|row| {
            validator
                .validate(&row, shard)
                .map_err(|reason| Error::Rejected { shard, reason })?;

            Patch::from_row(&row).map_err(|reason| Error::MalformedRow {
                path: path.into(),
                reason,
            })
        })
        .collect()
}

/// Runs rows through the validator without building patches.
pub fn validate_rows(
    rows: &[Row],
    validator: &dyn Validator,
    shard: ShardNumber,
) -> crate::Result<()> {
    for row in rows {
        validator
            .validate(row, shard)
            .map_err(|reason| Error::Rejected { shard, reason })?;
    }

    Ok(())
}
