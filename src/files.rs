//! File naming and crash-safe publication in the shared directory.
//!
//! Every file a worker produces is written under a private temporary name in
//! the destination directory and then renamed into place. Rename is atomic
//! within one file system, so a reader sees either the whole file or nothing,
//! and a worker that dies mid-write leaves nothing at the canonical name.

use anyhow::{Context, Result};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const PREFIX: &str = "mr-";
const OUTPUT_PREFIX: &str = "mr-out-";

/// Name of the file map task `map_id` writes for reduce bucket `bucket`.
pub fn intermediate_name(map_id: u32, bucket: u32) -> String {
    format!("{PREFIX}{map_id}-{bucket}")
}

/// Name of the final output of reduce task `reduce_id`.
pub fn output_name(reduce_id: u32) -> String {
    format!("{OUTPUT_PREFIX}{reduce_id}")
}

/// Recover `(map_id, bucket)` from an intermediate file name.
///
/// Only the last path component is inspected, so `dir/mr-3-1` parses too.
pub fn parse_intermediate_name(name: &str) -> Option<(u32, u32)> {
    let base = Path::new(name).file_name()?.to_str()?;
    let rest = base.strip_prefix(PREFIX)?;
    let (map_id, bucket) = rest.split_once('-')?;
    Some((map_id.parse().ok()?, bucket.parse().ok()?))
}

/// Write a file by running `write` against a temp file in `dir`, then renaming
/// it to `dir/name`.
///
/// If `write` fails, the temp file is removed and nothing appears at
/// `dir/name`; an existing file there is left untouched. When two writers
/// publish the same name, the last rename wins.
pub fn publish_atomically<F>(dir: &Path, name: &str, write: F) -> Result<PathBuf>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dest = dir.join(name);
    let tmp = NamedTempFile::with_prefix_in("mr-tmp-", dir)
        .with_context(|| format!("could not create temp file in {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write(&mut writer)?;
        writer
            .flush()
            .with_context(|| format!("could not write temp file for {name}"))?;
    }
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("could not sync temp file for {name}"))?;
    tmp.persist(&dest)
        .with_context(|| format!("could not rename temp file to {}", dest.display()))?;
    Ok(dest)
}

/// Read a whole input file as text.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}
