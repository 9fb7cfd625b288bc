//! Running one map or reduce task against the shared directory.

use anyhow::{ensure, Context, Result};
use itertools::Itertools;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::{bucket_for, codec, files, KeyValue, MapFn, ReduceFn};

/// Run map task `task_id` over `source`, which is resolved against `dir`.
///
/// Writes one intermediate file per bucket, including empty buckets, and
/// returns their names in bucket order.
pub fn run_map(
    map_fn: MapFn,
    task_id: u32,
    source: &str,
    n_reduce: u32,
    dir: &Path,
) -> Result<Vec<String>> {
    ensure!(n_reduce > 0, "map task {task_id} has no reduce buckets");
    let contents = files::read_to_string(&dir.join(source))?;
    let pairs = map_fn(source, &contents)
        .with_context(|| format!("map function failed on {source}"))?;

    let mut buckets: Vec<Vec<KeyValue>> = vec![Vec::new(); n_reduce as usize];
    for kv in pairs {
        let bucket = bucket_for(&kv.key, n_reduce) as usize;
        buckets[bucket].push(kv);
    }

    let mut produced = Vec::with_capacity(buckets.len());
    for (bucket, records) in (0u32..).zip(&buckets) {
        let name = files::intermediate_name(task_id, bucket);
        files::publish_atomically(dir, &name, |w| codec::write_records(w, records))?;
        produced.push(name);
    }
    Ok(produced)
}

/// Run reduce task `task_id` over the intermediate files `inputs` in `dir`.
///
/// Writes `mr-out-<task_id>` with one line per key in ascending key order.
pub fn run_reduce(
    reduce_fn: ReduceFn,
    task_id: u32,
    inputs: &[String],
    dir: &Path,
) -> Result<PathBuf> {
    let mut records = Vec::new();
    for name in inputs {
        let path = dir.join(name);
        let file = File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;
        codec::read_records(BufReader::new(file), &mut records)
            .with_context(|| format!("bad intermediate file {}", path.display()))?;
    }
    // Stable, so values keep the order they were read in.
    records.sort_by(|a, b| a.key.cmp(&b.key));

    files::publish_atomically(dir, &files::output_name(task_id), |w| {
        let pairs = records.iter().map(|kv| (kv.key.as_str(), kv.value.as_str()));
        for (key, group) in &pairs.chunk_by(|(key, _)| *key) {
            let values = group.map(|(_, value)| value.to_string()).collect::<Vec<_>>();
            let out = reduce_fn(key, &values)
                .with_context(|| format!("reduce function failed on key `{key}`"))?;
            codec::write_output_line(w, key, &out)?;
        }
        Ok(())
    })
}
