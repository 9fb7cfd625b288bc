use anyhow::{Context, Result};
use itertools::Itertools;
use std::path::{Path, PathBuf};

use super::Job;
use crate::*;

/// Run the map function over every input file and collect all pairs.
pub fn perform_map(inputs: &[String], engine: &Workload) -> Result<Vec<KeyValue>> {
    let mut intermediate = Vec::new();
    for input in inputs {
        let contents = files::read_to_string(Path::new(input))?;
        let pairs = (engine.map_fn)(input, &contents)
            .with_context(|| format!("map function failed on {input}"))?;
        intermediate.extend(pairs);
    }
    Ok(intermediate)
}

/// Sort, group and reduce `intermediate`, writing `mr-out-0` in `output_dir`.
pub fn perform_reduce(
    output_dir: &Path,
    engine: &Workload,
    mut intermediate: Vec<KeyValue>,
) -> Result<PathBuf> {
    intermediate.sort_by(|a, b| a.key.cmp(&b.key));
    files::publish_atomically(output_dir, &files::output_name(0), |w| {
        for (key, group) in &intermediate.into_iter().chunk_by(|kv| kv.key.clone()) {
            let values = group.map(KeyValue::into_value).collect::<Vec<_>>();
            let out = (engine.reduce_fn)(&key, &values)?;
            codec::write_output_line(w, &key, &out)?;
        }
        Ok(())
    })
}

pub fn run(job: &Job) -> Result<PathBuf> {
    let engine = workload::named(&job.workload)?;
    let inputs = utils::expand_inputs(&job.inputs)?;
    let intermediate = perform_map(&inputs, &engine)?;
    perform_reduce(&job.output, &engine, intermediate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn word_count_in_one_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0.txt"), "a b a").unwrap();
        fs::write(dir.path().join("1.txt"), "b c").unwrap();

        let job = Job {
            inputs: vec![format!("{}/*.txt", dir.path().display())],
            workload: "wc".into(),
            output: dir.path().to_path_buf(),
        };
        let out = run(&job).unwrap();
        assert_eq!(fs::read_to_string(out).unwrap(), "a 2\nb 2\nc 1\n");
    }
}
