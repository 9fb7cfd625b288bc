//! Utility functions shared by the binaries.
//!

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Cook up a unique-ish Unix socket path in `/var/tmp` for the coordinator.
///
/// The path embeds the user name so runs by different users on one host
/// do not collide.
pub fn coordinator_sock() -> PathBuf {
    PathBuf::from(format!("/var/tmp/mapred-{}", whoami::username()))
}

/// An identifier for this worker, used only in logs.
pub fn worker_identity() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", std::process::id(), &suffix[..8])
}

/// Expand each glob pattern into the files it matches.
///
/// Matches keep the pattern order, and within one pattern are sorted, so map
/// task ids are reproducible. A pattern that matches nothing is an error.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<String>> {
    let mut inputs = Vec::new();
    for pattern in patterns {
        let before = inputs.len();
        for entry in glob::glob(pattern).with_context(|| format!("bad pattern `{pattern}`"))? {
            let path = entry.with_context(|| format!("cannot read a match of `{pattern}`"))?;
            if path.is_file() {
                inputs.push(path.to_string_lossy().into_owned());
            }
        }
        if inputs.len() == before {
            bail!("no input file matches `{pattern}`");
        }
    }
    Ok(inputs)
}

/// Install the `fmt` subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mapred=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
