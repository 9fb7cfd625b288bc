//! Sequential MapReduce: the whole job in one process.
//!
//! Produces the same `<key> <value>` lines as a distributed run, all in a
//! single `mr-out-0`, which makes it a reference to check distributed output
//! against.

use clap::Parser;
use std::path::PathBuf;

pub mod engine;

#[derive(Parser, Debug)]
#[command(version, about = "Run a MapReduce job sequentially", long_about = None)]
pub struct Args {
    /// Name of the workload (wc, indexer)
    #[arg(short, long)]
    pub workload: String,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Input files, or glob patterns matching them
    #[arg(required = true)]
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub inputs: Vec<String>,
    pub workload: String,
    pub output: PathBuf,
}

impl From<Args> for Job {
    fn from(args: Args) -> Self {
        Job {
            inputs: args.inputs,
            workload: args.workload,
            output: args.output,
        }
    }
}
