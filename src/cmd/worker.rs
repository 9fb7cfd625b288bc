use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::worker::WorkerConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Run one map or reduce task", long_about = None)]
pub struct Args {
    /// Name of the workload (wc, indexer)
    #[clap(short, long)]
    pub workload: String,
    /// [OPT] Unix socket of the coordinator (default /var/tmp/mapred-<user>)
    #[clap(short, long)]
    pub socket: Option<PathBuf>,
    /// Shared directory for inputs, intermediate and output files
    #[clap(short, long, default_value = ".")]
    pub dir: PathBuf,
    /// Sleep in ms after the coordinator says to wait (default 1000)
    #[clap(short, long)]
    pub backoff_ms: Option<u64>,
}

impl Args {
    pub fn config(&self) -> WorkerConfig {
        let defaults = WorkerConfig::default();
        WorkerConfig {
            work_dir: self.dir.clone(),
            wait_backoff: self
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.wait_backoff),
        }
    }

    pub fn socket(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(crate::utils::coordinator_sock)
    }
}
