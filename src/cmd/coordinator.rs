use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::coordinator::CoordinatorConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Serve map and reduce tasks for one job", long_about = None)]
pub struct Args {
    /// Input files, or glob patterns matching them
    #[clap(required = true)]
    pub inputs: Vec<String>,
    /// Number of reduce buckets (default 10)
    #[clap(short, long)]
    pub n_reduce: Option<u32>,
    /// Time in ms before a running task is handed to another worker (default 10000)
    #[clap(short, long)]
    pub timeout_ms: Option<u64>,
    /// Interval in ms between scans for stalled tasks (default 500)
    #[clap(long)]
    pub scan_ms: Option<u64>,
    /// [OPT] Unix socket to listen on (default /var/tmp/mapred-<user>)
    #[clap(short, long)]
    pub socket: Option<PathBuf>,
}

impl Args {
    pub fn config(&self) -> CoordinatorConfig {
        let defaults = CoordinatorConfig::default();
        CoordinatorConfig {
            n_reduce: self.n_reduce.unwrap_or(defaults.n_reduce),
            task_timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.task_timeout),
            scan_interval: self
                .scan_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.scan_interval),
        }
    }

    pub fn socket(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(crate::utils::coordinator_sock)
    }
}
