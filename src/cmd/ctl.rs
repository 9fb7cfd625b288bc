use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
    /// [OPT] Unix socket of the coordinator (default /var/tmp/mapred-<user>)
    #[clap(short, long, global = true)]
    pub socket: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show task counts for the running job
    Status,
    /// Block until the job is complete
    Wait {
        /// Poll interval in ms
        #[arg(short, long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

impl Args {
    pub fn socket(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(crate::utils::coordinator_sock)
    }
}
