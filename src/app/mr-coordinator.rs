use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mapred::cmd::coordinator::Args;
use mapred::coordinator::RunningCoordinator;
use mapred::utils;
use tracing::{info, warn};

/// How often the driver checks whether the job is complete.
const DONE_POLL: Duration = Duration::from_secs(1);

/// Time given to still-polling workers to hear Exit before the socket closes.
const LINGER: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_tracing();
    let args = Args::parse();
    let inputs = utils::expand_inputs(&args.inputs)?;

    let coordinator = RunningCoordinator::start(inputs, args.config(), &args.socket()).await?;
    tokio::select! {
        _ = coordinator.wait_until_done(DONE_POLL) => {
            info!("job complete, output files are final");
            tokio::time::sleep(LINGER).await;
        }
        res = tokio::signal::ctrl_c() => {
            res?;
            let progress = coordinator.progress();
            warn!(
                maps_done = progress.maps_done,
                reduces_done = progress.reduces_done,
                "interrupted before the job finished"
            );
        }
    }
    coordinator.shutdown().await
}
