use anyhow::Result;
use clap::Parser;
use mapred::cmd::worker::Args;
use mapred::{utils, worker, workload};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_tracing();
    let args = Args::parse();
    let workload = workload::named(&args.workload)?;

    let outcome = worker::run(&args.socket(), workload, &args.config()).await?;
    debug!(?outcome, "worker finished");
    Ok(())
}
