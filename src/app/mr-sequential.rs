use anyhow::Result;
use clap::Parser;
use mapred::standalone::{engine, Args, Job};
use mapred::utils;
use tracing::info;

fn main() -> Result<()> {
    utils::init_tracing();
    let job = Job::from(Args::parse());
    let out = engine::run(&job)?;
    info!(output = %out.display(), "done");
    Ok(())
}
