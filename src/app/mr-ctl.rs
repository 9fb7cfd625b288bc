use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mapred::cmd::ctl::{Args, Commands};
use mapred::error::WorkerError;
use mapred::rpc::{self, CoordinatorClient, StatusReply, StatusRequest};
use tonic::transport::Channel;

async fn status(client: &mut CoordinatorClient<Channel>) -> Result<StatusReply> {
    let reply = client
        .job_status(StatusRequest {})
        .await
        .map_err(|status| WorkerError::Rpc {
            call: "JobStatus",
            status,
        })?;
    Ok(reply.into_inner())
}

fn display_status(s: &StatusReply) {
    println!("---------- JOB STATUS ----------");
    println!("Map tasks:\t{} / {}", s.maps_done, s.n_map);
    println!("Reduce tasks:\t{} / {}", s.reduces_done, s.n_reduce);
    println!("Idle:\t\t{}", s.idle);
    println!("Running:\t{}", s.running);
    println!("Complete:\t{}", if s.done { "yes" } else { "no" });
    println!("--------------------------------");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut client = rpc::connect(&args.socket()).await?;

    match args.command {
        Commands::Status => display_status(&status(&mut client).await?),
        Commands::Wait { interval_ms } => {
            while !status(&mut client).await?.done {
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }
            println!("Job complete");
        }
    }
    Ok(())
}
